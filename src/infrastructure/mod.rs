//! Infrastructure 层 - 端口的具体实现

pub mod adapters;
pub mod http;
pub mod memory;
pub mod persistence;
