//! Application 层 - 用例服务与出站端口

pub mod error;
pub mod ports;
pub mod services;

pub use error::ApplicationError;
