//! Infrastructure Adapters - 外部系统适配器

pub mod converter;
pub mod tts;
