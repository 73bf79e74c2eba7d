//! Converter Port - 外部格式转换器抽象
//!
//! 转换器是一个外部进程（如 ebook-convert），这里只约定
//! 输入/输出路径与失败时携带的诊断信息。

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// 转换错误，携带转换器的诊断输出
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Converter failed: {0}")]
    Failed(String),

    #[error("Failed to spawn converter: {0}")]
    Spawn(String),
}

impl ConversionError {
    /// 失败时对外展示的诊断信息
    pub fn message(&self) -> String {
        match self {
            ConversionError::Failed(msg) => msg.clone(),
            ConversionError::Spawn(msg) => msg.clone(),
        }
    }
}

/// Converter Port
///
/// 本层不做重试，也不设超时；状态机由 Ingestion 层驱动。
#[async_trait]
pub trait ConverterPort: Send + Sync {
    /// 将 input 转换为 output 指定的目标格式，退出码 0 视为成功
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;
}
