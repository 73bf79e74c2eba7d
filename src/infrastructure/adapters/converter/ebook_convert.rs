//! ebook-convert Adapter - 调用 Calibre 做格式转换
//!
//! 一次转换一个子进程，以输入/输出路径为参数。转换失败保留
//! stderr 尾部作为错误信息。

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use crate::application::ports::{ConversionError, ConverterPort};

/// stderr 保留的最大长度
const MAX_STDERR_LEN: usize = 2000;

/// ebook-convert Adapter
pub struct EbookConvertAdapter {
    command: String,
}

impl EbookConvertAdapter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl ConverterPort for EbookConvertAdapter {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            "Starting ebook conversion"
        );

        let result = Command::new(&self.command)
            .arg(input)
            .arg(output)
            .output()
            .await
            .map_err(|e| ConversionError::Spawn(format!("{}: {}", self.command, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let stderr = stderr.trim();
            let message = if stderr.is_empty() {
                match result.status.code() {
                    Some(code) => format!("ebook-convert exited with code {}", code),
                    None => "ebook-convert terminated by signal".to_string(),
                }
            } else {
                let tail_start = stderr.len().saturating_sub(MAX_STDERR_LEN);
                // 按字符边界截尾
                let tail = &stderr[stderr
                    .char_indices()
                    .map(|(i, _)| i)
                    .find(|&i| i >= tail_start)
                    .unwrap_or(0)..];
                tail.to_string()
            };
            tracing::warn!(input = %input.display(), error = %message, "Conversion failed");
            return Err(ConversionError::Failed(message));
        }

        tracing::info!(output = %output.display(), "Conversion completed");
        Ok(())
    }
}
