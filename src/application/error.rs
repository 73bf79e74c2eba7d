//! 应用层错误定义
//!
//! 统一的服务层错误类型

use thiserror::Error;
use uuid::Uuid;

use super::ports::{ConversionError, RepositoryError, TtsError};

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 输入校验失败（任何变更发生之前即被拒绝）
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// TTS Provider 未配置
    #[error("{0}")]
    NotConfigured(String),

    /// 操作被禁用（如关闭上传）
    #[error("{0}")]
    Forbidden(String),

    /// 仓储错误
    #[error("Repository error: {0}")]
    RepositoryError(String),

    /// 外部服务错误（TTS 服务 / 转换器）
    #[error("External service error: {0}")]
    ExternalServiceError(String),

    /// 存储错误
    #[error("Storage error: {0}")]
    StorageError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: Uuid) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// 创建输入校验错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建存储错误
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError(message.into())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        Self::RepositoryError(err.to_string())
    }
}

impl From<TtsError> for ApplicationError {
    fn from(err: TtsError) -> Self {
        match err {
            TtsError::NotConfigured(msg) => Self::NotConfigured(msg),
            TtsError::UnknownVoice(msg) => Self::ValidationError(format!("Unknown voice: {msg}")),
            other => Self::ExternalServiceError(other.to_string()),
        }
    }
}

impl From<ConversionError> for ApplicationError {
    fn from(err: ConversionError) -> Self {
        Self::ExternalServiceError(err.message())
    }
}
