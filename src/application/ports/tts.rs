//! TTS Provider Port - 语音合成后端抽象
//!
//! 两类后端共用同一接口：在线 HTTP API 与本地子进程链。
//! 后端可以返回一个完成的文件，也可以返回一条活的字节流。

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// TTS 错误
#[derive(Debug, Error)]
pub enum TtsError {
    /// Provider 未配置（缺 API key / 未安装本地音色模型）
    #[error("{0}")]
    NotConfigured(String),

    #[error("Unknown voice: {0}")]
    UnknownVoice(String),

    #[error("TTS service error: {0}")]
    ServiceError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// 合成模式：在线远程 API / 离线本地子进程
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsMode {
    Online,
    Offline,
}

impl TtsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TtsMode::Online => "online",
            TtsMode::Offline => "offline",
        }
    }
}

/// 一个可选的音色
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Voice {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// 合成请求（缓存 key 的全部输入）
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakRequest {
    pub mode: TtsMode,
    pub voice: String,
    /// 语速倍率，缺省按 1 处理
    #[serde(default)]
    pub rate: Option<f32>,
    pub text: String,
}

impl SpeakRequest {
    /// 归一化后的语速
    pub fn rate_or_default(&self) -> f32 {
        self.rate.unwrap_or(1.0)
    }
}

/// Provider 输出的音频字节流
pub type AudioStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Provider 的合成结果：完成的文件或活的字节流
pub enum SpeakOutput {
    File {
        path: PathBuf,
        content_type: &'static str,
    },
    Stream {
        stream: AudioStream,
        content_type: &'static str,
    },
}

/// 传给 Provider 的已归一化参数
#[derive(Debug, Clone)]
pub struct ProviderSpeakRequest {
    pub text: String,
    pub voice: String,
    pub rate: f32,
}

/// TTS Provider Port
#[async_trait]
pub trait TtsProviderPort: Send + Sync {
    /// 列出该后端当前可用的音色；未配置的后端返回空表而非错误
    async fn list_voices(&self) -> Result<Vec<Voice>, TtsError>;

    /// 执行合成
    async fn speak(&self, request: &ProviderSpeakRequest) -> Result<SpeakOutput, TtsError>;
}
