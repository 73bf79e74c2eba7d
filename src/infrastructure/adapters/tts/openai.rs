//! OpenAI TTS Provider - 调用 OpenAI 语音合成 API
//!
//! POST https://api.openai.com/v1/audio/speech
//! Request: {"model": "...", "voice": "...", "input": "...",
//!           "response_format": "mp3", "speed": 1.0}  (JSON)
//! Response: audio/mpeg binary，流式转发给调用方

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::application::ports::{
    ProviderSpeakRequest, SpeakOutput, TtsError, TtsProviderPort, Voice,
};

/// OpenAI 支持的音色白名单；API 对未知音色返回 400，这里提前拒绝
const OPENAI_VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer",
    "verse", "cedar", "marin",
];

/// 远程 API 接受的语速范围
const MIN_SPEED: f32 = 0.5;
const MAX_SPEED: f32 = 2.0;

#[derive(Debug, Serialize)]
struct SpeechHttpRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
    speed: f32,
}

/// OpenAI Provider 配置
#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    /// API key
    pub api_key: String,
    /// 合成模型
    pub model: String,
    /// API 基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl OpenAiProviderConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com".to_string(),
            timeout_secs: 120,
        }
    }

}

/// OpenAI TTS Provider
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self, TtsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TtsError::ServiceError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn speech_url(&self) -> String {
        format!("{}/v1/audio/speech", self.config.base_url)
    }
}

#[async_trait]
impl TtsProviderPort for OpenAiProvider {
    async fn list_voices(&self) -> Result<Vec<Voice>, TtsError> {
        Ok(OPENAI_VOICES
            .iter()
            .map(|id| Voice {
                id: id.to_string(),
                name: capitalize(id),
                locale: None,
            })
            .collect())
    }

    async fn speak(&self, request: &ProviderSpeakRequest) -> Result<SpeakOutput, TtsError> {
        if !OPENAI_VOICES.contains(&request.voice.as_str()) {
            return Err(TtsError::UnknownVoice(request.voice.clone()));
        }

        let speed = request.rate.clamp(MIN_SPEED, MAX_SPEED);
        let body = SpeechHttpRequest {
            model: &self.config.model,
            voice: &request.voice,
            input: &request.text,
            response_format: "mp3",
            speed,
        };

        tracing::debug!(
            voice = %request.voice,
            speed = speed,
            text_len = request.text.len(),
            "Sending OpenAI speech request"
        );

        let response = self
            .client
            .post(self.speech_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::ServiceError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TtsError::ServiceError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);

        Ok(SpeakOutput::Stream {
            stream: Box::pin(stream),
            content_type: "audio/mpeg",
        })
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
