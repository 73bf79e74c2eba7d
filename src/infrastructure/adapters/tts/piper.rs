//! Piper TTS Provider - 本地子进程合成链
//!
//! piper 从 stdin 读文本、向 stdout 写 WAV，ffmpeg 接在后面转码
//! 成 MP3 流。音色模型以 `<voice>.onnx` + `<voice>.onnx.json` 成对
//! 存放在 voices 目录，已安装的音色靠扫描目录发现。

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::io::ReaderStream;

use crate::application::ports::{
    ProviderSpeakRequest, SpeakOutput, TtsError, TtsProviderPort, Voice,
};

/// 可下载的音色目录条目
#[derive(Debug, Clone, Serialize)]
pub struct CatalogVoice {
    pub id: &'static str,
    pub name: &'static str,
    pub locale: &'static str,
    pub model_url: &'static str,
    pub config_url: &'static str,
}

/// 内置音色目录（Hugging Face 上的 rhasspy/piper-voices 发布件）
pub const VOICE_CATALOG: &[CatalogVoice] = &[
    CatalogVoice {
        id: "en_US-amy-medium",
        name: "Amy",
        locale: "en-US",
        model_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/amy/medium/en_US-amy-medium.onnx",
        config_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/amy/medium/en_US-amy-medium.onnx.json",
    },
    CatalogVoice {
        id: "en_US-lessac-medium",
        name: "Lessac",
        locale: "en-US",
        model_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/lessac/medium/en_US-lessac-medium.onnx",
        config_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/lessac/medium/en_US-lessac-medium.onnx.json",
    },
    CatalogVoice {
        id: "en_US-ryan-high",
        name: "Ryan",
        locale: "en-US",
        model_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/ryan/high/en_US-ryan-high.onnx",
        config_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_US/ryan/high/en_US-ryan-high.onnx.json",
    },
    CatalogVoice {
        id: "en_GB-alan-medium",
        name: "Alan",
        locale: "en-GB",
        model_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_GB/alan/medium/en_GB-alan-medium.onnx",
        config_url: "https://huggingface.co/rhasspy/piper-voices/resolve/main/en/en_GB/alan/medium/en_GB-alan-medium.onnx.json",
    },
];

/// piper 的 length_scale 取值范围（语速倒数）
const MIN_LENGTH_SCALE: f32 = 0.5;
const MAX_LENGTH_SCALE: f32 = 2.0;

/// Piper Provider 配置
#[derive(Debug, Clone)]
pub struct PiperProviderConfig {
    /// 音色模型目录
    pub voices_dir: PathBuf,
    /// piper 可执行文件
    pub piper_command: String,
    /// ffmpeg 可执行文件
    pub ffmpeg_command: String,
}

impl PiperProviderConfig {
    pub fn new(voices_dir: PathBuf) -> Self {
        Self {
            voices_dir,
            piper_command: "piper".to_string(),
            ffmpeg_command: "ffmpeg".to_string(),
        }
    }
}

/// Piper TTS Provider
pub struct PiperProvider {
    config: PiperProviderConfig,
}

impl PiperProvider {
    pub fn new(config: PiperProviderConfig) -> Self {
        Self { config }
    }

    fn model_path(&self, voice: &str) -> PathBuf {
        self.config.voices_dir.join(format!("{}.onnx", voice))
    }

    fn config_path(&self, voice: &str) -> PathBuf {
        self.config.voices_dir.join(format!("{}.onnx.json", voice))
    }

    /// 扫描目录得到已安装的音色 id（`<voice>.onnx` 的文件名部分）
    pub async fn installed_voice_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.config.voices_dir).await else {
            return ids;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(".onnx") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        ids
    }

    /// 从目录下载并安装一个音色；已存在的文件跳过
    pub async fn install_voice(&self, voice_id: &str) -> Result<(), TtsError> {
        let entry = VOICE_CATALOG
            .iter()
            .find(|v| v.id == voice_id)
            .ok_or_else(|| TtsError::UnknownVoice(voice_id.to_string()))?;

        tokio::fs::create_dir_all(&self.config.voices_dir)
            .await
            .map_err(|e| TtsError::IoError(e.to_string()))?;

        download_if_missing(entry.model_url, &self.model_path(voice_id)).await?;
        download_if_missing(entry.config_url, &self.config_path(voice_id)).await?;

        tracing::info!(voice = %voice_id, "Piper voice installed");
        Ok(())
    }
}

async fn download_if_missing(url: &str, dest: &Path) -> Result<(), TtsError> {
    if tokio::fs::metadata(dest).await.is_ok() {
        tracing::debug!(path = %dest.display(), "Voice file already present, skipping");
        return Ok(());
    }

    let response = reqwest::get(url)
        .await
        .map_err(|e| TtsError::ServiceError(e.to_string()))?;
    if !response.status().is_success() {
        return Err(TtsError::ServiceError(format!(
            "Download failed with HTTP {}: {}",
            response.status(),
            url
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| TtsError::ServiceError(e.to_string()))?;
    tokio::fs::write(dest, &body)
        .await
        .map_err(|e| TtsError::IoError(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl TtsProviderPort for PiperProvider {
    async fn list_voices(&self) -> Result<Vec<Voice>, TtsError> {
        let voices = self
            .installed_voice_ids()
            .await
            .into_iter()
            .map(|id| {
                let catalog = VOICE_CATALOG.iter().find(|v| v.id == id);
                Voice {
                    name: catalog.map(|v| v.name.to_string()).unwrap_or_else(|| id.clone()),
                    locale: catalog.map(|v| v.locale.to_string()),
                    id,
                }
            })
            .collect();
        Ok(voices)
    }

    async fn speak(&self, request: &ProviderSpeakRequest) -> Result<SpeakOutput, TtsError> {
        let model = self.model_path(&request.voice);
        let config = self.config_path(&request.voice);
        if tokio::fs::metadata(&model).await.is_err()
            || tokio::fs::metadata(&config).await.is_err()
        {
            // 整个目录为空是"离线端未就绪"，有模型但不是这个才是音色错误
            if self.installed_voice_ids().await.is_empty() {
                return Err(TtsError::NotConfigured(
                    "Offline TTS not available.".to_string(),
                ));
            }
            return Err(TtsError::UnknownVoice(request.voice.clone()));
        }

        // length_scale 是语速的倒数
        let length_scale = (1.0 / request.rate.max(MIN_LENGTH_SCALE))
            .clamp(MIN_LENGTH_SCALE, MAX_LENGTH_SCALE);

        let mut piper = Command::new(&self.config.piper_command)
            .arg("--model")
            .arg(&model)
            .arg("--config")
            .arg(&config)
            .arg("--length_scale")
            .arg(format!("{}", length_scale))
            .arg("--output_file")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TtsError::ServiceError(format!("Failed to spawn piper: {}", e)))?;

        let mut ffmpeg = Command::new(&self.config.ffmpeg_command)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "wav", "-i", "pipe:0"])
            .args(["-f", "mp3", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TtsError::ServiceError(format!("Failed to spawn ffmpeg: {}", e)))?;

        let mut piper_stdin = piper
            .stdin
            .take()
            .ok_or_else(|| TtsError::ServiceError("piper stdin unavailable".to_string()))?;
        let mut piper_stdout = piper
            .stdout
            .take()
            .ok_or_else(|| TtsError::ServiceError("piper stdout unavailable".to_string()))?;
        let mut ffmpeg_stdin = ffmpeg
            .stdin
            .take()
            .ok_or_else(|| TtsError::ServiceError("ffmpeg stdin unavailable".to_string()))?;
        let ffmpeg_stdout = ffmpeg
            .stdout
            .take()
            .ok_or_else(|| TtsError::ServiceError("ffmpeg stdout unavailable".to_string()))?;

        let text = request.text.clone();
        tokio::spawn(async move {
            let _ = piper_stdin.write_all(text.as_bytes()).await;
            let _ = piper_stdin.shutdown().await;
            // 子进程句柄随任务存活；流被 drop 时 kill_on_drop 兜底
            let _ = tokio::io::copy(&mut piper_stdout, &mut ffmpeg_stdin).await;
            let _ = ffmpeg_stdin.shutdown().await;
            let _ = piper.wait().await;
            let _ = ffmpeg.wait().await;
        });

        Ok(SpeakOutput::Stream {
            stream: Box::pin(ReaderStream::new(ffmpeg_stdout)),
            content_type: "audio/mpeg",
        })
    }
}
