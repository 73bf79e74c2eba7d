//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;

/// 应用主配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 格式转换配置
    #[serde(default)]
    pub converter: ConverterConfig,

    /// TTS 配置
    #[serde(default)]
    pub tts: TtsConfig,

    /// 会话/令牌配置
    #[serde(default)]
    pub auth: AuthConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 图书文件存储目录（每本书一个子目录）
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,

    /// 封面图片存储目录
    #[serde(default = "default_covers_dir")]
    pub covers_dir: PathBuf,

    /// TTS 音频缓存目录
    #[serde(default = "default_tts_cache_dir")]
    pub tts_cache_dir: PathBuf,

    /// Piper 音色模型目录
    #[serde(default = "default_voices_dir")]
    pub voices_dir: PathBuf,

    /// 是否允许上传
    #[serde(default = "default_allow_upload")]
    pub allow_upload: bool,

    /// 上传文件最大大小（MB）
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
}

fn default_library_dir() -> PathBuf {
    PathBuf::from("data/library")
}

fn default_covers_dir() -> PathBuf {
    PathBuf::from("data/covers")
}

fn default_tts_cache_dir() -> PathBuf {
    PathBuf::from("data/tts-cache")
}

fn default_voices_dir() -> PathBuf {
    PathBuf::from("data/voices")
}

fn default_allow_upload() -> bool {
    true
}

fn default_max_upload_mb() -> u64 {
    500
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            library_dir: default_library_dir(),
            covers_dir: default_covers_dir(),
            tts_cache_dir: default_tts_cache_dir(),
            voices_dir: default_voices_dir(),
            allow_upload: default_allow_upload(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl StorageConfig {
    /// 上传体积上限（字节）
    pub fn max_upload_bytes(&self) -> usize {
        (self.max_upload_mb as usize) * 1024 * 1024
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/booktainer.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// 获取数据库 URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path)
    }
}

/// 格式转换配置
#[derive(Debug, Clone, Deserialize)]
pub struct ConverterConfig {
    /// ebook-convert 可执行文件（Calibre）
    #[serde(default = "default_converter_command")]
    pub command: String,
}

fn default_converter_command() -> String {
    "ebook-convert".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            command: default_converter_command(),
        }
    }
}

/// TTS 配置
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    /// OpenAI API key；未设置时在线模式不可用
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// OpenAI 合成模型
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// piper 可执行文件
    #[serde(default = "default_piper_command")]
    pub piper_command: String,

    /// ffmpeg 可执行文件（piper WAV → MP3 转码）
    #[serde(default = "default_ffmpeg_command")]
    pub ffmpeg_command: String,
}

fn default_openai_model() -> String {
    "gpt-4o-mini-tts".to_string()
}

fn default_piper_command() -> String {
    "piper".to_string()
}

fn default_ffmpeg_command() -> String {
    "ffmpeg".to_string()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: default_openai_model(),
            piper_command: default_piper_command(),
            ffmpeg_command: default_ffmpeg_command(),
        }
    }
}

/// 会话/令牌配置
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// 会话 TTL（秒）；播放令牌有效期取 min(此值, 300)
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

fn default_session_ttl() -> u64 {
    86400
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
