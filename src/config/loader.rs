//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `BOOKTAINER_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `BOOKTAINER_SERVER__PORT=9090`
/// - `BOOKTAINER_STORAGE__LIBRARY_DIR=/data/library`
/// - `BOOKTAINER_TTS__OPENAI_API_KEY=sk-...`
/// - `BOOKTAINER_DATABASE__PATH=/data/booktainer.db`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("storage.library_dir", "data/library")?
        .set_default("storage.covers_dir", "data/covers")?
        .set_default("storage.tts_cache_dir", "data/tts-cache")?
        .set_default("storage.voices_dir", "data/voices")?
        .set_default("storage.allow_upload", true)?
        .set_default("storage.max_upload_mb", 500)?
        .set_default("database.path", "data/booktainer.db")?
        .set_default("database.max_connections", 5)?
        .set_default("converter.command", "ebook-convert")?
        .set_default("tts.openai_model", "gpt-4o-mini-tts")?
        .set_default("tts.piper_command", "piper")?
        .set_default("tts.ffmpeg_command", "ffmpeg")?
        .set_default("auth.session_ttl_secs", 86400)?
        .set_default("log.level", "info")?;

    // 2. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 前缀: BOOKTAINER_，层级分隔符: __ (双下划线)
    // 例如: BOOKTAINER_TTS__OPENAI_API_KEY=sk-...
    builder = builder.add_source(
        Environment::with_prefix("BOOKTAINER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::ParseError(format!("Failed to deserialize config: {}", e)))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    if config.database.path.is_empty() {
        return Err(ConfigError::ValidationError(
            "Database path cannot be empty".to_string(),
        ));
    }

    if config.converter.command.is_empty() {
        return Err(ConfigError::ValidationError(
            "Converter command cannot be empty".to_string(),
        ));
    }

    if config.storage.max_upload_mb == 0 {
        return Err(ConfigError::ValidationError(
            "Max upload size cannot be 0".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    tracing::info!("Library Directory: {:?}", config.storage.library_dir);
    tracing::info!("Covers Directory: {:?}", config.storage.covers_dir);
    tracing::info!("TTS Cache Directory: {:?}", config.storage.tts_cache_dir);
    tracing::info!("Voices Directory: {:?}", config.storage.voices_dir);
    tracing::info!("Upload Enabled: {}", config.storage.allow_upload);
    tracing::info!("Max Upload: {}MB", config.storage.max_upload_mb);
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Converter: {}", config.converter.command);
    tracing::info!(
        "Online TTS: {}",
        if config.tts.openai_api_key.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    tracing::info!("Session TTL: {}s", config.auth.session_ttl_secs);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_db_path() {
        let mut config = AppConfig::default();
        config.database.path = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_upload_limit() {
        let mut config = AppConfig::default();
        config.storage.max_upload_mb = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9191

[storage]
allow_upload = false
"#,
        )
        .unwrap();

        let config = load_config_from_path(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9191);
        assert!(!config.storage.allow_upload);
        // 未覆盖的键保持默认
        assert_eq!(config.database.path, "data/booktainer.db");
    }
}
