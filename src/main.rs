//! Booktainer - 电子书上传与 TTS 朗读服务

use std::sync::Arc;
use std::time::Duration;

use booktainer::application::services::{
    IngestionConfig, IngestionService, ProgressService, SpeechService, TtsRegistry,
};
use booktainer::config::{load_config, print_config};
use booktainer::infrastructure::adapters::converter::EbookConvertAdapter;
use booktainer::infrastructure::adapters::tts::{
    OpenAiProvider, OpenAiProviderConfig, PiperProvider, PiperProviderConfig,
};
use booktainer::infrastructure::http::{AppState, HttpServer, ServerConfig};
use booktainer::infrastructure::memory::InMemoryTokenStore;
use booktainer::infrastructure::persistence::fs::FsAudioCache;
use booktainer::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteBookRepository, SqliteProgressRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!(
        "{},booktainer={},tower_http=debug",
        config.log.level, config.log.level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter)),
        )
        .init();

    tracing::info!("Booktainer - 电子书上传与 TTS 朗读服务");
    print_config(&config);

    // 确保数据目录存在
    tokio::fs::create_dir_all(&config.storage.library_dir).await?;
    tokio::fs::create_dir_all(&config.storage.covers_dir).await?;
    tokio::fs::create_dir_all(&config.storage.tts_cache_dir).await?;
    tokio::fs::create_dir_all(&config.storage.voices_dir).await?;
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // 初始化数据库
    let db_config = DatabaseConfig {
        database_url: config.database.database_url(),
        max_connections: config.database.max_connections,
    };
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;

    // Repository 适配器
    let book_repo = Arc::new(SqliteBookRepository::new(pool.clone()));
    let progress_repo = Arc::new(SqliteProgressRepository::new(pool.clone()));

    // 格式转换器
    let converter = Arc::new(EbookConvertAdapter::new(config.converter.command.clone()));

    // TTS Providers：在线端仅在配置了 API key 时可用
    let online = match &config.tts.openai_api_key {
        Some(api_key) => {
            let provider = OpenAiProvider::new(OpenAiProviderConfig::new(
                api_key.clone(),
                config.tts.openai_model.clone(),
            ))
            .map_err(|e| anyhow::anyhow!("Failed to build OpenAI provider: {}", e))?;
            Some(Arc::new(provider) as Arc<dyn booktainer::application::ports::TtsProviderPort>)
        }
        None => {
            tracing::info!("OpenAI API key not set, online TTS disabled");
            None
        }
    };
    let piper = Arc::new(PiperProvider::new(PiperProviderConfig {
        voices_dir: config.storage.voices_dir.clone(),
        piper_command: config.tts.piper_command.clone(),
        ffmpeg_command: config.tts.ffmpeg_command.clone(),
    }));
    let offline =
        piper.clone() as Arc<dyn booktainer::application::ports::TtsProviderPort>;
    let registry = TtsRegistry::new(online, Some(offline));

    // 音频缓存与播放令牌
    let audio_cache = Arc::new(FsAudioCache::new(config.storage.tts_cache_dir.clone()));
    let token_store = InMemoryTokenStore::new().arc();

    // 用例服务
    let ingestion = IngestionService::new(
        IngestionConfig {
            library_dir: config.storage.library_dir.clone(),
            covers_dir: config.storage.covers_dir.clone(),
        },
        book_repo.clone(),
        converter,
    );
    let speech = SpeechService::new(
        registry,
        audio_cache,
        token_store,
        Duration::from_secs(config.auth.session_ttl_secs),
    );
    let progress = ProgressService::new(book_repo, progress_repo);

    // HTTP 服务器
    let server_config = ServerConfig::new(
        &config.server.host,
        config.server.port,
        config.storage.max_upload_bytes(),
    );
    let state = AppState::new(
        ingestion,
        speech,
        progress,
        piper,
        config.storage.allow_upload,
    );

    let server = HttpServer::new(server_config, state);

    // 启动服务器（带优雅关闭）
    server
        .run_with_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl-c");
            tracing::info!("Received shutdown signal");
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
