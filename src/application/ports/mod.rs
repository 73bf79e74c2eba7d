//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_cache;
mod converter;
mod repositories;
mod token_store;
mod tts;

pub use audio_cache::{cache_key, AudioCachePort, CacheError, CacheHit, CacheWriter};
pub use converter::{ConversionError, ConverterPort};
pub use repositories::{
    BookRecord, BookRepositoryPort, ProgressRecord, ProgressRepositoryPort, RepositoryError,
};
pub use token_store::{TokenEntry, TokenStorePort};
pub use tts::{
    AudioStream, ProviderSpeakRequest, SpeakOutput, SpeakRequest, TtsError, TtsMode,
    TtsProviderPort, Voice,
};
