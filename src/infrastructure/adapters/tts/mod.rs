//! TTS Provider 适配器

mod openai;
mod piper;

pub use openai::{OpenAiProvider, OpenAiProviderConfig};
pub use piper::{CatalogVoice, PiperProvider, PiperProviderConfig, VOICE_CATALOG};
