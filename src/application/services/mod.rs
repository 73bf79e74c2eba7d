//! Application Services - 用例编排

mod ingestion;
mod progress;
mod speech;

pub use ingestion::{IngestionConfig, IngestionService};
pub use progress::ProgressService;
pub use speech::{
    sanitize_text, DefaultSelection, SpeakResult, SpeechService, TtsRegistry, VoiceCatalog,
};
