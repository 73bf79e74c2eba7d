//! Application State

use crate::application::services::{IngestionService, ProgressService, SpeechService};
use crate::infrastructure::adapters::tts::PiperProvider;
use std::sync::Arc;

/// 应用状态
pub struct AppState {
    pub ingestion: IngestionService,
    pub speech: SpeechService,
    pub progress: ProgressService,

    /// 离线 Provider 的直接句柄（目录查询/安装走这里，不经端口）
    pub piper: Arc<PiperProvider>,

    /// 是否允许上传
    pub allow_upload: bool,
}

impl AppState {
    pub fn new(
        ingestion: IngestionService,
        speech: SpeechService,
        progress: ProgressService,
        piper: Arc<PiperProvider>,
        allow_upload: bool,
    ) -> Self {
        Self {
            ingestion,
            speech,
            progress,
            piper,
            allow_upload,
        }
    }
}
