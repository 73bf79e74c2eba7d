//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping                        GET    健康检查
//! - /api/books                       GET    列出图书（?sort=&q=）
//! - /api/books/upload                POST   上传图书（multipart）
//! - /api/books/:id                   GET    图书详情
//! - /api/books/:id                   PATCH  编辑标题/作者
//! - /api/books/:id                   DELETE 删除图书
//! - /api/books/:id/file              GET    下发文件（Range）
//! - /api/books/:id/cover             GET    下发封面
//! - /api/books/:id/progress          GET    读取阅读进度
//! - /api/books/:id/progress          PUT    写入阅读进度
//! - /api/tts/voices                  GET    音色清单 + 默认选择
//! - /api/tts/speak                   POST   合成（Range-capable）
//! - /api/tts/speak-url               POST   签发播放令牌
//! - /api/tts/speak/:token            GET    以令牌回放
//! - /api/tts/catalog                 GET    可安装的离线音色目录
//! - /api/tts/offline/install-voice   POST   安装离线音色（管理员）

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new().nest("/api", api_routes())
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .nest("/books", book_routes())
        .nest("/tts", tts_routes())
}

/// Book 路由
fn book_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::list_books))
        .route("/upload", post(handlers::upload_book))
        .route("/:id", get(handlers::get_book))
        .route("/:id", patch(handlers::update_book))
        .route("/:id", delete(handlers::delete_book))
        .route("/:id/file", get(handlers::get_book_file))
        .route("/:id/cover", get(handlers::get_book_cover))
        .route("/:id/progress", get(handlers::get_progress))
        .route("/:id/progress", put(handlers::put_progress))
}

/// TTS 路由
fn tts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/voices", get(handlers::list_voices))
        .route("/speak", post(handlers::speak))
        .route("/speak-url", post(handlers::speak_url))
        .route("/speak/:token", get(handlers::speak_with_token))
        .route("/catalog", get(handlers::voice_catalog))
        .route("/offline/install-voice", post(handlers::install_voice))
}
