//! Progress HTTP Handlers - 阅读进度

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::infrastructure::http::dto::ProgressResponse;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::identity::Identity;
use crate::infrastructure::http::state::AppState;

/// PUT 进度请求
#[derive(Debug, Deserialize)]
pub struct SetProgressRequest {
    pub location: serde_json::Value,
}

/// 读取阅读进度；书存在但未记录过时 location 为 null
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<ProgressResponse>>, ApiError> {
    let progress = state.progress.get(&identity.user_id, id).await?;

    Ok(Json(progress.map(|record| ProgressResponse {
        book_id: record.book_id,
        location: record.location,
        updated_at: record.updated_at.to_rfc3339(),
    })))
}

/// 写入阅读进度
pub async fn put_progress(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(request): Json<SetProgressRequest>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let record = state
        .progress
        .set(&identity.user_id, id, request.location)
        .await?;

    Ok(Json(ProgressResponse {
        book_id: record.book_id,
        location: record.location,
        updated_at: record.updated_at.to_rfc3339(),
    }))
}
