//! TTS HTTP Handlers - 合成、音色、播放令牌

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::application::ports::SpeakRequest;
use crate::application::services::{sanitize_text, SpeakResult, SpeechService};
use crate::infrastructure::adapters::tts::{CatalogVoice, VOICE_CATALOG};
use crate::infrastructure::http::dto::{InstallVoiceRequest, SpeakUrlResponse, VoicesResponse};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::identity::Identity;
use crate::infrastructure::http::range::serve_file;
use crate::infrastructure::http::state::AppState;

/// 列出两端音色与默认选择
pub async fn list_voices(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
) -> Json<VoicesResponse> {
    let catalog = state.speech.list_voices().await;
    let selection = SpeechService::default_selection(&catalog);
    Json(VoicesResponse::new(catalog, selection))
}

/// 合成（或回放缓存）
///
/// 缓存命中/文件产出走 Range-capable 的文件响应；活流直接透传。
pub async fn speak(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    headers: HeaderMap,
    Json(request): Json<SpeakRequest>,
) -> Result<Response, ApiError> {
    let request = sanitize_request(request)?;
    let result = state.speech.speak(request).await?;
    build_speak_response(result, &headers).await
}

/// 签发短时播放令牌
pub async fn speak_url(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(request): Json<SpeakRequest>,
) -> Result<Json<SpeakUrlResponse>, ApiError> {
    let request = sanitize_request(request)?;
    let token = state.speech.issue_token(&identity.user_id, request);
    Ok(Json(SpeakUrlResponse {
        url: format!("/api/tts/speak/{}", token),
    }))
}

/// 以令牌回放；不存在/过期/属主不符一律 404
pub async fn speak_with_token(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let entry = state
        .speech
        .resolve_token(&token, &identity.user_id)
        .ok_or_else(|| ApiError::NotFound("Token not found".to_string()))?;

    let result = state.speech.speak(entry.request).await?;
    build_speak_response(result, &headers).await
}

/// 可安装的离线音色目录
pub async fn voice_catalog(_identity: Identity) -> Json<Vec<CatalogVoice>> {
    Json(VOICE_CATALOG.to_vec())
}

/// 安装音色响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallVoiceResponse {
    pub voice_id: String,
    pub installed: bool,
}

/// 下载并安装一个离线音色（仅管理员）
pub async fn install_voice(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(request): Json<InstallVoiceRequest>,
) -> Result<Json<InstallVoiceResponse>, ApiError> {
    if !identity.is_admin {
        return Err(ApiError::Forbidden(
            "Voice installation requires admin".to_string(),
        ));
    }

    state
        .piper
        .install_voice(&request.voice_id)
        .await
        .map_err(crate::application::ApplicationError::from)?;

    Ok(Json(InstallVoiceResponse {
        voice_id: request.voice_id,
        installed: true,
    }))
}

/// 清洗文本并拒绝空请求
fn sanitize_request(mut request: SpeakRequest) -> Result<SpeakRequest, ApiError> {
    request.text = sanitize_text(&request.text);
    if request.text.is_empty() {
        return Err(ApiError::BadRequest("Missing text".to_string()));
    }
    if request.voice.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing voice".to_string()));
    }
    Ok(request)
}

/// 把 SpeakResult 变成 HTTP 响应
///
/// 合成产物对同一输入是确定的，但令牌/缓存路径各自有生命周期，
/// 响应一律 no-store，让客户端重放走服务端缓存。
async fn build_speak_response(
    result: SpeakResult,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    match result {
        SpeakResult::File {
            path, content_type, ..
        } => {
            let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
            serve_file(&path, content_type, range, Some("no-store")).await
        }
        SpeakResult::Stream {
            stream,
            content_type,
        } => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CACHE_CONTROL, "no-store")
            .body(Body::from_stream(stream))
            .map_err(|e| ApiError::Internal(format!("Failed to build response: {}", e))),
    }
}
