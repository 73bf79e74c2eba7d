//! Book HTTP Handlers - 上传、列表、编辑、文件下发

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::BookSortKey;
use crate::infrastructure::http::dto::{
    BookListResponse, BookResponse, ListBooksQuery, UpdateBookRequest,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::identity::Identity;
use crate::infrastructure::http::range::{content_type_for_path, serve_file};
use crate::infrastructure::http::state::AppState;

/// 上传图书（multipart，单个 file 字段）
pub async fn upload_book(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BookResponse>), ApiError> {
    if !state.allow_upload {
        return Err(ApiError::Forbidden("Uploads are disabled".to_string()));
    }

    let mut filename: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(|s| s.to_string());
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?
                    .to_vec(),
            );
        }
    }

    let filename =
        filename.ok_or_else(|| ApiError::BadRequest("Missing file field".to_string()))?;
    let bytes = bytes.unwrap_or_default();
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Empty file".to_string()));
    }

    let record = state
        .ingestion
        .accept(&identity.user_id, &filename, bytes)
        .await?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// 列出图书
pub async fn list_books(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(query): Query<ListBooksQuery>,
) -> Result<Json<BookListResponse>, ApiError> {
    let sort = query
        .sort
        .as_deref()
        .map(BookSortKey::from_str)
        .unwrap_or_default();

    let books = state
        .ingestion
        .list(&identity.user_id, sort, query.q.as_deref())
        .await?
        .into_iter()
        .map(BookResponse::from)
        .collect();

    Ok(Json(BookListResponse { books }))
}

/// 获取单本图书
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<BookResponse>, ApiError> {
    let record = state
        .ingestion
        .get(&identity.user_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Book not found: {}", id)))?;

    Ok(Json(record.into()))
}

/// 编辑标题/作者
pub async fn update_book(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateBookRequest>,
) -> Result<Json<BookResponse>, ApiError> {
    let record = state
        .ingestion
        .update(&identity.user_id, id, request.title, request.author)
        .await?;

    Ok(Json(record.into()))
}

/// 删除图书
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let removed = state.ingestion.remove(&identity.user_id, id).await?;
    if !removed {
        return Err(ApiError::NotFound(format!("Book not found: {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// 下发图书文件（规范格式优先），支持 Range
pub async fn get_book_file(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let record = state
        .ingestion
        .get(&identity.user_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Book not found: {}", id)))?;

    let path = record.serving_path().to_path_buf();
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    serve_file(&path, content_type_for_path(&path), range, None).await
}

/// 下发封面图片
pub async fn get_book_cover(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let record = state
        .ingestion
        .get(&identity.user_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Book not found: {}", id)))?;

    let cover = record
        .cover_path
        .ok_or_else(|| ApiError::NotFound(format!("Cover not found: {}", id)))?;

    serve_file(&cover, content_type_for_path(&cover), None, None).await
}
