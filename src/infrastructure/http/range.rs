//! Byte-Range 文件下发
//!
//! 解析 `Range: bytes=start-end`（end 可省略，默认文件末尾），
//! 命中则回 206 + Content-Range，头部缺失或无法解析时退回完整 200。
//! 两种响应都带 `Accept-Ranges: bytes`。

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::error::ApiError;

/// 解析出的字节窗口（闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// 解析 Range 头
///
/// 只支持单个 `bytes=start-end` 区间；end 省略时取 size-1，
/// 超出文件末尾的 end 被截到 size-1。解析不出或区间为空 → None。
pub fn parse_range(header: Option<&str>, size: u64) -> Option<ByteRange> {
    if size == 0 {
        return None;
    }
    let spec = header?.trim().strip_prefix("bytes=")?;
    let (start_raw, end_raw) = spec.split_once('-')?;

    let start: u64 = start_raw.parse().ok()?;
    let end: u64 = match end_raw.split(',').next().unwrap_or("").trim() {
        "" => size - 1,
        raw => raw.parse().ok()?,
    };
    let end = end.min(size - 1);

    if start > end {
        return None;
    }
    Some(ByteRange { start, end })
}

/// 按扩展名推断 content type
pub fn content_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "epub" => "application/epub+zip",
        "pdf" => "application/pdf",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// 以流式响应下发一个文件，支持可选的 Range 窗口
pub async fn serve_file(
    path: &Path,
    content_type: &str,
    range_header: Option<&str>,
    cache_control: Option<&'static str>,
) -> Result<Response, ApiError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to open file: {}", e)))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to stat file: {}", e)))?
        .len();

    let range = parse_range(range_header, size);

    let mut builder = Response::builder()
        .header(header::ACCEPT_RANGES, "bytes")
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .unwrap_or(HeaderValue::from_static("application/octet-stream")),
        );
    if let Some(value) = cache_control {
        builder = builder.header(header::CACHE_CONTROL, value);
    }

    let response = match range {
        Some(window) => {
            file.seek(std::io::SeekFrom::Start(window.start))
                .await
                .map_err(|e| ApiError::Internal(format!("Failed to seek: {}", e)))?;
            let reader = file.take(window.length());

            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", window.start, window.end, size),
                )
                .header(header::CONTENT_LENGTH, window.length())
                .body(Body::from_stream(ReaderStream::new(reader)))
        }
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, size)
            .body(Body::from_stream(ReaderStream::new(file))),
    };

    response.map_err(|e| ApiError::Internal(format!("Failed to build response: {}", e)))
}
