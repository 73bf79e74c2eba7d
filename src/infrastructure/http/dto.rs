//! HTTP DTOs - 对外数据结构
//!
//! 对外字段统一 camelCase，与既有客户端保持一致。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::ports::{BookRecord, Voice};
use crate::application::services::{DefaultSelection, VoiceCatalog};

/// 图书响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookResponse {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub format: String,
    pub canonical_format: String,
    pub date_added: String,
    pub updated_at: String,
    pub has_cover: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<BookRecord> for BookResponse {
    fn from(record: BookRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            author: record.author,
            format: record.format.as_str().to_string(),
            canonical_format: record.canonical_format.as_str().to_string(),
            date_added: record.added_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
            has_cover: record.cover_path.is_some(),
            status: record.status.as_str().to_string(),
            error_message: record.error_message,
        }
    }
}

/// 图书列表响应
#[derive(Debug, Serialize)]
pub struct BookListResponse {
    pub books: Vec<BookResponse>,
}

/// 图书列表查询参数
#[derive(Debug, Deserialize, Default)]
pub struct ListBooksQuery {
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
}

/// PATCH 图书请求
///
/// author 的双层 Option 区分"字段缺席"（保持不变）与
/// "显式 null"（清空作者）。
#[derive(Debug, Deserialize)]
pub struct UpdateBookRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub author: Option<Option<String>>,
}

fn deserialize_explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(Option::<String>::deserialize(deserializer)?))
}

/// 阅读进度响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub book_id: Uuid,
    pub location: serde_json::Value,
    pub updated_at: String,
}

/// 音色清单响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicesResponse {
    pub online: Vec<Voice>,
    pub offline: Vec<Voice>,
    pub default_mode: String,
    pub default_voice: String,
}

impl VoicesResponse {
    pub fn new(catalog: VoiceCatalog, selection: DefaultSelection) -> Self {
        Self {
            online: catalog.online,
            offline: catalog.offline,
            default_mode: selection.mode.as_str().to_string(),
            default_voice: selection.voice,
        }
    }
}

/// speak-url 响应
#[derive(Debug, Serialize)]
pub struct SpeakUrlResponse {
    pub url: String,
}

/// 安装音色请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallVoiceRequest {
    pub voice_id: String,
}
