//! Repository Ports - 出站端口
//!
//! 定义数据持久化的抽象接口，具体实现在 infrastructure 层（SQLite）。
//! 所有查询均以 (owner_id, id) 为键，跨用户不可见。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{BookFormat, BookSortKey, BookStatus};

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// ============================================================================
// Book Repository
// ============================================================================

/// 图书实体（用于持久化）
#[derive(Debug, Clone)]
pub struct BookRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub author: Option<String>,
    /// 上传时的原始格式
    pub format: BookFormat,
    /// 最终下发的格式（mobi 上传后为 epub）
    pub canonical_format: BookFormat,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub original_path: PathBuf,
    /// 仅在转换成功后非空
    pub canonical_path: Option<PathBuf>,
    pub cover_path: Option<PathBuf>,
    pub status: BookStatus,
    /// 仅在 status = error 时非空
    pub error_message: Option<String>,
}

impl BookRecord {
    /// 实际下发的文件路径（优先规范格式产物）
    pub fn serving_path(&self) -> &Path {
        self.canonical_path.as_deref().unwrap_or(&self.original_path)
    }
}

/// Book Repository Port
#[async_trait]
pub trait BookRepositoryPort: Send + Sync {
    /// 插入新图书
    async fn insert(&self, book: &BookRecord) -> Result<(), RepositoryError>;

    /// 根据 (owner, id) 查找图书
    async fn find(&self, owner_id: &str, id: Uuid) -> Result<Option<BookRecord>, RepositoryError>;

    /// 列出某用户的图书，支持排序与标题/作者模糊检索
    async fn list(
        &self,
        owner_id: &str,
        sort: BookSortKey,
        query: Option<&str>,
    ) -> Result<Vec<BookRecord>, RepositoryError>;

    /// 更新处理状态（转换完成/失败时调用）
    async fn update_status(
        &self,
        owner_id: &str,
        id: Uuid,
        status: BookStatus,
        error_message: Option<&str>,
        canonical_path: Option<&Path>,
    ) -> Result<(), RepositoryError>;

    /// 更新标题与作者
    async fn update_metadata(
        &self,
        owner_id: &str,
        id: Uuid,
        title: &str,
        author: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// 更新封面路径
    async fn update_cover(
        &self,
        owner_id: &str,
        id: Uuid,
        cover_path: &Path,
    ) -> Result<(), RepositoryError>;

    /// 删除图书记录（级联删除阅读进度），返回是否确有删除
    async fn delete(&self, owner_id: &str, id: Uuid) -> Result<bool, RepositoryError>;
}

// ============================================================================
// Progress Repository
// ============================================================================

/// 阅读进度实体
///
/// location 为阅读器自定义的任意 JSON 定位信息，服务端不解释其内容
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub book_id: Uuid,
    pub location: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Progress Repository Port（仅 upsert + 读取，无独立生命周期）
#[async_trait]
pub trait ProgressRepositoryPort: Send + Sync {
    /// 读取某本书的阅读进度
    async fn find(
        &self,
        owner_id: &str,
        book_id: Uuid,
    ) -> Result<Option<ProgressRecord>, RepositoryError>;

    /// 写入或覆盖阅读进度
    async fn upsert(
        &self,
        owner_id: &str,
        progress: &ProgressRecord,
    ) -> Result<(), RepositoryError>;
}
