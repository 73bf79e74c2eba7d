//! Progress Service - 阅读进度
//!
//! location 是阅读器自定义的任意 JSON，服务端原样存取不做解释。

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::application::error::ApplicationError;
use crate::application::ports::{BookRepositoryPort, ProgressRecord, ProgressRepositoryPort};

pub struct ProgressService {
    books: Arc<dyn BookRepositoryPort>,
    progress: Arc<dyn ProgressRepositoryPort>,
}

impl ProgressService {
    pub fn new(
        books: Arc<dyn BookRepositoryPort>,
        progress: Arc<dyn ProgressRepositoryPort>,
    ) -> Self {
        Self { books, progress }
    }

    /// 读取进度；书不存在（或不属于该用户）→ NotFound，
    /// 书存在但从未记录过进度 → Ok(None)
    pub async fn get(
        &self,
        owner_id: &str,
        book_id: Uuid,
    ) -> Result<Option<ProgressRecord>, ApplicationError> {
        self.ensure_book(owner_id, book_id).await?;
        Ok(self.progress.find(owner_id, book_id).await?)
    }

    /// 写入或覆盖进度
    pub async fn set(
        &self,
        owner_id: &str,
        book_id: Uuid,
        location: serde_json::Value,
    ) -> Result<ProgressRecord, ApplicationError> {
        self.ensure_book(owner_id, book_id).await?;
        let record = ProgressRecord {
            book_id,
            location,
            updated_at: Utc::now(),
        };
        self.progress.upsert(owner_id, &record).await?;
        Ok(record)
    }

    async fn ensure_book(&self, owner_id: &str, book_id: Uuid) -> Result<(), ApplicationError> {
        match self.books.find(owner_id, book_id).await? {
            Some(_) => Ok(()),
            None => Err(ApplicationError::not_found("Book", book_id)),
        }
    }
}
