//! SQLite Book Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::DbPool;
use crate::application::ports::{BookRecord, BookRepositoryPort, RepositoryError};
use crate::domain::{BookFormat, BookSortKey, BookStatus};

/// SQLite Book Repository
pub struct SqliteBookRepository {
    pool: DbPool,
}

impl SqliteBookRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const BOOK_COLUMNS: &str = "id, owner_id, title, author, format, canonical_format, \
     added_at, updated_at, original_path, canonical_path, cover_path, status, error_message";

#[derive(FromRow)]
struct BookRow {
    id: String,
    owner_id: String,
    title: String,
    author: Option<String>,
    format: String,
    canonical_format: String,
    added_at: String,
    updated_at: String,
    original_path: String,
    canonical_path: Option<String>,
    cover_path: Option<String>,
    status: String,
    error_message: Option<String>,
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::SerializationError(e.to_string()))
}

impl TryFrom<BookRow> for BookRecord {
    type Error = RepositoryError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Ok(BookRecord {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?,
            owner_id: row.owner_id,
            title: row.title,
            author: row.author,
            format: BookFormat::from_str(&row.format).ok_or_else(|| {
                RepositoryError::SerializationError(format!("unknown format: {}", row.format))
            })?,
            canonical_format: BookFormat::from_str(&row.canonical_format).ok_or_else(|| {
                RepositoryError::SerializationError(format!(
                    "unknown format: {}",
                    row.canonical_format
                ))
            })?,
            added_at: parse_datetime(&row.added_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            original_path: PathBuf::from(row.original_path),
            canonical_path: row.canonical_path.map(PathBuf::from),
            cover_path: row.cover_path.map(PathBuf::from),
            status: BookStatus::from_str(&row.status).unwrap_or_default(),
            error_message: row.error_message,
        })
    }
}

#[async_trait]
impl BookRepositoryPort for SqliteBookRepository {
    async fn insert(&self, book: &BookRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO books (id, owner_id, title, author, format, canonical_format,
                added_at, updated_at, original_path, canonical_path, cover_path,
                status, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(book.id.to_string())
        .bind(&book.owner_id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.format.as_str())
        .bind(book.canonical_format.as_str())
        .bind(book.added_at.to_rfc3339())
        .bind(book.updated_at.to_rfc3339())
        .bind(book.original_path.to_string_lossy().to_string())
        .bind(
            book.canonical_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
        )
        .bind(
            book.cover_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
        )
        .bind(book.status.as_str())
        .bind(&book.error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn find(&self, owner_id: &str, id: Uuid) -> Result<Option<BookRecord>, RepositoryError> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books WHERE owner_id = ? AND id = ?");
        let row: Option<BookRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        row.map(BookRecord::try_from).transpose()
    }

    async fn list(
        &self,
        owner_id: &str,
        sort: BookSortKey,
        query: Option<&str>,
    ) -> Result<Vec<BookRecord>, RepositoryError> {
        let order_by = match sort {
            BookSortKey::AddedAt => "added_at DESC",
            BookSortKey::Title => "title COLLATE NOCASE",
            BookSortKey::Author => "author COLLATE NOCASE",
        };

        let rows: Vec<BookRow> = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let pattern = format!("%{}%", q);
                let sql = format!(
                    "SELECT {BOOK_COLUMNS} FROM books \
                     WHERE owner_id = ? AND (title LIKE ? OR author LIKE ?) \
                     ORDER BY {order_by}"
                );
                sqlx::query_as(&sql)
                    .bind(owner_id)
                    .bind(&pattern)
                    .bind(&pattern)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {BOOK_COLUMNS} FROM books WHERE owner_id = ? ORDER BY {order_by}"
                );
                sqlx::query_as(&sql).bind(owner_id).fetch_all(&self.pool).await
            }
        }
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(BookRecord::try_from).collect()
    }

    async fn update_status(
        &self,
        owner_id: &str,
        id: Uuid,
        status: BookStatus,
        error_message: Option<&str>,
        canonical_path: Option<&Path>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE books
            SET status = ?, error_message = ?,
                canonical_path = COALESCE(?, canonical_path),
                updated_at = ?
            WHERE owner_id = ? AND id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(canonical_path.map(|p| p.to_string_lossy().to_string()))
        .bind(Utc::now().to_rfc3339())
        .bind(owner_id)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn update_metadata(
        &self,
        owner_id: &str,
        id: Uuid,
        title: &str,
        author: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE books
            SET title = ?, author = ?, updated_at = ?
            WHERE owner_id = ? AND id = ?
            "#,
        )
        .bind(title)
        .bind(author)
        .bind(Utc::now().to_rfc3339())
        .bind(owner_id)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn update_cover(
        &self,
        owner_id: &str,
        id: Uuid,
        cover_path: &Path,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE books
            SET cover_path = ?, updated_at = ?
            WHERE owner_id = ? AND id = ?
            "#,
        )
        .bind(cover_path.to_string_lossy().to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(owner_id)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, owner_id: &str, id: Uuid) -> Result<bool, RepositoryError> {
        // 使用事务确保记录与阅读进度一起消失
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        sqlx::query("DELETE FROM reading_progress WHERE owner_id = ? AND book_id = ?")
            .bind(owner_id)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let result = sqlx::query("DELETE FROM books WHERE owner_id = ? AND id = ?")
            .bind(owner_id)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
