//! SQLite Progress Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::DbPool;
use crate::application::ports::{ProgressRecord, ProgressRepositoryPort, RepositoryError};

/// SQLite Progress Repository
pub struct SqliteProgressRepository {
    pool: DbPool,
}

impl SqliteProgressRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ProgressRow {
    book_id: String,
    location: String,
    updated_at: String,
}

impl TryFrom<ProgressRow> for ProgressRecord {
    type Error = RepositoryError;

    fn try_from(row: ProgressRow) -> Result<Self, Self::Error> {
        Ok(ProgressRecord {
            book_id: Uuid::parse_str(&row.book_id)
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?,
            location: serde_json::from_str(&row.location)
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?,
            updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?
                .with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl ProgressRepositoryPort for SqliteProgressRepository {
    async fn find(
        &self,
        owner_id: &str,
        book_id: Uuid,
    ) -> Result<Option<ProgressRecord>, RepositoryError> {
        let row: Option<ProgressRow> = sqlx::query_as(
            "SELECT book_id, location, updated_at FROM reading_progress \
             WHERE owner_id = ? AND book_id = ?",
        )
        .bind(owner_id)
        .bind(book_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        row.map(ProgressRecord::try_from).transpose()
    }

    async fn upsert(
        &self,
        owner_id: &str,
        progress: &ProgressRecord,
    ) -> Result<(), RepositoryError> {
        let location = serde_json::to_string(&progress.location)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO reading_progress (owner_id, book_id, location, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(owner_id, book_id) DO UPDATE SET
                location = excluded.location,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(owner_id)
        .bind(progress.book_id.to_string())
        .bind(location)
        .bind(progress.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::database::{create_pool, run_migrations, DatabaseConfig};
    use super::*;
    use serde_json::json;

    async fn repo() -> SqliteProgressRepository {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteProgressRepository::new(pool)
    }

    #[tokio::test]
    async fn test_upsert_overwrites_previous_location() {
        let repo = repo().await;
        let book_id = Uuid::new_v4();

        let first = ProgressRecord {
            book_id,
            location: json!({"cfi": "epubcfi(/6/4!/4/2)"}),
            updated_at: Utc::now(),
        };
        repo.upsert("alice", &first).await.unwrap();

        let second = ProgressRecord {
            book_id,
            location: json!({"cfi": "epubcfi(/6/8!/4/10)", "percent": 42.5}),
            updated_at: Utc::now(),
        };
        repo.upsert("alice", &second).await.unwrap();

        let found = repo.find("alice", book_id).await.unwrap().unwrap();
        assert_eq!(found.location, second.location);
    }

    #[tokio::test]
    async fn test_progress_is_owner_scoped() {
        let repo = repo().await;
        let book_id = Uuid::new_v4();

        let record = ProgressRecord {
            book_id,
            location: json!({"page": 3}),
            updated_at: Utc::now(),
        };
        repo.upsert("alice", &record).await.unwrap();

        assert!(repo.find("bob", book_id).await.unwrap().is_none());
        assert!(repo.find("alice", book_id).await.unwrap().is_some());
    }
}
