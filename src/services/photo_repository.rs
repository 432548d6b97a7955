use crate::models::photo::PhotoRecord;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

const PHOTO_COLUMNS: &str = "id, storage_key, display_name, content_type, size_bytes, created_at";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("photo {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RecordResult<T> = Result<T, RecordError>;

/// CRUD over photo metadata rows in SQLite.
#[derive(Clone)]
pub struct PhotoRepository {
    db: Arc<SqlitePool>,
}

impl PhotoRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn insert(&self, record: &PhotoRecord) -> RecordResult<PhotoRecord> {
        let stored = sqlx::query_as::<_, PhotoRecord>(&format!(
            "INSERT INTO photos ({PHOTO_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?) RETURNING {PHOTO_COLUMNS}"
        ))
        .bind(record.id)
        .bind(&record.storage_key)
        .bind(&record.display_name)
        .bind(&record.content_type)
        .bind(record.size_bytes)
        .bind(record.created_at)
        .fetch_one(&*self.db)
        .await?;
        Ok(stored)
    }

    /// All records in insertion order.
    pub async fn find_all(&self) -> RecordResult<Vec<PhotoRecord>> {
        let rows = sqlx::query_as::<_, PhotoRecord>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos ORDER BY seq ASC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    pub async fn find_by_id(&self, id: i64) -> RecordResult<PhotoRecord> {
        sqlx::query_as::<_, PhotoRecord>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(RecordError::NotFound(id))
    }

    /// Change the display name and return the row as written by the same statement.
    pub async fn update_display_name(&self, id: i64, name: &str) -> RecordResult<PhotoRecord> {
        sqlx::query_as::<_, PhotoRecord>(&format!(
            "UPDATE photos SET display_name = ? WHERE id = ? RETURNING {PHOTO_COLUMNS}"
        ))
        .bind(name)
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(RecordError::NotFound(id))
    }

    pub async fn delete_by_id(&self, id: i64) -> RecordResult<()> {
        let result = sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RecordError::NotFound(id));
        }
        Ok(())
    }
}
