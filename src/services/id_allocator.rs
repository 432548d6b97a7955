//! Monotonic photo id allocation backed by a single counter row.
//!
//! The increment and the read of the new value happen in one
//! `UPDATE ... RETURNING` statement, so concurrent callers can never observe
//! the same value.

use sqlx::SqlitePool;
use std::sync::Arc;

pub const PHOTO_COUNTER: &str = "photo_id";

#[derive(Clone)]
pub struct IdAllocator {
    db: Arc<SqlitePool>,
    counter: &'static str,
}

impl IdAllocator {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self {
            db,
            counter: PHOTO_COUNTER,
        }
    }

    /// Create the counter row at 0 if it does not exist yet.
    /// An existing counter is left untouched.
    pub async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO counters (name, seq) VALUES (?, 0) ON CONFLICT(name) DO NOTHING")
            .bind(self.counter)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    /// Atomically bump the counter and return the new value (1 on first use).
    ///
    /// Fails with `RowNotFound` if `init` was never run against this database.
    pub async fn next(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("UPDATE counters SET seq = seq + 1 WHERE name = ? RETURNING seq")
            .bind(self.counter)
            .fetch_one(&*self.db)
            .await
    }
}
