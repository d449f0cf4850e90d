use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

/// Server-side half of a refresh token. The token is only honoured while its record exists.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn persist(&self, user_id: i64) -> Result<RefreshTokenRecord>;

    /// Returns whether a record was actually removed. Two concurrent deletes of the same id
    /// report `true` at most once.
    async fn delete(&self, record_id: i64) -> Result<bool>;

    async fn exists(&self, record_id: i64) -> Result<bool>;
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn persist(&self, user_id: i64) -> Result<RefreshTokenRecord> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "INSERT INTO refresh_tokens (user_id) VALUES ($1) RETURNING id, user_id, created_at",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete(&self, record_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(record_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, record_id: i64) -> Result<bool> {
        let found: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM refresh_tokens WHERE id = $1)")
                .bind(record_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(found)
    }
}

#[derive(Default)]
struct InMemoryRecords {
    next_id: i64,
    records: HashMap<i64, RefreshTokenRecord>,
}

/// Process-local store used by tests and local runs without Postgres.
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    inner: Mutex<InMemoryRecords>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn persist(&self, user_id: i64) -> Result<RefreshTokenRecord> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.next_id += 1;
        let record = RefreshTokenRecord {
            id: guard.next_id,
            user_id,
            created_at: Utc::now(),
        };
        guard.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete(&self, record_id: i64) -> Result<bool> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.records.remove(&record_id).is_some())
    }

    async fn exists(&self, record_id: i64) -> Result<bool> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.records.contains_key(&record_id))
    }
}
