use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTenant {
    pub name: String,
    pub address: String,
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn create(&self, tenant: NewTenant) -> Result<Tenant>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Tenant>>;
}

#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn create(&self, tenant: NewTenant) -> Result<Tenant> {
        let row = sqlx::query_as::<_, Tenant>(
            "INSERT INTO tenants (name, address) VALUES ($1, $2) \
             RETURNING id, name, address, created_at",
        )
        .bind(&tenant.name)
        .bind(&tenant.address)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, address, created_at FROM tenants WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[derive(Default)]
struct InMemoryTenants {
    next_id: i64,
    by_id: HashMap<i64, Tenant>,
}

#[derive(Default)]
pub struct InMemoryTenantStore {
    inner: Mutex<InMemoryTenants>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn create(&self, tenant: NewTenant) -> Result<Tenant> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.next_id += 1;
        let created = Tenant {
            id: guard.next_id,
            name: tenant.name,
            address: tenant.address,
            created_at: Utc::now(),
        };
        guard.by_id.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Tenant>> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.by_id.get(&id).cloned())
    }
}
