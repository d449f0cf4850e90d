use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::Role;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

/// Public view of a user; the password hash lives only in [`UserCredentials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub tenant_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub tenant_id: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("tenant does not exist")]
    UnknownTenant,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, UserStoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: String,
    role: String,
    tenant_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserCredentials {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|err| anyhow!("user {} has an unusable role: {err}", row.id))?;
        Ok(Self {
            user: User {
                id: row.id,
                first_name: row.first_name,
                last_name: row.last_name,
                email: row.email,
                role,
                tenant_id: row.tenant_id,
                created_at: row.created_at,
            },
            password_hash: row.password_hash,
        })
    }
}

const USER_COLUMNS: &str =
    "id, first_name, last_name, email, password_hash, role, tenant_id, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: NewUser) -> Result<User, UserStoreError> {
        let query = format!(
            "INSERT INTO users (first_name, last_name, email, password_hash, role, tenant_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.tenant_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    UserStoreError::DuplicateEmail
                }
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    UserStoreError::UnknownTenant
                }
                other => UserStoreError::Other(other.into()),
            })?;

        Ok(UserCredentials::try_from(row)?.user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserCredentials::try_from).transpose()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(UserCredentials::try_from)
            .transpose()?
            .map(|credentials| credentials.user))
    }
}

#[derive(Default)]
struct InMemoryUsers {
    next_id: i64,
    by_id: HashMap<i64, UserCredentials>,
}

#[derive(Default)]
pub struct InMemoryUserStore {
    inner: Mutex<InMemoryUsers>,
}

impl InMemoryUserStore {
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
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: NewUser) -> Result<User, UserStoreError> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if guard
            .by_id
            .values()
            .any(|existing| existing.user.email == user.email)
        {
            return Err(UserStoreError::DuplicateEmail);
        }

        guard.next_id += 1;
        let created = User {
            id: guard.next_id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            tenant_id: user.tenant_id,
            created_at: Utc::now(),
        };
        guard.by_id.insert(
            created.id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard
            .by_id
            .values()
            .find(|existing| existing.user.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.by_id.get(&id).map(|credentials| credentials.user.clone()))
    }
}
