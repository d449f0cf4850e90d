#![allow(dead_code)]

use std::{env, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use axum::{
    body::Body,
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        Request, Response, StatusCode,
    },
    Router,
};
use http_body_util::BodyExt;
use identity_service::cookies::CookieConfig;
use identity_service::credentials::CredentialHasher;
use identity_service::keys::SigningKeys;
use identity_service::refresh_store::InMemoryRefreshTokenStore;
use identity_service::tenants::InMemoryTenantStore;
use identity_service::tokens::TokenConfig;
use identity_service::users::{InMemoryUserStore, NewUser, UserStore};
use identity_service::{build_router, AppState, StateParts};
use once_cell::sync::Lazy;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tower::util::ServiceExt;

pub const ISSUER: &str = "auth-service";
pub const REFRESH_SECRET: &str = "integration-refresh-secret";
pub const PASSWORD: &str = "secret";

static PRIVATE_PEM: Lazy<String> = Lazy::new(|| {
    let private = RsaPrivateKey::new(&mut OsRng, 2048).expect("generate key");
    private
        .to_pkcs1_pem(LineEnding::LF)
        .expect("encode pem")
        .to_string()
});

pub fn private_pem() -> &'static str {
    &PRIVATE_PEM
}

/// Router over in-memory stores, with handles to the stores for assertions.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub users: Arc<InMemoryUserStore>,
    pub refresh_tokens: Arc<InMemoryRefreshTokenStore>,
    pub tenants: Arc<InMemoryTenantStore>,
    pub hasher: CredentialHasher,
}

impl TestApp {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with_jwks(None).await
    }

    pub async fn spawn_with_jwks(jwks_uri: Option<String>) -> Result<Self> {
        let keys = SigningKeys::from_private_pem(private_pem(), None, REFRESH_SECRET)?;
        let users = Arc::new(InMemoryUserStore::new());
        let refresh_tokens = Arc::new(InMemoryRefreshTokenStore::new());
        let tenants = Arc::new(InMemoryTenantStore::new());
        let hasher = CredentialHasher::with_cost(4)?;

        let state = AppState::assemble(StateParts {
            keys: Arc::new(keys),
            tokens: TokenConfig::new(ISSUER, ISSUER),
            users: users.clone(),
            refresh_tokens: refresh_tokens.clone(),
            tenants: tenants.clone(),
            hasher: hasher.clone(),
            cookies: CookieConfig::default(),
            jwks_uri,
        })
        .await?;

        Ok(Self {
            router: build_router(state.clone()),
            state,
            users,
            refresh_tokens,
            tenants,
            hasher,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    pub async fn post_json(&self, uri: &str, body: Value, cookies: &[String]) -> Result<Response<Body>> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if !cookies.is_empty() {
            builder = builder.header(COOKIE, cookies.join("; "));
        }
        self.send(builder.body(Body::from(body.to_string()))?).await
    }

    pub async fn post_empty(&self, uri: &str, cookies: &[String]) -> Result<Response<Body>> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if !cookies.is_empty() {
            builder = builder.header(COOKIE, cookies.join("; "));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn get(&self, uri: &str, cookies: &[String]) -> Result<Response<Body>> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if !cookies.is_empty() {
            builder = builder.header(COOKIE, cookies.join("; "));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn register(&self, email: &str) -> Result<Response<Body>> {
        self.post_json(
            "/auth/register",
            serde_json::json!({
                "firstName": "Grace",
                "lastName": "Hopper",
                "email": email,
                "password": PASSWORD,
            }),
            &[],
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Response<Body>> {
        self.post_json(
            "/auth/login",
            serde_json::json!({ "email": email, "password": password }),
            &[],
        )
        .await
    }

    /// Inserts a user directly, bypassing the register endpoint's role choice.
    pub async fn seed_user(
        &self,
        email: &str,
        role: common_auth::Role,
        tenant_id: Option<i64>,
    ) -> Result<i64> {
        let user = self
            .users
            .create(NewUser {
                first_name: "Seeded".into(),
                last_name: "User".into(),
                email: email.into(),
                password_hash: self.hasher.hash(PASSWORD)?,
                role,
                tenant_id,
            })
            .await?;
        Ok(user.id)
    }

    /// Logs in and returns the `name=value` cookie pairs to replay.
    pub async fn session_for(&self, email: &str) -> Result<Vec<String>> {
        let response = self.login(email, PASSWORD).await?;
        if response.status() != StatusCode::OK {
            return Err(anyhow!("login for {email} failed: {}", response.status()));
        }
        Ok(cookie_pairs(&response))
    }
}

pub fn set_cookie_headers(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

pub fn cookie_pairs(response: &Response<Body>) -> Vec<String> {
    set_cookie_headers(response)
        .iter()
        .filter_map(|header| header.split(';').next())
        .map(|pair| pair.trim().to_string())
        .collect()
}

pub fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    cookie_pairs(response).into_iter().find_map(|pair| {
        pair.strip_prefix(&format!("{name}="))
            .map(str::to_string)
    })
}

pub fn pick_cookie(pairs: &[String], name: &str) -> String {
    pairs
        .iter()
        .find(|pair| pair.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_default()
}

pub async fn body_json(response: Response<Body>) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn body_text(response: Response<Body>) -> Result<String> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// External Postgres for the store tests; `None` when AUTH_TEST_DATABASE_URL is unset.
pub struct TestDatabase {
    pool: PgPool,
}

impl TestDatabase {
    pub async fn setup() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("AUTH_TEST_DATABASE_URL") else {
            eprintln!("Skipping Postgres store tests: set AUTH_TEST_DATABASE_URL to run them.");
            return Ok(None);
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;
        run_migrations(&pool).await?;
        Ok(Some(Self { pool }))
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrations_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let mut entries = std::fs::read_dir(&migrations_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        let sql = std::fs::read_to_string(&path)?;
        for statement in sql.split(';') {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                continue;
            }
            sqlx::query(trimmed).execute(pool).await?;
        }
    }

    Ok(())
}
