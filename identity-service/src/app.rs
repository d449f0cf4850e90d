use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use common_auth::{JwtConfig, JwtVerifier, RefreshVerifier};
use common_http_errors::error_envelope_layer;
use tracing::info;

use crate::auth_handlers::{
    health, jwks, login, logout, refresh, register, render_metrics, welcome, whoami,
};
use crate::cookies::CookieConfig;
use crate::credentials::CredentialHasher;
use crate::keys::SigningKeys;
use crate::metrics::AuthMetrics;
use crate::refresh_store::RefreshTokenStore;
use crate::session::SessionService;
use crate::tenant_handlers::create_tenant;
use crate::tenants::TenantStore;
use crate::tokens::{TokenConfig, TokenIssuer};
use crate::user_handlers::create_user;
use crate::users::UserStore;

pub const SERVICE_NAME: &str = "identity-service";

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub tenants: Arc<dyn TenantStore>,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub refresh_verifier: Arc<RefreshVerifier>,
    pub cookies: Arc<CookieConfig>,
    pub metrics: Arc<AuthMetrics>,
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_verifier.clone()
    }
}

impl FromRef<AppState> for Arc<RefreshVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.refresh_verifier.clone()
    }
}

/// Everything needed to assemble [`AppState`]; stores are chosen by the caller.
pub struct StateParts {
    pub keys: Arc<SigningKeys>,
    pub tokens: TokenConfig,
    pub users: Arc<dyn UserStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub tenants: Arc<dyn TenantStore>,
    pub hasher: CredentialHasher,
    pub cookies: CookieConfig,
    pub jwks_uri: Option<String>,
}

impl AppState {
    pub async fn assemble(parts: StateParts) -> Result<Self> {
        let jwt_config = JwtConfig::new(parts.tokens.issuer.clone(), parts.tokens.audience.clone());
        let issuer = Arc::new(TokenIssuer::new(parts.tokens, parts.keys.clone()));

        let mut builder = JwtVerifier::builder(jwt_config.clone())
            .with_jwk_set(&issuer.jwks())
            .context("Failed to load local signing key into verifier")?;
        if let Some(url) = parts.jwks_uri {
            info!(%url, "loading verification keys from remote JWKS");
            builder = builder.with_jwks_url(url);
        }
        let jwt_verifier = builder
            .build()
            .await
            .context("Failed to initialise JWT verifier")?;

        let refresh_verifier = RefreshVerifier::new(jwt_config, parts.keys.refresh_secret());
        let sessions = SessionService::new(
            parts.users,
            parts.refresh_tokens,
            parts.tenants.clone(),
            issuer,
            parts.hasher,
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            tenants: parts.tenants,
            jwt_verifier: Arc::new(jwt_verifier),
            refresh_verifier: Arc::new(refresh_verifier),
            cookies: Arc::new(parts.cookies),
            metrics: Arc::new(AuthMetrics::new()?),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/healthz", get(health))
        .route("/metrics", get(render_metrics))
        .route("/.well-known/jwks.json", get(jwks))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/self", get(whoami))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/users", post(create_user))
        .route("/tenants", post(create_tenant))
        .with_state(state)
        .layer(middleware::from_fn(error_envelope_layer(SERVICE_NAME)))
}
