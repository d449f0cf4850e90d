use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use identity_service::config::{load_service_config, PrivateKeySource};
use identity_service::credentials::CredentialHasher;
use identity_service::keys::SigningKeys;
use identity_service::refresh_store::PgRefreshTokenStore;
use identity_service::tenants::PgTenantStore;
use identity_service::tokens::TokenConfig;
use identity_service::users::PgUserStore;
use identity_service::{build_router, AppState, StateParts};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_service_config()?;

    let keys = match &config.private_key {
        PrivateKeySource::Path(path) => SigningKeys::from_pem_file(
            path,
            config.key_id.clone(),
            config.refresh_secret.as_bytes(),
        )?,
        PrivateKeySource::Pem(pem) => SigningKeys::from_private_pem(
            pem,
            config.key_id.clone(),
            config.refresh_secret.as_bytes(),
        )?,
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to DATABASE_URL")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let state = AppState::assemble(StateParts {
        keys: Arc::new(keys),
        tokens: TokenConfig::new(config.issuer.clone(), config.audience.clone()),
        users: Arc::new(PgUserStore::new(pool.clone())),
        refresh_tokens: Arc::new(PgRefreshTokenStore::new(pool.clone())),
        tenants: Arc::new(PgTenantStore::new(pool)),
        hasher: CredentialHasher::new()?,
        cookies: config.cookies.clone(),
        jwks_uri: config.jwks_uri.clone(),
    })
    .await?;

    let origins = config
        .cors_allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("Invalid CORS origin '{origin}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_credentials(true);

    let app = build_router(state).layer(cors);

    let addr = config.bind_addr()?;
    info!(%addr, "starting identity-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
