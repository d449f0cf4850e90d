use anyhow::{anyhow, Context, Result};
use std::env;
use std::net::{IpAddr, SocketAddr};

use crate::cookies::CookieConfig;

const DEFAULT_ISSUER: &str = "auth-service";
const DEFAULT_PORT: u16 = 5501;
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivateKeySource {
    Path(String),
    Pem(String),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub private_key: PrivateKeySource,
    pub key_id: Option<String>,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub jwks_uri: Option<String>,
    pub cookies: CookieConfig,
    pub cors_allowed_origins: Vec<String>,
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Invalid HOST '{}'", self.host))?;
        Ok(SocketAddr::from((ip, self.port)))
    }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    load_from(|key| env::var(key).ok())
}

fn load_from<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).and_then(|value| normalize_optional(&value));

    let database_url = var("DATABASE_URL").ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;

    let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
    let port = var("PORT")
        .map(|value| value.parse::<u16>())
        .transpose()
        .context("Failed to parse PORT")?
        .unwrap_or(DEFAULT_PORT);

    let private_key = match (var("JWT_PRIVATE_KEY_PATH"), var("JWT_PRIVATE_KEY_PEM")) {
        (Some(path), _) => PrivateKeySource::Path(path),
        (None, Some(pem)) => PrivateKeySource::Pem(pem.replace("\\n", "\n")),
        (None, None) => {
            return Err(anyhow!(
                "No signing key configured. Set JWT_PRIVATE_KEY_PATH or JWT_PRIVATE_KEY_PEM"
            ))
        }
    };

    let refresh_secret =
        var("REFRESH_TOKEN_SECRET").ok_or_else(|| anyhow!("REFRESH_TOKEN_SECRET must be set"))?;

    let cookies = CookieConfig {
        domain: var("AUTH_COOKIE_DOMAIN").unwrap_or_else(|| "localhost".to_string()),
        secure: var("AUTH_COOKIE_SECURE")
            .map(|value| parse_bool(&value))
            .unwrap_or(false),
    };

    let cors_allowed_origins = parse_list(
        &var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string()),
    );

    Ok(ServiceConfig {
        database_url,
        host,
        port,
        private_key,
        key_id: var("JWT_KEY_ID"),
        refresh_secret,
        issuer: var("JWT_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
        audience: var("JWT_AUDIENCE").unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
        jwks_uri: var("JWKS_URI"),
        cookies,
        cors_allowed_origins,
    })
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|c| c == ',' || c == ';' || c == ' ')
        .filter_map(normalize_optional)
        .collect()
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
