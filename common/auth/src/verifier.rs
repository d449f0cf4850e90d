use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::{Claims, RefreshClaims};
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwks::{JwkSet, JwksFetcher};

/// Thread-safe store for decoding keys loaded from JWKS/PEM sources.
#[derive(Clone, Default)]
pub struct InMemoryKeyStore {
    inner: Arc<RwLock<HashMap<String, DecodingKey>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_key(&self, kid: impl Into<String>, key: DecodingKey) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(kid.into(), key);
    }

    pub fn get(&self, kid: &str) -> Option<DecodingKey> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(kid).cloned()
    }

    pub fn contains(&self, kid: &str) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.contains_key(kid)
    }

    pub fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, DecodingKey)>,
    {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.clear();
        for (kid, key) in entries.into_iter() {
            guard.insert(kid, key);
        }
    }
}

fn validation_for(config: &JwtConfig, algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.set_issuer(&[config.issuer.clone()]);
    validation.set_audience(&[config.audience.clone()]);
    validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
    validation.leeway = config.leeway_seconds.into();
    validation
}

/// Verifies RS256 access tokens against keys looked up by `kid`.
#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    store: InMemoryKeyStore,
    jwks: Option<JwksFetcher>,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> Self {
        Self {
            config,
            store: InMemoryKeyStore::new(),
            jwks: None,
        }
    }

    pub fn with_store(config: JwtConfig, store: InMemoryKeyStore) -> Self {
        Self {
            config,
            store,
            jwks: None,
        }
    }

    pub fn builder(config: JwtConfig) -> JwtVerifierBuilder {
        JwtVerifierBuilder::new(config)
    }

    pub fn store(&self) -> &InMemoryKeyStore {
        &self.store
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let header =
            decode_header(token).map_err(|err| AuthError::InvalidHeader(err.to_string()))?;
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
        let key = self
            .store
            .get(&kid)
            .ok_or_else(|| AuthError::UnknownKeyId(kid.clone()))?;

        let validation = validation_for(&self.config, Algorithm::RS256);
        let token_data = decode::<Value>(token, &key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;
        debug!(kid, "verified JWT successfully");
        Ok(claims)
    }

    pub async fn refresh_jwks(&self) -> AuthResult<usize> {
        let fetcher = match &self.jwks {
            Some(fetcher) => fetcher,
            None => return Ok(0),
        };

        let keys = fetcher.fetch().await?;
        let count = keys.len();
        if count > 0 {
            self.store.replace_all(keys);
        }
        Ok(count)
    }
}

pub struct JwtVerifierBuilder {
    config: JwtConfig,
    store: InMemoryKeyStore,
    jwks: Option<JwksFetcher>,
}

impl JwtVerifierBuilder {
    fn new(config: JwtConfig) -> Self {
        Self {
            config,
            store: InMemoryKeyStore::new(),
            jwks: None,
        }
    }

    /// Registers every key of a locally published key set.
    pub fn with_jwk_set(self, set: &JwkSet) -> AuthResult<Self> {
        for (kid, key) in set.decoding_keys()? {
            self.store.insert_key(kid, key);
        }
        Ok(self)
    }

    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks = Some(JwksFetcher::new(url));
        self
    }

    pub async fn build(self) -> AuthResult<JwtVerifier> {
        let verifier = JwtVerifier {
            config: self.config,
            store: self.store,
            jwks: self.jwks,
        };

        if verifier.jwks.is_some() {
            verifier.refresh_jwks().await?;
        }

        Ok(verifier)
    }
}

/// Verifies HS256 refresh tokens. Only the issuer holds the secret, so there is no key set.
#[derive(Clone)]
pub struct RefreshVerifier {
    config: JwtConfig,
    key: DecodingKey,
}

impl RefreshVerifier {
    pub fn new(config: JwtConfig, secret: &[u8]) -> Self {
        Self {
            config,
            key: DecodingKey::from_secret(secret),
        }
    }

    pub fn verify(&self, token: &str) -> AuthResult<RefreshClaims> {
        let validation = validation_for(&self.config, Algorithm::HS256);
        let token_data = decode::<Value>(token, &self.key, &validation)?;
        let claims = RefreshClaims::try_from(token_data.claims)?;
        debug!(record_id = claims.record_id, "verified refresh token");
        Ok(claims)
    }
}
