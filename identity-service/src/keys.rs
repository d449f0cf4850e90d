use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use common_auth::{Jwk, JwkSet};
use jsonwebtoken::EncodingKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Key material loaded once at startup: the RS256 private key used for access tokens, its
/// published JWK, and the HS256 secret used for refresh tokens.
pub struct SigningKeys {
    kid: String,
    access_key: EncodingKey,
    jwk: Jwk,
    refresh_key: EncodingKey,
    refresh_secret: Vec<u8>,
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl SigningKeys {
    /// Accepts PKCS#1 (`BEGIN RSA PRIVATE KEY`) and PKCS#8 (`BEGIN PRIVATE KEY`) PEM.
    /// Without an explicit `kid`, one is derived from the key modulus so it stays stable
    /// across restarts with the same key.
    pub fn from_private_pem(
        pem: &str,
        kid: Option<String>,
        refresh_secret: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let refresh_secret = refresh_secret.into();
        if refresh_secret.is_empty() {
            return Err(anyhow!("refresh token secret must not be empty"));
        }

        let private = match RsaPrivateKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(_) => RsaPrivateKey::from_pkcs1_pem(pem)
                .map_err(|err| anyhow!("Failed to parse RSA private key: {err}"))?,
        };
        let access_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|err| anyhow!("Failed to load RSA signing key: {err}"))?;

        let modulus = private.n().to_bytes_be();
        let exponent = private.e().to_bytes_be();
        let kid = kid
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| derive_kid(&modulus));
        let jwk = Jwk::rsa_signing(
            kid.clone(),
            URL_SAFE_NO_PAD.encode(&modulus),
            URL_SAFE_NO_PAD.encode(&exponent),
        );

        Ok(Self {
            kid,
            access_key,
            jwk,
            refresh_key: EncodingKey::from_secret(&refresh_secret),
            refresh_secret,
        })
    }

    pub fn from_pem_file(
        path: impl AsRef<Path>,
        kid: Option<String>,
        refresh_secret: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read private key from {}", path.display()))?;
        let keys = Self::from_private_pem(&pem, kid, refresh_secret)?;
        info!(kid = %keys.kid, path = %path.display(), "loaded signing key");
        Ok(keys)
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn jwk_set(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.jwk.clone()],
        }
    }

    pub fn refresh_secret(&self) -> &[u8] {
        &self.refresh_secret
    }

    pub(crate) fn access_key(&self) -> &EncodingKey {
        &self.access_key
    }

    pub(crate) fn refresh_key(&self) -> &EncodingKey {
        &self.refresh_key
    }
}

fn derive_kid(modulus: &[u8]) -> String {
    let digest = Sha256::digest(modulus);
    let mut kid = URL_SAFE_NO_PAD.encode(digest);
    kid.truncate(16);
    kid
}
