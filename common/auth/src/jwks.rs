use jsonwebtoken::DecodingKey;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// A published RSA verification key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    pub kid: String,
    pub alg: String,
    pub n: String,
    pub e: String,
}

impl Jwk {
    pub fn rsa_signing(kid: impl Into<String>, n: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            kty: "RSA".to_string(),
            use_: Some("sig".to_string()),
            kid: kid.into(),
            alg: "RS256".to_string(),
            n: n.into(),
            e: e.into(),
        }
    }
}

/// Key-set document served at `/.well-known/jwks.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub fn decoding_keys(&self) -> AuthResult<Vec<(String, DecodingKey)>> {
        let entries = self.keys.iter().cloned().map(|key| JwkEntry {
            kid: Some(key.kid),
            kty: Some(key.kty),
            alg: Some(key.alg),
            n: Some(key.n),
            e: Some(key.e),
        });
        decode_entries(entries)
    }
}

#[derive(Clone)]
pub struct JwksFetcher {
    client: Client,
    url: String,
}

impl JwksFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub async fn fetch(&self) -> AuthResult<Vec<(String, DecodingKey)>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| AuthError::JwksFetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetch(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let body: JwksResponse = response
            .json()
            .await
            .map_err(|err| AuthError::JwksDecode(err.to_string()))?;

        decode_entries(body.keys)
    }
}

fn decode_entries<I>(entries: I) -> AuthResult<Vec<(String, DecodingKey)>>
where
    I: IntoIterator<Item = JwkEntry>,
{
    let mut keys = Vec::new();
    for key in entries {
        let kid = key.kid.ok_or(AuthError::JwksMissingKid)?;
        let kty = key.kty.unwrap_or_else(|| "RSA".to_string());
        if kty != "RSA" {
            return Err(AuthError::JwksUnsupportedKey { kid, kty });
        }

        if let Some(alg) = key.alg {
            if alg != "RS256" {
                return Err(AuthError::JwksUnsupportedAlg { kid, alg });
            }
        }

        let modulus = key
            .n
            .ok_or_else(|| AuthError::JwksMissingComponents(kid.clone()))?;
        let exponent = key
            .e
            .ok_or_else(|| AuthError::JwksMissingComponents(kid.clone()))?;

        let decoding_key = DecodingKey::from_rsa_components(&modulus, &exponent)
            .map_err(|err| AuthError::KeyParse(kid.clone(), err.to_string()))?;
        keys.push((kid, decoding_key));
    }

    Ok(keys)
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}
