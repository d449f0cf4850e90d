use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::roles::Role;

/// Identity embedded in every token at issuance time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub subject: String,
    pub role: Role,
    /// Only set for tenant-scoped users; serialized as an empty string otherwise.
    pub tenant: Option<String>,
}

impl IdentityClaims {
    pub fn new(subject: impl Into<String>, role: Role, tenant: Option<String>) -> Self {
        Self {
            subject: subject.into(),
            role,
            tenant: tenant.filter(|value| !value.is_empty()),
        }
    }

    /// Tenant as it travels on the wire.
    pub fn tenant_claim(&self) -> &str {
        self.tenant.as_deref().unwrap_or("")
    }
}

/// Application-focused representation of verified access-token claims.
#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    pub identity: IdentityClaims,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub issuer: String,
    pub audience: Vec<String>,
    pub raw: serde_json::Value,
}

impl Claims {
    pub fn subject(&self) -> &str {
        &self.identity.subject
    }

    pub fn role(&self) -> Role {
        self.identity.role
    }

    pub fn tenant(&self) -> Option<&str> {
        self.identity.tenant.as_deref()
    }

    /// Subjects are numeric user ids in string form.
    pub fn user_id(&self) -> AuthResult<i64> {
        self.identity
            .subject
            .parse()
            .map_err(|_| AuthError::InvalidClaim("sub", self.identity.subject.clone()))
    }
}

/// Verified refresh-token claims: the identity plus the backing record id.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshClaims {
    pub claims: Claims,
    pub record_id: i64,
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    sub: String,
    role: Role,
    #[serde(default)]
    tenant: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    iss: String,
    #[serde(default)]
    aud: Option<AudienceRepr>,
}

#[derive(Debug, Deserialize)]
struct RefreshRepr {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AudienceRepr {
    Single(String),
    Many(Vec<String>),
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        if value.sub.trim().is_empty() {
            return Err(AuthError::InvalidClaim("sub", value.sub));
        }

        let expires_at = Utc
            .timestamp_opt(value.exp, 0)
            .single()
            .ok_or_else(|| AuthError::InvalidClaim("exp", value.exp.to_string()))?;

        let issued_at = match value.iat {
            Some(iat) => Some(
                Utc.timestamp_opt(iat, 0)
                    .single()
                    .ok_or_else(|| AuthError::InvalidClaim("iat", iat.to_string()))?,
            ),
            None => None,
        };

        let audience = match value.aud {
            Some(AudienceRepr::Single(item)) => vec![item],
            Some(AudienceRepr::Many(items)) => items,
            None => Vec::new(),
        };

        Ok(Self {
            identity: IdentityClaims::new(value.sub, value.role, Some(value.tenant)),
            expires_at,
            issued_at,
            issuer: value.iss,
            audience,
            raw: serde_json::Value::Null,
        })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: ClaimsRepr = serde_json::from_value(value.clone())
            .map_err(|err| AuthError::InvalidJson(err.to_string()))?;
        let mut claims = Claims::try_from(repr)?;
        claims.raw = value;
        Ok(claims)
    }
}

impl TryFrom<serde_json::Value> for RefreshClaims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let refresh: RefreshRepr = serde_json::from_value(value.clone())
            .map_err(|err| AuthError::InvalidJson(err.to_string()))?;
        let raw_id = refresh.id.ok_or(AuthError::MissingRecordId)?;
        let record_id = raw_id
            .parse::<i64>()
            .map_err(|_| AuthError::InvalidClaim("id", raw_id.clone()))?;
        let claims = Claims::try_from(value)?;
        Ok(Self { claims, record_id })
    }
}
