use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use common_auth::{IdentityClaims, JwkSet, Role};
use jsonwebtoken::{encode, Algorithm, Header};
use serde::Serialize;

use crate::keys::SigningKeys;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 60 * 60;
pub const REFRESH_TOKEN_TTL_SECONDS: i64 = 60 * 60 * 24 * 365;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

impl TokenConfig {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl_seconds: ACCESS_TOKEN_TTL_SECONDS,
            refresh_ttl_seconds: REFRESH_TOKEN_TTL_SECONDS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub max_age_seconds: i64,
}

#[derive(Serialize)]
struct AccessClaims<'a> {
    sub: &'a str,
    role: Role,
    tenant: &'a str,
    iss: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Serialize)]
struct RefreshTokenClaims<'a> {
    sub: &'a str,
    role: Role,
    tenant: &'a str,
    id: String,
    iss: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Signs access tokens (RS256, `kid` in the header) and refresh tokens (HS256 carrying the
/// persisted record id). Issuing a refresh token does not persist anything.
pub struct TokenIssuer {
    config: TokenConfig,
    keys: Arc<SigningKeys>,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig, keys: Arc<SigningKeys>) -> Self {
        Self { config, keys }
    }

    pub fn jwks(&self) -> JwkSet {
        self.keys.jwk_set()
    }

    pub fn issue_access_token(&self, identity: &IdentityClaims) -> Result<IssuedToken> {
        self.issue_access_token_at(identity, Utc::now())
    }

    pub fn issue_refresh_token(
        &self,
        identity: &IdentityClaims,
        record_id: i64,
    ) -> Result<IssuedToken> {
        self.issue_refresh_token_at(identity, record_id, Utc::now())
    }

    pub(crate) fn issue_access_token_at(
        &self,
        identity: &IdentityClaims,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let expires_at = now + Duration::seconds(self.config.access_ttl_seconds);
        let claims = AccessClaims {
            sub: &identity.subject,
            role: identity.role,
            tenant: identity.tenant_claim(),
            iss: &self.config.issuer,
            aud: &self.config.audience,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.keys.kid().to_string());

        let token = encode(&header, &claims, self.keys.access_key())
            .map_err(|err| anyhow!("Failed to sign access token: {err}"))?;

        Ok(IssuedToken {
            token,
            expires_at,
            max_age_seconds: self.config.access_ttl_seconds,
        })
    }

    pub(crate) fn issue_refresh_token_at(
        &self,
        identity: &IdentityClaims,
        record_id: i64,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let expires_at = now + Duration::seconds(self.config.refresh_ttl_seconds);
        let claims = RefreshTokenClaims {
            sub: &identity.subject,
            role: identity.role,
            tenant: identity.tenant_claim(),
            id: record_id.to_string(),
            iss: &self.config.issuer,
            aud: &self.config.audience,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            self.keys.refresh_key(),
        )
        .map_err(|err| anyhow!("Failed to sign refresh token: {err}"))?;

        Ok(IssuedToken {
            token,
            expires_at,
            max_age_seconds: self.config.refresh_ttl_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_auth::{AuthError, JwtConfig, JwtVerifier, RefreshVerifier};
    use jsonwebtoken::decode_header;

    use crate::keys::test_keys::PRIVATE_PEM;

    const ISSUER: &str = "auth-service";
    const AUDIENCE: &str = "auth-service";

    fn keys() -> Arc<SigningKeys> {
        Arc::new(
            SigningKeys::from_private_pem(&PRIVATE_PEM, Some("test-kid".into()), "refresh-secret")
                .unwrap(),
        )
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(TokenConfig::new(ISSUER, AUDIENCE), keys())
    }

    async fn access_verifier(issuer: &TokenIssuer) -> JwtVerifier {
        JwtVerifier::builder(JwtConfig::new(ISSUER, AUDIENCE))
            .with_jwk_set(&issuer.jwks())
            .unwrap()
            .build()
            .await
            .unwrap()
    }

    fn identity(role: Role, tenant: Option<&str>) -> IdentityClaims {
        IdentityClaims::new("42", role, tenant.map(str::to_string))
    }

    #[tokio::test]
    async fn access_token_round_trips_through_verifier() {
        let issuer = issuer();
        let issued = issuer
            .issue_access_token(&identity(Role::Manager, Some("7")))
            .unwrap();

        let header = decode_header(&issued.token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("test-kid"));
        assert_eq!(issued.token.split('.').count(), 3);
        assert_eq!(issued.max_age_seconds, ACCESS_TOKEN_TTL_SECONDS);

        let claims = access_verifier(&issuer).await.verify(&issued.token).unwrap();
        assert_eq!(claims.subject(), "42");
        assert_eq!(claims.role(), Role::Manager);
        assert_eq!(claims.tenant(), Some("7"));
        assert_eq!(claims.issuer, ISSUER);
    }

    #[tokio::test]
    async fn customer_access_token_carries_empty_tenant() {
        let issuer = issuer();
        let issued = issuer
            .issue_access_token(&identity(Role::Customer, None))
            .unwrap();
        let claims = access_verifier(&issuer).await.verify(&issued.token).unwrap();
        assert_eq!(claims.raw["tenant"], "");
        assert_eq!(claims.tenant(), None);
    }

    #[tokio::test]
    async fn expired_access_token_is_rejected() {
        let issuer = issuer();
        let issued = issuer
            .issue_access_token_at(
                &identity(Role::Admin, None),
                Utc::now() - Duration::hours(2),
            )
            .unwrap();
        let err = access_verifier(&issuer)
            .await
            .verify(&issued.token)
            .expect_err("expired");
        assert!(matches!(err, AuthError::Verification(_)));
    }

    #[tokio::test]
    async fn access_token_expired_seconds_ago_is_rejected() {
        let issuer = issuer();
        let issued_at = Utc::now() - Duration::seconds(ACCESS_TOKEN_TTL_SECONDS + 5);
        let issued = issuer
            .issue_access_token_at(&identity(Role::Admin, None), issued_at)
            .unwrap();
        assert!(issued.expires_at < Utc::now());

        let err = access_verifier(&issuer)
            .await
            .verify(&issued.token)
            .expect_err("past exp");
        assert!(matches!(err, AuthError::Verification(_)));
    }

    #[test]
    fn refresh_token_expired_seconds_ago_is_rejected() {
        let issuer = issuer();
        let issued_at = Utc::now() - Duration::seconds(REFRESH_TOKEN_TTL_SECONDS + 5);
        let issued = issuer
            .issue_refresh_token_at(&identity(Role::Customer, None), 3, issued_at)
            .unwrap();

        let verifier = RefreshVerifier::new(JwtConfig::new(ISSUER, AUDIENCE), b"refresh-secret");
        assert!(matches!(
            verifier.verify(&issued.token),
            Err(AuthError::Verification(_))
        ));
    }

    #[test]
    fn refresh_token_carries_record_id() {
        let issuer = issuer();
        let issued = issuer
            .issue_refresh_token(&identity(Role::Customer, None), 99)
            .unwrap();
        assert_eq!(decode_header(&issued.token).unwrap().alg, Algorithm::HS256);
        assert_eq!(issued.max_age_seconds, REFRESH_TOKEN_TTL_SECONDS);

        let verifier = RefreshVerifier::new(JwtConfig::new(ISSUER, AUDIENCE), b"refresh-secret");
        let refresh = verifier.verify(&issued.token).unwrap();
        assert_eq!(refresh.record_id, 99);
        assert_eq!(refresh.claims.subject(), "42");
        assert_eq!(refresh.claims.raw["id"], "99");
    }

    #[tokio::test]
    async fn token_kinds_are_not_interchangeable() {
        let issuer = issuer();
        let identity = identity(Role::Admin, None);
        let access = issuer.issue_access_token(&identity).unwrap();
        let refresh = issuer.issue_refresh_token(&identity, 1).unwrap();

        let refresh_verifier =
            RefreshVerifier::new(JwtConfig::new(ISSUER, AUDIENCE), b"refresh-secret");
        assert!(refresh_verifier.verify(&access.token).is_err());
        assert!(access_verifier(&issuer)
            .await
            .verify(&refresh.token)
            .is_err());
    }

    #[test]
    fn expiry_follows_configured_ttl() {
        let mut config = TokenConfig::new(ISSUER, AUDIENCE);
        config.access_ttl_seconds = 60;
        let issuer = TokenIssuer::new(config, keys());
        let now = Utc::now();
        let issued = issuer
            .issue_access_token_at(&identity(Role::Admin, None), now)
            .unwrap();
        assert_eq!(issued.expires_at, now + Duration::seconds(60));
        assert_eq!(issued.max_age_seconds, 60);
    }
}
