use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{request::Parts, HeaderMap};
use axum_extra::extract::cookie::CookieJar;

use crate::claims::{Claims, RefreshClaims};
use crate::error::{AuthError, AuthResult};
use crate::roles::Role;
use crate::verifier::{JwtVerifier, RefreshVerifier};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Verified access-token identity attached to the request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub token: String,
}

impl AuthContext {
    pub fn role(&self) -> Role {
        self.claims.role()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<JwtVerifier>::from_ref(state);
        let token = cookie_token(&parts.headers, ACCESS_TOKEN_COOKIE)?;
        let claims = verifier.verify(&token)?;

        Ok(Self { claims, token })
    }
}

/// Verified refresh-token identity. Whether the backing record still exists is decided by
/// the session layer before anything is issued.
#[derive(Debug, Clone)]
pub struct RefreshContext {
    pub refresh: RefreshClaims,
    pub token: String,
}

impl RefreshContext {
    pub fn record_id(&self) -> i64 {
        self.refresh.record_id
    }

    pub fn claims(&self) -> &Claims {
        &self.refresh.claims
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RefreshContext
where
    Arc<RefreshVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<RefreshVerifier>::from_ref(state);
        let token = cookie_token(&parts.headers, REFRESH_TOKEN_COOKIE)?;
        let refresh = verifier.verify(&token)?;

        Ok(Self { refresh, token })
    }
}

fn cookie_token(headers: &HeaderMap, name: &'static str) -> AuthResult<String> {
    let jar = CookieJar::from_headers(headers);
    let token = jar
        .get(name)
        .map(|cookie| cookie.value().trim().to_owned())
        .unwrap_or_default();

    if token.is_empty() {
        return Err(AuthError::MissingToken(name));
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::COOKIE, HeaderValue, Request};
    use chrono::Utc;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;

    use crate::config::JwtConfig;

    #[derive(Clone)]
    struct TestState {
        access: Arc<JwtVerifier>,
        refresh: Arc<RefreshVerifier>,
    }

    impl FromRef<TestState> for Arc<JwtVerifier> {
        fn from_ref(state: &TestState) -> Self {
            state.access.clone()
        }
    }

    impl FromRef<TestState> for Arc<RefreshVerifier> {
        fn from_ref(state: &TestState) -> Self {
            state.refresh.clone()
        }
    }

    fn state() -> TestState {
        let config = JwtConfig::new("issuer", "aud");
        TestState {
            access: Arc::new(JwtVerifier::new(config.clone())),
            refresh: Arc::new(RefreshVerifier::new(config, b"refresh-secret")),
        }
    }

    fn parts_with_cookie(cookie: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/auth/refresh");
        if let Some(value) = cookie {
            builder = builder.header(COOKIE, value);
        }
        builder.body(()).expect("request").into_parts().0
    }

    fn refresh_token(record_id: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = json!({
            "sub": "8",
            "role": "customer",
            "tenant": "",
            "id": record_id,
            "iss": "issuer",
            "aud": "aud",
            "iat": now,
            "exp": now + 600,
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"refresh-secret"),
        )
        .expect("sign")
    }

    #[test]
    fn cookie_token_reads_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; accessToken=abc.def.ghi; refreshToken=x.y.z"),
        );
        assert_eq!(cookie_token(&headers, ACCESS_TOKEN_COOKIE).unwrap(), "abc.def.ghi");
        assert_eq!(cookie_token(&headers, REFRESH_TOKEN_COOKIE).unwrap(), "x.y.z");
    }

    #[test]
    fn cookie_token_rejects_missing_and_empty() {
        let headers = HeaderMap::new();
        let err = cookie_token(&headers, ACCESS_TOKEN_COOKIE).expect_err("missing");
        assert!(matches!(err, AuthError::MissingToken(ACCESS_TOKEN_COOKIE)));

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("accessToken="));
        assert!(cookie_token(&headers, ACCESS_TOKEN_COOKIE).is_err());
    }

    #[tokio::test]
    async fn auth_context_requires_cookie() {
        let mut parts = parts_with_cookie(None);
        let err = AuthContext::from_request_parts(&mut parts, &state())
            .await
            .expect_err("no cookie");
        assert!(matches!(err, AuthError::MissingToken(_)));
    }

    #[tokio::test]
    async fn auth_context_rejects_garbage_token() {
        let mut parts = parts_with_cookie(Some("accessToken=not-a-jwt"));
        let err = AuthContext::from_request_parts(&mut parts, &state())
            .await
            .expect_err("garbage");
        assert!(matches!(err, AuthError::InvalidHeader(_)));
    }

    #[tokio::test]
    async fn refresh_context_extracts_record_id() {
        let token = refresh_token("31");
        let cookie = format!("{REFRESH_TOKEN_COOKIE}={token}");
        let mut parts = parts_with_cookie(Some(&cookie));
        let ctx = RefreshContext::from_request_parts(&mut parts, &state())
            .await
            .expect("valid refresh cookie");
        assert_eq!(ctx.record_id(), 31);
        assert_eq!(ctx.claims().role(), Role::Customer);
        assert_eq!(ctx.claims().tenant(), None);
        assert_eq!(ctx.token, token);
    }

    #[tokio::test]
    async fn refresh_context_ignores_access_cookie() {
        let token = refresh_token("31");
        let cookie = format!("{ACCESS_TOKEN_COOKIE}={token}");
        let mut parts = parts_with_cookie(Some(&cookie));
        let err = RefreshContext::from_request_parts(&mut parts, &state())
            .await
            .expect_err("wrong cookie");
        assert!(matches!(err, AuthError::MissingToken(REFRESH_TOKEN_COOKIE)));
    }
}
