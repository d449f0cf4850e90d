use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use thiserror::Error;
use tracing::{debug, warn};

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("cookie '{0}' missing")]
    MissingToken(&'static str),
    #[error("token missing kid header")]
    MissingKeyId,
    #[error("no decoding key registered for kid '{0}'")]
    UnknownKeyId(String),
    #[error("failed to decode token header: {0}")]
    InvalidHeader(String),
    #[error("token verification failed: {0}")]
    Verification(String),
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
    #[error("refresh token carries no record id")]
    MissingRecordId,
    #[error("failed to parse decoding key for kid '{0}': {1}")]
    KeyParse(String, String),
    #[error("failed to fetch JWKS: {0}")]
    JwksFetch(String),
    #[error("failed to parse JWKS response: {0}")]
    JwksDecode(String),
    #[error("JWKS entry missing key id (kid)")]
    JwksMissingKid,
    #[error("JWKS key '{0}' missing required RSA components")]
    JwksMissingComponents(String),
    #[error("JWKS key '{kid}' uses unsupported key type '{kty}'")]
    JwksUnsupportedKey { kid: String, kty: String },
    #[error("JWKS key '{kid}' uses unsupported alg '{alg}'")]
    JwksUnsupportedAlg { kid: String, alg: String },
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        Self::Verification(value.to_string())
    }
}

impl AuthError {
    /// Key-set failures are configuration problems; everything else is the caller's token.
    pub fn is_key_set_failure(&self) -> bool {
        matches!(
            self,
            AuthError::JwksFetch(_)
                | AuthError::JwksDecode(_)
                | AuthError::JwksMissingKid
                | AuthError::JwksMissingComponents(_)
                | AuthError::JwksUnsupportedKey { .. }
                | AuthError::JwksUnsupportedAlg { .. }
        )
    }
}

/// Every failure while authenticating a request is a 401; the response never says why.
impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        if value.is_key_set_failure() {
            warn!(reason = %value, "request rejected: verification keys unavailable");
        } else {
            debug!(reason = %value, "request authentication failed");
        }
        ApiError::Unauthenticated
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn key_set_failures_reject_the_request() {
        let cases = [
            AuthError::JwksFetch("connection refused".into()),
            AuthError::JwksDecode("expected value".into()),
            AuthError::UnknownKeyId("rotated".into()),
            AuthError::MissingToken("accessToken"),
        ];
        for err in cases {
            assert_eq!(ApiError::from(err).status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn classifies_key_set_failures() {
        assert!(AuthError::JwksMissingKid.is_key_set_failure());
        assert!(!AuthError::MissingKeyId.is_key_set_failure());
    }
}
