use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use tracing::warn;

use crate::extractors::AuthContext;
use crate::roles::Role;
use crate::verifier::JwtVerifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    Forbidden { required: Vec<Role>, actual: Role },
}

impl From<GuardError> for ApiError {
    fn from(value: GuardError) -> Self {
        match value {
            GuardError::Forbidden { .. } => ApiError::Forbidden {
                message: "You don't have the permission".to_string(),
            },
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Allows the request iff the authenticated role is in `allowed`.
pub fn ensure_role(auth: &AuthContext, allowed: &[Role]) -> Result<(), GuardError> {
    let actual = auth.role();
    if allowed.contains(&actual) {
        return Ok(());
    }

    warn!(
        subject = auth.claims.subject(),
        role = %actual,
        ?allowed,
        "role_check_failed"
    );
    Err(GuardError::Forbidden {
        required: allowed.to_vec(),
        actual,
    })
}

/// Compile-time allow-list for [`RequireRole`].
pub trait RoleSet: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

pub struct AdminOnly;

impl RoleSet for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// Authenticates, then authorizes against `R::ALLOWED`. The first failing step ends the
/// request: 401 from authentication, 403 from the role check.
pub struct RequireRole<R: RoleSet> {
    pub auth: AuthContext,
    _roles: PhantomData<R>,
}

#[async_trait]
impl<S, R> FromRequestParts<S> for RequireRole<R>
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
    R: RoleSet,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;
        ensure_role(&auth, R::ALLOWED)?;
        Ok(Self {
            auth,
            _roles: PhantomData,
        })
    }
}
