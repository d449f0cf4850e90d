use std::sync::Arc;

use common_auth::{IdentityClaims, RefreshClaims, Role};
use common_http_errors::ApiError;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::credentials::CredentialHasher;
use crate::refresh_store::RefreshTokenStore;
use crate::tenants::TenantStore;
use crate::tokens::{IssuedToken, TokenIssuer};
use crate::users::{NewUser, User, UserStore, UserStoreError};

const INVALID_CREDENTIALS: &str = "Email or password does not match";
const UNKNOWN_TENANT: &str = "Tenant not found!";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("Email or password does not match")]
    InvalidCredentials,
    #[error("session is no longer valid")]
    Unauthenticated,
    #[error("Email already exists")]
    Conflict,
    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<anyhow::Error> for SessionError {
    fn from(value: anyhow::Error) -> Self {
        Self::Storage(value)
    }
}

impl From<UserStoreError> for SessionError {
    fn from(value: UserStoreError) -> Self {
        match value {
            UserStoreError::DuplicateEmail => Self::Conflict,
            UserStoreError::UnknownTenant => Self::Validation(UNKNOWN_TENANT.to_string()),
            UserStoreError::Other(err) => Self::Storage(err),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::Validation(message) => ApiError::bad_request("validation_failed", message),
            SessionError::InvalidCredentials => {
                ApiError::bad_request("invalid_credentials", INVALID_CREDENTIALS)
            }
            SessionError::Unauthenticated => ApiError::Unauthenticated,
            SessionError::Conflict => ApiError::Conflict {
                message: "Email already exists!".to_string(),
            },
            SessionError::Storage(err) => ApiError::internal(format!("{err:#}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub tenant_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A freshly issued pair plus the user it belongs to.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub user_id: i64,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Coordinates credential checks, token issuance and refresh-record rotation.
pub struct SessionService {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    tenants: Arc<dyn TenantStore>,
    issuer: Arc<TokenIssuer>,
    hasher: CredentialHasher,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        tenants: Arc<dyn TenantStore>,
        issuer: Arc<TokenIssuer>,
        hasher: CredentialHasher,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            tenants,
            issuer,
            hasher,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Self-service sign-up; always creates a customer, and customers are never tenant-scoped.
    pub async fn register(&self, request: RegisterUser) -> Result<SessionTokens, SessionError> {
        if request.tenant_id.is_some() {
            warn!("ignoring tenantId on self-registration");
        }
        let user = self.create_user(request, Role::Customer, None).await?;
        info!(user_id = user.id, "user registered");
        self.open_session(&user).await
    }

    pub async fn login(&self, request: LoginRequest) -> Result<SessionTokens, SessionError> {
        let email = required("Email", &request.email)?;
        required("Password", &request.password)?;

        let Some(credentials) = self.users.find_by_email(email).await? else {
            self.hasher.burn_verification(&request.password);
            warn!("login rejected: unknown email");
            return Err(SessionError::InvalidCredentials);
        };

        if !self
            .hasher
            .verify(&request.password, &credentials.password_hash)
        {
            warn!(user_id = credentials.user.id, "login rejected: password mismatch");
            return Err(SessionError::InvalidCredentials);
        }

        let tokens = self.open_session(&credentials.user).await?;
        info!(user_id = credentials.user.id, "user logged in");
        Ok(tokens)
    }

    /// Rotates a verified refresh token. The new record is persisted before the old one is
    /// deleted; if another request already consumed the old record, the new one is removed
    /// again and the call fails.
    pub async fn refresh(&self, presented: &RefreshClaims) -> Result<SessionTokens, SessionError> {
        let previous = presented.record_id;
        if !self.refresh_tokens.exists(previous).await? {
            warn!(record_id = previous, "refresh rejected: record revoked");
            return Err(SessionError::Unauthenticated);
        }

        let user_id = presented
            .claims
            .user_id()
            .map_err(|_| SessionError::Unauthenticated)?;
        let Some(user) = self.users.find_by_id(user_id).await? else {
            warn!(user_id, "refresh rejected: user no longer exists");
            return Err(SessionError::Unauthenticated);
        };

        let identity = presented.claims.identity.clone();
        let access = self.issuer.issue_access_token(&identity)?;
        let record = self.refresh_tokens.persist(user.id).await?;

        if !self.refresh_tokens.delete(previous).await? {
            if let Err(err) = self.refresh_tokens.delete(record.id).await {
                error!(error = ?err, record_id = record.id, "failed to discard orphaned refresh record");
            }
            warn!(record_id = previous, "refresh rejected: record consumed concurrently");
            return Err(SessionError::Unauthenticated);
        }

        let refresh = self.issuer.issue_refresh_token(&identity, record.id)?;
        info!(user_id = user.id, previous, next = record.id, "refresh token rotated");
        Ok(SessionTokens {
            user_id: user.id,
            access,
            refresh,
        })
    }

    /// Succeeds whether or not the record still existed.
    pub async fn logout(&self, presented: &RefreshClaims) -> Result<(), SessionError> {
        let removed = self.refresh_tokens.delete(presented.record_id).await?;
        info!(
            subject = presented.claims.subject(),
            record_id = presented.record_id,
            removed,
            "user logged out"
        );
        Ok(())
    }

    pub async fn profile(&self, user_id: i64) -> Result<User, SessionError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(SessionError::Unauthenticated)
    }

    /// Admin-provisioned account; always a manager. A tenant, when given, must exist.
    pub async fn create_manager(&self, request: RegisterUser) -> Result<User, SessionError> {
        if let Some(tenant_id) = request.tenant_id {
            if self.tenants.find_by_id(tenant_id).await?.is_none() {
                warn!(tenant_id, "manager rejected: unknown tenant");
                return Err(SessionError::Validation(UNKNOWN_TENANT.to_string()));
            }
        }
        let tenant_id = request.tenant_id;
        let user = self.create_user(request, Role::Manager, tenant_id).await?;
        info!(user_id = user.id, tenant_id = ?user.tenant_id, "manager created");
        Ok(user)
    }

    async fn create_user(
        &self,
        request: RegisterUser,
        role: Role,
        tenant_id: Option<i64>,
    ) -> Result<User, SessionError> {
        let first_name = required("First name", &request.first_name)?;
        let last_name = required("Last name", &request.last_name)?;
        let email = required("Email", &request.email)?;
        required("Password", &request.password)?;

        if self.users.find_by_email(email).await?.is_some() {
            return Err(SessionError::Conflict);
        }

        let password_hash = self.hasher.hash(&request.password)?;
        let user = self
            .users
            .create(NewUser {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: email.to_string(),
                password_hash,
                role,
                tenant_id,
            })
            .await?;
        Ok(user)
    }

    async fn open_session(&self, user: &User) -> Result<SessionTokens, SessionError> {
        let identity = identity_for(user);
        let access = self.issuer.issue_access_token(&identity)?;
        let record = self.refresh_tokens.persist(user.id).await?;
        let refresh = self.issuer.issue_refresh_token(&identity, record.id)?;
        Ok(SessionTokens {
            user_id: user.id,
            access,
            refresh,
        })
    }
}

fn identity_for(user: &User) -> IdentityClaims {
    IdentityClaims::new(
        user.id.to_string(),
        user.role,
        user.tenant_id.map(|tenant| tenant.to_string()),
    )
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, SessionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SessionError::Validation(format!("{field} is required!")));
    }
    Ok(trimmed)
}
