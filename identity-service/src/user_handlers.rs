use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use common_auth::{AdminOnly, RequireRole};
use common_http_errors::ApiResult;
use tracing::info;

use crate::auth_handlers::{json_body, SessionResponse};
use crate::session::RegisterUser;
use crate::AppState;

/// Admin-only provisioning of manager accounts. No cookies are issued.
pub async fn create_user(
    State(state): State<AppState>,
    admin: RequireRole<AdminOnly>,
    payload: Result<Json<RegisterUser>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let request = json_body(payload)?;
    let user = state.sessions.create_manager(request).await?;
    info!(
        created = user.id,
        by = admin.auth.claims.subject(),
        "user provisioned by admin"
    );
    Ok((StatusCode::CREATED, Json(SessionResponse { id: user.id })))
}
