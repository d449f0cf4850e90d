use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use common_auth::{AdminOnly, RequireRole};
use common_http_errors::{ApiError, ApiResult};
use tracing::info;

use crate::auth_handlers::{json_body, SessionResponse};
use crate::tenants::NewTenant;
use crate::AppState;

pub async fn create_tenant(
    State(state): State<AppState>,
    admin: RequireRole<AdminOnly>,
    payload: Result<Json<NewTenant>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let request = json_body(payload)?;
    let name = required("Name", &request.name)?;
    let address = required("Address", &request.address)?;

    let tenant = state
        .tenants
        .create(NewTenant {
            name: name.to_string(),
            address: address.to_string(),
        })
        .await
        .map_err(|err| ApiError::internal(format!("{err:#}")))?;

    info!(
        tenant_id = tenant.id,
        by = admin.auth.claims.subject(),
        "tenant created"
    );
    Ok((StatusCode::CREATED, Json(SessionResponse { id: tenant.id })))
}

fn required<'a>(field: &str, value: &'a str) -> ApiResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(
            "validation_failed",
            format!("{field} is required!"),
        ));
    }
    Ok(trimmed)
}
