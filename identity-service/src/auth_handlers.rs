use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Response,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use common_auth::{AuthContext, AuthError, JwkSet, RefreshContext};
use common_http_errors::{ApiError, ApiResult};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::cookies::{clear_session_cookies, set_session_cookies};
use crate::session::{LoginRequest, RegisterUser, SessionError, SessionTokens};
use crate::users::User;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: i64,
}

/// Body-parse failures share the service error envelope instead of axum's plain-text reply.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request("invalid_body", rejection.body_text()))
}

fn session_reply(
    state: &AppState,
    jar: CookieJar,
    tokens: SessionTokens,
) -> (CookieJar, Json<SessionResponse>) {
    let jar = set_session_cookies(jar, &state.cookies, &tokens.access, &tokens.refresh);
    (jar, Json(SessionResponse { id: tokens.user_id }))
}

pub async fn welcome() -> &'static str {
    "Welcome to auth service"
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn render_metrics(State(state): State<AppState>) -> ApiResult<Response> {
    state.metrics.render().map_err(ApiError::internal)
}

pub async fn jwks(State(state): State<AppState>) -> Json<JwkSet> {
    Json(state.sessions.issuer().jwks())
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<RegisterUser>, JsonRejection>,
) -> ApiResult<(StatusCode, CookieJar, Json<SessionResponse>)> {
    let request = json_body(payload)?;
    match state.sessions.register(request).await {
        Ok(tokens) => {
            state.metrics.registration("success");
            let (jar, body) = session_reply(&state, jar, tokens);
            Ok((StatusCode::CREATED, jar, body))
        }
        Err(err) => {
            state.metrics.registration(outcome_label(&err));
            Err(err.into())
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<(CookieJar, Json<SessionResponse>)> {
    let request = json_body(payload)?;
    match state.sessions.login(request).await {
        Ok(tokens) => {
            state.metrics.login_attempt("success");
            Ok(session_reply(&state, jar, tokens))
        }
        Err(err) => {
            state.metrics.login_attempt(outcome_label(&err));
            Err(err.into())
        }
    }
}

/// Cookie rejections are counted too, so `auth_refresh_total` sees every attempt.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    presented: Result<RefreshContext, AuthError>,
) -> ApiResult<(CookieJar, Json<SessionResponse>)> {
    let presented = presented.map_err(|err| {
        state.metrics.refresh("rejected");
        ApiError::from(err)
    })?;
    match state.sessions.refresh(&presented.refresh).await {
        Ok(tokens) => {
            state.metrics.refresh("rotated");
            Ok(session_reply(&state, jar, tokens))
        }
        Err(err) => {
            state.metrics.refresh(outcome_label(&err));
            Err(err.into())
        }
    }
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    auth: AuthContext,
    presented: RefreshContext,
) -> ApiResult<(CookieJar, Json<Value>)> {
    state
        .sessions
        .logout(&presented.refresh)
        .await
        .map_err(ApiError::from)?;
    info!(subject = auth.claims.subject(), "session cookies cleared");
    Ok((clear_session_cookies(jar, &state.cookies), Json(json!({}))))
}

pub async fn whoami(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<User>> {
    let user_id = auth
        .claims
        .user_id()
        .map_err(|_| ApiError::Unauthenticated)?;
    let user = state.sessions.profile(user_id).await?;
    Ok(Json(user))
}

fn outcome_label(err: &SessionError) -> &'static str {
    match err {
        SessionError::Validation(_) => "invalid_request",
        SessionError::InvalidCredentials => "invalid_credentials",
        SessionError::Unauthenticated => "rejected",
        SessionError::Conflict => "conflict",
        SessionError::Storage(_) => "error",
    }
}
