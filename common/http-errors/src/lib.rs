use std::future::Future;
use std::pin::Pin;

use axum::{
    extract::Request,
    http::{header::CONTENT_LENGTH, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts, Registry};
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

pub const ERROR_CODE_HEADER: &str = "X-Error-Code";

/// Counts error responses that pass through [`error_envelope_layer`].
pub static HTTP_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "http_errors_total",
            "Count of HTTP error responses emitted (status >= 400)",
        ),
        &["service", "code", "status"],
    )
    .expect("http_errors_total metric definition")
});

/// Adds the shared error counter to a service registry.
pub fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(HTTP_ERRORS_TOTAL.clone()))
}

#[derive(Serialize, Debug, Clone)]
pub struct ErrorItem {
    #[serde(rename = "ref")]
    pub reference: Uuid,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    pub path: String,
    pub method: String,
    pub location: &'static str,
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub errors: Vec<ErrorItem>,
}

/// Carried in response extensions so the envelope layer can fill in request details.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub code: &'static str,
    pub item: ErrorItem,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: &'static str, message: String },
    Conflict { message: String },
    Unauthenticated,
    Forbidden { message: String },
    NotFound { code: &'static str },
    Internal { message: Option<String> },
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal {
            message: Some(e.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } | ApiError::Conflict { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. } => code,
            ApiError::Conflict { .. } => "conflict",
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Forbidden { .. } => "forbidden",
            ApiError::NotFound { code } => code,
            ApiError::Internal { .. } => "internal_error",
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest { .. } | ApiError::Conflict { .. } => "BadRequestError",
            ApiError::Unauthenticated => "UnauthorizedError",
            ApiError::Forbidden { .. } => "ForbiddenError",
            ApiError::NotFound { .. } => "NotFoundError",
            ApiError::Internal { .. } => "InternalServerError",
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest { message, .. } | ApiError::Conflict { message } => {
                message.clone()
            }
            ApiError::Unauthenticated => "Unauthorized".to_string(),
            ApiError::Forbidden { message } => message.clone(),
            ApiError::NotFound { .. } => "Not found".to_string(),
            // Internal detail stays in the logs.
            ApiError::Internal { .. } => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let reference = Uuid::new_v4();
        if let ApiError::Internal {
            message: Some(detail),
        } = &self
        {
            error!(error_ref = %reference, detail = %detail, "internal error");
        }

        let item = ErrorItem {
            reference,
            kind: self.kind(),
            message: self.public_message(),
            path: String::new(),
            method: String::new(),
            location: "server",
        };
        let code = self.code();
        let mut resp = (
            self.status(),
            Json(ErrorBody {
                errors: vec![item.clone()],
            }),
        )
            .into_response();
        if let Ok(val) = HeaderValue::from_str(code) {
            resp.headers_mut().insert(ERROR_CODE_HEADER, val);
        }
        resp.extensions_mut().insert(ErrorReport { code, item });
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

type EnvelopeFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Middleware for `axum::middleware::from_fn` that stamps the request path and method into
/// error bodies and counts error responses per service.
pub fn error_envelope_layer(
    service: &'static str,
) -> impl Fn(Request, Next) -> EnvelopeFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        Box::pin(async move {
            let response = next.run(req).await;
            complete_envelope(service, &method, &path, response)
        })
    }
}

fn complete_envelope(service: &str, method: &str, path: &str, response: Response) -> Response {
    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    let status = response.status();
    HTTP_ERRORS_TOTAL
        .with_label_values(&[service, report.code, status.as_str()])
        .inc();
    if status.is_server_error() {
        error!(error_ref = %report.item.reference, method, path, status = status.as_u16(), "request failed");
    } else {
        debug!(error_ref = %report.item.reference, method, path, status = status.as_u16(), code = report.code, "request rejected");
    }

    let mut item = report.item;
    item.path = path.to_string();
    item.method = method.to_string();

    let (parts, _) = response.into_parts();
    let mut rebuilt = (parts.status, Json(ErrorBody { errors: vec![item] })).into_response();
    for (name, value) in parts.headers.iter() {
        if name != CONTENT_LENGTH {
            rebuilt.headers_mut().insert(name.clone(), value.clone());
        }
    }
    rebuilt
}
