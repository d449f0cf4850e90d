use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    login_attempts: IntCounterVec,
    refreshes: IntCounterVec,
    registrations: IntCounterVec,
}

impl AuthMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let login_attempts = IntCounterVec::new(
            Opts::new(
                "auth_login_attempts_total",
                "Count of login attempts grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(login_attempts.clone()))?;

        let refreshes = IntCounterVec::new(
            Opts::new(
                "auth_refresh_total",
                "Count of refresh token rotations grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(refreshes.clone()))?;

        let registrations = IntCounterVec::new(
            Opts::new(
                "auth_registrations_total",
                "Count of self-service registrations grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(registrations.clone()))?;

        common_http_errors::register_metrics(&registry)?;

        Ok(Self {
            registry,
            login_attempts,
            refreshes,
            registrations,
        })
    }

    pub fn login_attempt(&self, outcome: &str) {
        self.login_attempts.with_label_values(&[outcome]).inc();
    }

    pub fn refresh(&self, outcome: &str) {
        self.refreshes.with_label_values(&[outcome]).inc();
    }

    pub fn registration(&self, outcome: &str) {
        self.registrations.with_label_values(&[outcome]).inc();
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
