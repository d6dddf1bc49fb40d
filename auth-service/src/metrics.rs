use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    login_attempts: IntCounterVec,
    registrations: IntCounterVec,
    token_refreshes: IntCounterVec,
}

impl AuthMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let login_attempts = counter(
            &registry,
            "auth_login_attempts_total",
            "Count of login attempts grouped by outcome",
        )?;
        let registrations = counter(
            &registry,
            "auth_registrations_total",
            "Count of credential registrations grouped by outcome",
        )?;
        let token_refreshes = counter(
            &registry,
            "auth_token_refresh_total",
            "Count of refresh-token exchanges grouped by outcome",
        )?;

        Ok(Self {
            registry,
            login_attempts,
            registrations,
            token_refreshes,
        })
    }

    pub fn login_attempt(&self, outcome: &str) {
        self.login_attempts.with_label_values(&[outcome]).inc();
    }

    pub fn registration(&self, outcome: &str) {
        self.registrations.with_label_values(&[outcome]).inc();
    }

    pub fn token_refresh(&self, outcome: &str) {
        self.token_refreshes.with_label_values(&[outcome]).inc();
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

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounterVec> {
    let vec = IntCounterVec::new(Opts::new(name, help), &["outcome"])?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}
