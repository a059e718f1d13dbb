use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Registry, TextEncoder};

#[derive(Clone)]
pub struct ApiMetrics {
    registry: Registry,
    requests: IntCounterVec,
    login_attempts: IntCounterVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            prometheus::Opts::new("api_requests_total", "Count of API requests by route and outcome"),
            &["route", "outcome"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        let login_attempts = IntCounterVec::new(
            prometheus::Opts::new("api_login_attempts_total", "Count of login attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(login_attempts.clone()))?;

        Ok(Self { registry, requests, login_attempts })
    }

    pub fn record_request(&self, route: &str, outcome: &str) {
        self.requests.with_label_values(&[route, outcome]).inc();
    }

    pub fn record_login(&self, outcome: &str) {
        self.login_attempts.with_label_values(&[outcome]).inc();
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"))
            .body(Body::from(buffer))?)
    }
}

