// src/metrics.rs
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Process-wide Prometheus recorder for the feedback server.
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Only one recorder can exist per process; a second call errors.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        gauge!("process_start_unix_seconds").set(chrono::Utc::now().timestamp() as f64);

        Ok(Self { handle })
    }

    /// `GET /metrics` in the exposition format.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(scrape))
            .with_state(self.handle.clone())
    }
}

async fn scrape(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], handle.render())
}
