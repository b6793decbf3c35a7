// src/feedback/server.rs
//! HTTP framing of the feedback service.
//!
//! GET /feedback/relevant?item_id=..&email=..&run_id=..
//!   200 "Thanks! Noted." | 200 "Already noted." | 400 | 429 | 500
//! GET /feedback/health

use axum::{
    extract::{ConnectInfo, FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::{FeedbackOutcome, FeedbackRequest, FeedbackService};
use crate::error::ValidationError;
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct FeedbackState {
    service: Arc<FeedbackService>,
}

/// Originating network identity used for rate limiting: the peer address,
/// else the first `X-Forwarded-For` hop, else `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(ClientIp(addr.ip().to_string()));
        }
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        Ok(ClientIp(forwarded.unwrap_or("unknown").to_string()))
    }
}

fn page(status: StatusCode, title: &str, message: &str) -> Response {
    let body = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{t}</title></head>\
         <body style=\"font-family:sans-serif;text-align:center;padding:2em\">\
         <h2>{t}</h2><p>{m}</p></body></html>",
        t = html_escape::encode_text(title),
        m = html_escape::encode_text(message),
    );
    (status, Html(body)).into_response()
}

async fn health() -> Response {
    page(StatusCode::OK, "OK", "Feedback server is running.")
}

async fn relevant(
    State(state): State<FeedbackState>,
    ClientIp(client): ClientIp,
    Query(req): Query<FeedbackRequest>,
) -> Response {
    match state.service.submit(&client, &req) {
        FeedbackOutcome::Noted => page(StatusCode::OK, "Thanks!", "Thanks! Noted."),
        FeedbackOutcome::AlreadyNoted => page(StatusCode::OK, "Thanks!", "Already noted."),
        FeedbackOutcome::Invalid(e) => {
            let msg = match e {
                ValidationError::ItemIdFormat => "Invalid item id.",
                ValidationError::EmailFormat => "Invalid email address.",
                ValidationError::InvalidParameter { .. } => "Invalid request.",
            };
            page(StatusCode::BAD_REQUEST, "Invalid request", msg)
        }
        FeedbackOutcome::RateLimited => page(
            StatusCode::TOO_MANY_REQUESTS,
            "Slow down",
            "Too many requests. Please try again later.",
        ),
        FeedbackOutcome::Failed => page(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error",
            "Something went wrong. Please try again later.",
        ),
    }
}

pub fn router(service: Arc<FeedbackService>) -> Router {
    Router::new()
        .route("/feedback/health", get(health))
        .route("/feedback/relevant", get(relevant))
        .layer(CorsLayer::very_permissive())
        .with_state(FeedbackState { service })
}

/// Bind and serve until the process is stopped. `/metrics` is mounted when a
/// recorder is supplied.
pub async fn serve(
    service: Arc<FeedbackService>,
    bind: &str,
    metrics: Option<&Metrics>,
) -> anyhow::Result<()> {
    use anyhow::Context as _;

    let mut app = router(service);
    if let Some(m) = metrics {
        app = app.merge(m.router());
    }
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding feedback server to {bind}"))?;
    tracing::info!(target: "feedback", %bind, "feedback server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("feedback server")?;
    Ok(())
}
