// tests/feedback_http.rs
//
// HTTP-level tests for the feedback router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /feedback/health
// - GET /feedback/relevant  (noted, already noted, 400s, 429)
// - the relevance log is append-only JSONL

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt as _; // for `oneshot`

use trend_monitor::feedback::{server, FeedbackService, SlidingWindowLimiter};
use trend_monitor::store::RelevanceStore;

const BODY_LIMIT: usize = 64 * 1024;
const ITEM: &str = "0123456789abcdef";
const EMAIL: &str = "analyst@bank.io";

struct Fixture {
    _dir: TempDir,
    store: Arc<RelevanceStore>,
    app: Router,
}

fn fixture(max_per_window: usize) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(RelevanceStore::open(dir.path().join("feedback.jsonl")).expect("open"));
    let service = FeedbackService::new(
        store.clone(),
        SlidingWindowLimiter::new(max_per_window, Duration::from_secs(60)),
    );
    Fixture {
        _dir: dir,
        store,
        app: server::router(Arc::new(service)),
    }
}

async fn get(app: &Router, uri: &str, client: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, String::from_utf8(bytes).expect("utf8"))
}

fn relevant_uri(item: &str, email: &str) -> String {
    format!("/feedback/relevant?item_id={item}&email={email}&run_id=digest-2025-06-01-0800")
}

#[tokio::test]
async fn health_is_200() {
    let fx = fixture(30);
    let (status, body) = get(&fx.app, "/feedback/health", "10.0.0.1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("running"));
}

#[tokio::test]
async fn first_click_noted_second_already_noted() {
    let fx = fixture(30);

    let (status, body) = get(&fx.app, &relevant_uri(ITEM, EMAIL), "10.0.0.2").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Thanks! Noted."), "body: {body}");
    assert_eq!(fx.store.boost_set(EMAIL).len(), 1);

    // Same pair, different case: still the same (recipient, item).
    let uri = relevant_uri(&ITEM.to_uppercase(), "Analyst@Bank.io");
    let (status, body) = get(&fx.app, &uri, "10.0.0.2").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Already noted."), "body: {body}");
    assert_eq!(fx.store.boost_set(EMAIL).len(), 1);

    let raw = std::fs::read_to_string(fx._dir.path().join("feedback.jsonl")).expect("read log");
    assert_eq!(raw.lines().count(), 1);
    let line: serde_json::Value = serde_json::from_str(raw.trim()).expect("json line");
    assert_eq!(line["email"], EMAIL);
    assert_eq!(line["item_id"], ITEM);
    assert_eq!(line["run_id"], "digest-2025-06-01-0800");
}

#[tokio::test]
async fn malformed_input_is_400_and_not_recorded() {
    let fx = fixture(30);

    for uri in [
        relevant_uri("xyz", EMAIL),
        relevant_uri("0123456789abcdeZ", EMAIL),
        relevant_uri(ITEM, "not-an-email"),
        "/feedback/relevant?email=analyst@bank.io".to_string(),
        format!("/feedback/relevant?item_id={ITEM}"),
    ] {
        let (status, _) = get(&fx.app, &uri, "10.0.0.3").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri: {uri}");
    }
    assert_eq!(fx.store.recipients(), 0);
}

#[tokio::test]
async fn rate_limit_applies_per_client() {
    let fx = fixture(30);

    for _ in 0..30 {
        let (status, _) = get(&fx.app, &relevant_uri(ITEM, EMAIL), "10.0.0.4").await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = get(&fx.app, &relevant_uri(ITEM, EMAIL), "10.0.0.4").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body.contains("Too many requests"));

    // A different client is unaffected.
    let (status, _) = get(&fx.app, &relevant_uri(ITEM, EMAIL), "10.0.0.5").await;
    assert_eq!(status, StatusCode::OK);
}
