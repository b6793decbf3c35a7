// src/feedback/mod.rs
//! Feedback ingestion: a recipient clicks "Relevant" on a digest entry and the
//! click is recorded once in the relevance store.
//!
//! Order of checks: rate limit, item id, email, then the idempotent append.

pub mod rate_limit;
pub mod server;

pub use rate_limit::SlidingWindowLimiter;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::FeedbackConfig;
use crate::error::ValidationError;
use crate::model::email_hash;
use crate::store::{Recorded, RelevanceStore};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email regex"));

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "feedback_requests_total",
            "Feedback submissions by outcome (noted, already_noted, invalid, rate_limited, error)."
        );
    });
}

/// Query parameters of `GET /feedback/relevant`. All optional so that a
/// missing field is reported as a validation error after rate limiting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackRequest {
    pub item_id: Option<String>,
    pub email: Option<String>,
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackOutcome {
    Noted,
    AlreadyNoted,
    Invalid(ValidationError),
    RateLimited,
    /// Storage failed; details are logged, never returned to the caller.
    Failed,
}

impl FeedbackOutcome {
    fn label(&self) -> &'static str {
        match self {
            FeedbackOutcome::Noted => "noted",
            FeedbackOutcome::AlreadyNoted => "already_noted",
            FeedbackOutcome::Invalid(_) => "invalid",
            FeedbackOutcome::RateLimited => "rate_limited",
            FeedbackOutcome::Failed => "error",
        }
    }
}

/// Exactly 16 hex characters; returned lowercased.
pub fn validate_item_id(raw: &str) -> Result<String, ValidationError> {
    let id = raw.trim();
    if id.len() == 16 && id.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(id.to_ascii_lowercase())
    } else {
        Err(ValidationError::ItemIdFormat)
    }
}

/// `local@domain.tld` shape; returned trimmed and lowercased.
pub fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if EMAIL_RE.is_match(&email) {
        Ok(email)
    } else {
        Err(ValidationError::EmailFormat)
    }
}

pub struct FeedbackService {
    store: Arc<RelevanceStore>,
    limiter: SlidingWindowLimiter,
}

impl FeedbackService {
    pub fn new(store: Arc<RelevanceStore>, limiter: SlidingWindowLimiter) -> Self {
        ensure_metrics_described();
        Self { store, limiter }
    }

    pub fn from_config(store: Arc<RelevanceStore>, cfg: &FeedbackConfig) -> Self {
        Self::new(
            store,
            SlidingWindowLimiter::new(
                cfg.rate_limit_max,
                Duration::from_secs(cfg.rate_limit_window_secs),
            ),
        )
    }

    pub fn store(&self) -> &Arc<RelevanceStore> {
        &self.store
    }

    pub fn submit(&self, client: &str, req: &FeedbackRequest) -> FeedbackOutcome {
        self.submit_at(client, req, Instant::now(), Utc::now())
    }

    pub fn submit_at(
        &self,
        client: &str,
        req: &FeedbackRequest,
        mono_now: Instant,
        now: DateTime<Utc>,
    ) -> FeedbackOutcome {
        let outcome = self.evaluate(client, req, mono_now, now);
        counter!("feedback_requests_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    fn evaluate(
        &self,
        client: &str,
        req: &FeedbackRequest,
        mono_now: Instant,
        now: DateTime<Utc>,
    ) -> FeedbackOutcome {
        if !self.limiter.check_at(client, mono_now) {
            tracing::warn!(target: "feedback", %client, "rate limited");
            return FeedbackOutcome::RateLimited;
        }

        let item_id = match validate_item_id(req.item_id.as_deref().unwrap_or_default()) {
            Ok(id) => id,
            Err(e) => return FeedbackOutcome::Invalid(e),
        };
        let email = match validate_email(req.email.as_deref().unwrap_or_default()) {
            Ok(e) => e,
            Err(e) => return FeedbackOutcome::Invalid(e),
        };
        let run_id = req.run_id.as_deref().unwrap_or_default().trim();

        match self.store.record(&email, &item_id, run_id, now) {
            Ok(Recorded::New) => {
                tracing::info!(
                    target: "feedback",
                    email_hash = %email_hash(&email),
                    %item_id,
                    %run_id,
                    "relevance noted"
                );
                FeedbackOutcome::Noted
            }
            Ok(Recorded::AlreadyNoted) => {
                tracing::debug!(
                    target: "feedback",
                    email_hash = %email_hash(&email),
                    %item_id,
                    "relevance already noted"
                );
                FeedbackOutcome::AlreadyNoted
            }
            Err(e) => {
                tracing::error!(target: "feedback", error = %e, %item_id, "relevance store append failed");
                FeedbackOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_must_be_16_hex() {
        assert_eq!(validate_item_id("0123456789ABCDEF").unwrap(), "0123456789abcdef");
        assert!(validate_item_id("0123456789abcde").is_err());
        assert!(validate_item_id("0123456789abcdeg").is_err());
        assert!(validate_item_id("").is_err());
    }

    #[test]
    fn email_shape() {
        assert_eq!(validate_email(" Ops@Bank.io ").unwrap(), "ops@bank.io");
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a b@c.io").is_err());
    }

    #[test]
    fn rejected_attempts_count_toward_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RelevanceStore::open(dir.path().join("r.jsonl")).unwrap());
        let svc = FeedbackService::new(store, SlidingWindowLimiter::new(2, Duration::from_secs(60)));
        let t0 = Instant::now();
        let bad = FeedbackRequest::default();
        assert!(matches!(
            svc.submit_at("ip", &bad, t0, Utc::now()),
            FeedbackOutcome::Invalid(ValidationError::ItemIdFormat)
        ));
        let good = FeedbackRequest {
            item_id: Some("0123456789abcdef".into()),
            email: Some("a@b.io".into()),
            run_id: None,
        };
        assert_eq!(svc.submit_at("ip", &good, t0, Utc::now()), FeedbackOutcome::Noted);
        assert_eq!(svc.submit_at("ip", &good, t0, Utc::now()), FeedbackOutcome::RateLimited);
    }
}
