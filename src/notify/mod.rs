// src/notify/mod.rs
//! Outbound delivery of rendered digests and alerts.

pub mod email;

pub use email::SmtpMailer;

use async_trait::async_trait;

use crate::digest::RenderedDigest;
use crate::error::DeliveryError;

#[async_trait]
pub trait DigestMailer: Send + Sync {
    async fn send(&self, digest: &RenderedDigest, recipients: &[String]) -> Result<(), DeliveryError>;
    fn name(&self) -> &'static str;
}

/// What happened to the delivery step of a job.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum Delivery {
    DryRun,
    /// Nothing worth sending (empty digest, no alert candidates).
    Skipped,
    Sent { recipients: usize },
    Failed(String),
}
