// src/error.rs
//! Error taxonomy shared across the pipeline.
//!
//! Domain errors are typed so callers can tell a malformed input apart from a
//! collaborator outage or a tripped guardrail. Application edges (config, jobs,
//! CLI) wrap these in `anyhow`.

use std::time::Duration;

/// Malformed input. Surfaced to the immediate caller and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("item_id must be 16 hex characters")]
    ItemIdFormat,
    #[error("email address is malformed")]
    EmailFormat,
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// A controller-level limit was exceeded. Fatal to the agent run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardrailViolation {
    #[error("max_steps_reached ({max_steps})")]
    StepLimit { max_steps: usize },
    #[error("timeout ({elapsed:?} >= {limit:?})")]
    Timeout { limit: Duration, elapsed: Duration },
    #[error("url not in allowlist: {url}")]
    DisallowedUrl { url: String },
}

impl GuardrailViolation {
    /// Short machine-friendly name of the guardrail.
    pub fn kind(&self) -> &'static str {
        match self {
            GuardrailViolation::StepLimit { .. } => "step_limit",
            GuardrailViolation::Timeout { .. } => "timeout",
            GuardrailViolation::DisallowedUrl { .. } => "allowlist",
        }
    }
}

/// Failure of an append-only log.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("http error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not parse feed from {url}: {reason}")]
    Parse { url: String, reason: String },
}

/// Failure talking to an OpenAI-compatible chat endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("language model api key not configured")]
    NotConfigured,
    #[error("language model request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("language model returned status {0}")]
    Status(u16),
    #[error("language model returned no content")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("extraction output rejected: {0}")]
    InvalidOutput(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("no recipients")]
    NoRecipients,
    #[error("invalid address `{0}`")]
    Address(String),
    #[error("could not build message: {0}")]
    Build(String),
    #[error("smtp transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("selector returned an unusable action: {0}")]
    InvalidAction(String),
}

/// Error raised by a tool while the agent loop dispatches it.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("unknown document id `{0}`")]
    UnknownDocument(String),
    #[error("unknown item id `{0}`")]
    UnknownItem(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ToolError {
    /// Recoverable errors are reported to the selector as an observation; the
    /// rest terminate the run.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ToolError::Store(_))
    }
}
