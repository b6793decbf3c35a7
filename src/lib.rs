// src/lib.rs
// Public library surface for the CLI and integration tests.

pub mod agent;
pub mod collect;
pub mod config;
pub mod dedup;
pub mod digest;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod jobs;
pub mod llm;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::dedup::DedupEngine;
pub use crate::model::{Impact, RelevanceEvent, TrendItem};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the default filter.
/// Calling twice is a no-op.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trend_monitor=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
