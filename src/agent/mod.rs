// src/agent/mod.rs
//! Bounded ReAct-style orchestration.
//!
//! A [`ToolSelector`] proposes one [`ToolCall`] at a time from the visible
//! history; the [`AgentController`] enforces guardrails, dispatches the call
//! through the [`ToolRegistry`] and appends the observation. The run ends in
//! `Done` (explicit finish) or `Failed` (guardrail, selector or store failure).

pub mod controller;
pub mod guardrails;
pub mod selector;
pub mod tools;
pub mod trace;

pub use controller::AgentController;
pub use guardrails::Guardrails;
pub use selector::{LlmSelector, PlanSelector};
pub use tools::{ToolRegistry, Workspace, WorkspaceStats};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::digest::RenderedDigest;
use crate::error::{GuardrailViolation, SelectorError};
use crate::model::Impact;

/// The closed set of actions a selector can request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "action_input", rename_all = "snake_case")]
pub enum ToolCall {
    ScrapeSource {
        url: String,
        #[serde(default)]
        source_name: Option<String>,
    },
    AnalyzeImpact {
        document_id: String,
        #[serde(default)]
        category_hint: Option<String>,
    },
    CheckDuplicates {
        item_id: String,
    },
    RenderDigest {
        #[serde(default)]
        lookback_days: Option<u32>,
        #[serde(default)]
        max_items: Option<usize>,
    },
    Finish {
        #[serde(default)]
        summary: String,
    },
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ScrapeSource { .. } => "scrape_source",
            ToolCall::AnalyzeImpact { .. } => "analyze_impact",
            ToolCall::CheckDuplicates { .. } => "check_duplicates",
            ToolCall::RenderDigest { .. } => "render_digest",
            ToolCall::Finish { .. } => "finish",
        }
    }
}

/// What a tool reports back. Counts, flags and ids only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum Observation {
    ScrapeSource {
        url: String,
        documents: Vec<String>,
        count: usize,
    },
    AnalyzeImpact {
        document_id: String,
        item_id: String,
        impact: Impact,
        category: String,
    },
    CheckDuplicates {
        item_id: String,
        is_duplicate: bool,
        matched_id: Option<String>,
        stored: bool,
    },
    RenderDigest {
        run_id: String,
        items_included: usize,
        items_considered: usize,
        item_ids: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Observation(Observation),
    Error(String),
}

/// One executed tool call in the visible history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStep {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    pub thought: String,
    pub call: ToolCall,
    pub outcome: StepOutcome,
}

/// A selector's proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub thought: String,
    pub call: ToolCall,
}

impl Decision {
    pub fn new(thought: impl Into<String>, call: ToolCall) -> Self {
        Self {
            thought: thought.into(),
            call,
        }
    }
}

#[async_trait]
pub trait ToolSelector: Send + Sync {
    async fn select_next_tool(
        &self,
        goal: &str,
        history: &[TraceStep],
    ) -> Result<Decision, SelectorError>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    GoalCompleted,
    Guardrail(GuardrailViolation),
    Selector(String),
    Tool(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::GoalCompleted => f.write_str("goal_completed"),
            StopReason::Guardrail(v) => write!(f, "{v}"),
            StopReason::Selector(e) => write!(f, "llm_error: {e}"),
            StopReason::Tool(e) => write!(f, "tool_error: {e}"),
        }
    }
}

/// Terminal result of one controller run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub goal: String,
    pub state: RunState,
    pub stop_reason: StopReason,
    pub steps: usize,
    pub elapsed: Duration,
    pub trace: Vec<TraceStep>,
    pub final_answer: Option<String>,
    pub digest: Option<RenderedDigest>,
    pub stats: WorkspaceStats,
}

impl AgentRun {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done
    }
}
