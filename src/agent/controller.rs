// src/agent/controller.rs
//! The bounded agent loop: select, check guardrails, dispatch, record.
//!
//! Ends in `Done` on a finish action and in `Failed` on a guardrail, selector
//! failure or fatal tool error.

use chrono::Utc;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;

use super::{
    AgentRun, Guardrails, RunState, StepOutcome, StopReason, ToolCall, ToolRegistry, ToolSelector,
    TraceStep, Workspace,
};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("agent_steps_total", "Tool invocations by tool.");
        describe_counter!("agent_runs_total", "Agent runs by terminal state.");
    });
}

pub struct AgentController {
    selector: Arc<dyn ToolSelector>,
    registry: ToolRegistry,
    guardrails: Guardrails,
}

impl AgentController {
    pub fn new(selector: Arc<dyn ToolSelector>, registry: ToolRegistry, guardrails: Guardrails) -> Self {
        ensure_metrics_described();
        Self {
            selector,
            registry,
            guardrails,
        }
    }

    /// Drive the loop to a terminal state. Limits are checked between tools;
    /// a tool that is already running is never interrupted.
    pub async fn run(&self, goal: &str) -> AgentRun {
        let started = Instant::now();
        let mut ws = Workspace::default();
        let mut trace: Vec<TraceStep> = Vec::new();
        let mut final_answer = None;
        let mut state = RunState::Running;
        let mut stop_reason = StopReason::GoalCompleted;

        tracing::info!(
            target: "agent",
            selector = self.selector.name(),
            max_steps = self.guardrails.max_steps(),
            timeout_secs = self.guardrails.timeout().as_secs(),
            "agent run started"
        );

        while state == RunState::Running {
            if let Err(v) = self.guardrails.check_time(started.elapsed()) {
                stop_reason = StopReason::Guardrail(v);
                state = RunState::Failed;
                break;
            }

            let decision = match self.selector.select_next_tool(goal, &trace).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!(target: "agent", error = %e, "selector failed");
                    stop_reason = StopReason::Selector(e.to_string());
                    state = RunState::Failed;
                    break;
                }
            };

            if let ToolCall::Finish { summary } = &decision.call {
                final_answer = Some(if summary.is_empty() {
                    decision.thought.clone()
                } else {
                    summary.clone()
                });
                state = RunState::Done;
                break;
            }

            if let Err(v) =
                self.guardrails
                    .check_before_tool(trace.len(), started.elapsed(), &decision.call)
            {
                tracing::warn!(target: "agent", guardrail = v.kind(), reason = %v, "guardrail tripped");
                stop_reason = StopReason::Guardrail(v);
                state = RunState::Failed;
                break;
            }

            let step = trace.len() + 1;
            let tool = decision.call.name();
            counter!("agent_steps_total", "tool" => tool).increment(1);
            tracing::info!(target: "agent", step, tool, thought = %decision.thought, "dispatching tool");

            let outcome = match self.registry.dispatch(&mut ws, &decision.call).await {
                Ok(obs) => StepOutcome::Observation(obs),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(target: "agent", step, tool, error = %e, "tool error (recoverable)");
                    StepOutcome::Error(e.to_string())
                }
                Err(e) => {
                    tracing::error!(target: "agent", step, tool, error = %e, "tool error (fatal)");
                    stop_reason = StopReason::Tool(e.to_string());
                    state = RunState::Failed;
                    StepOutcome::Error(e.to_string())
                }
            };

            trace.push(TraceStep {
                step,
                timestamp: Utc::now(),
                thought: decision.thought,
                call: decision.call,
                outcome,
            });
        }

        let label = match state {
            RunState::Done => "done",
            _ => "failed",
        };
        counter!("agent_runs_total", "state" => label).increment(1);
        let elapsed = started.elapsed();
        tracing::info!(
            target: "agent",
            state = label,
            reason = %stop_reason,
            steps = trace.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "agent run finished"
        );

        AgentRun {
            goal: goal.to_string(),
            state,
            stop_reason,
            steps: trace.len(),
            elapsed,
            trace,
            final_answer,
            digest: ws.take_digest(),
            stats: ws.stats,
        }
    }
}
