// src/agent/trace.rs
//! Markdown reasoning trace and run summary written after each agent run.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{AgentRun, StepOutcome};

pub const TRACE_FILE: &str = "agent_reasoning.md";
pub const SUMMARY_FILE: &str = "agent_summary.md";

pub fn render_trace(run: &AgentRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Agent Reasoning Trace\n");
    let _ = writeln!(out, "**Goal:** {}\n", run.goal);
    for s in &run.trace {
        let _ = writeln!(out, "## Step {} ({})\n", s.step, s.timestamp.to_rfc3339());
        if !s.thought.is_empty() {
            let _ = writeln!(out, "**Thought:** {}\n", s.thought);
        }
        let input = serde_json::to_value(&s.call)
            .ok()
            .and_then(|v| v.get("action_input").cloned())
            .map(|v| v.to_string())
            .unwrap_or_default();
        let _ = writeln!(out, "**Action:** `{}` {}\n", s.call.name(), input);
        match &s.outcome {
            StepOutcome::Observation(o) => {
                let _ = writeln!(
                    out,
                    "**Observation:** `{}`\n",
                    serde_json::to_string(o).unwrap_or_default()
                );
            }
            StepOutcome::Error(e) => {
                let _ = writeln!(out, "**Error:** {e}\n");
            }
        }
    }
    if let Some(answer) = &run.final_answer {
        let _ = writeln!(out, "## Final answer\n\n{answer}");
    }
    out
}

pub fn render_summary(run: &AgentRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Agent Run Summary\n");
    let _ = writeln!(out, "- **State:** {:?}", run.state);
    let _ = writeln!(out, "- **Stop reason:** {}", run.stop_reason);
    let _ = writeln!(out, "- **Steps:** {}", run.steps);
    let _ = writeln!(out, "- **Elapsed:** {:.1}s", run.elapsed.as_secs_f64());
    let st = &run.stats;
    let _ = writeln!(out, "- **Sources scraped:** {}", st.sources_scraped);
    let _ = writeln!(out, "- **Documents:** {}", st.documents);
    let _ = writeln!(
        out,
        "- **Extracted:** {} ({} failed)",
        st.extracted, st.extraction_failures
    );
    let _ = writeln!(out, "- **Stored:** {} new, {} duplicates", st.stored, st.duplicates);
    if let Some(d) = &run.digest {
        let _ = writeln!(out, "- **Digest:** {} ({} items)", d.run_id, d.item_ids.len());
    }
    out
}

/// Write both files into `dir`, replacing the previous run's.
pub fn write_run_logs(dir: &Path, run: &AgentRun) -> io::Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let trace = dir.join(TRACE_FILE);
    let summary = dir.join(SUMMARY_FILE);
    fs::write(&trace, render_trace(run))?;
    fs::write(&summary, render_summary(run))?;
    Ok((trace, summary))
}
