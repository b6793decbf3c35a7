// src/agent/selector.rs
//! Tool selection strategies.
//!
//! [`LlmSelector`] asks a chat model for the next action. [`PlanSelector`]
//! walks the configured sources deterministically and needs no model.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;

use super::{Decision, Observation, StepOutcome, ToolCall, ToolRegistry, ToolSelector, TraceStep};
use crate::config::{AppConfig, SourceConfig};
use crate::error::SelectorError;
use crate::jobs::sources_for_collection;
use crate::llm::{strip_code_fence, ChatClient, ChatMessage};

/// Parse a model reply: `{"thought","action","action_input"}` or
/// `{"thought","final_answer"}`.
pub fn parse_decision(reply: &str) -> Result<Decision, SelectorError> {
    let v: Value = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| SelectorError::InvalidAction(format!("reply is not json: {e}")))?;
    let thought = v
        .get("thought")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if let Some(answer) = v.get("final_answer") {
        let summary = answer
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| answer.to_string());
        return Ok(Decision::new(thought, ToolCall::Finish { summary }));
    }

    let action = v
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| SelectorError::InvalidAction("missing action".into()))?;
    let input = match v.get("action_input") {
        Some(Value::Object(m)) => Value::Object(m.clone()),
        _ => json!({}),
    };
    let call: ToolCall = serde_json::from_value(json!({ "action": action, "action_input": input }))
        .map_err(|e| SelectorError::InvalidAction(format!("{action}: {e}")))?;
    Ok(Decision::new(thought, call))
}

fn system_prompt(allowed_sources: &[String]) -> String {
    format!(
        "You are an autonomous research agent for financial-services trend monitoring.\n\
         Work step by step. At each step reply with ONE JSON object, either\n\
         {{\"thought\": \"...\", \"action\": \"<tool name>\", \"action_input\": {{...}}}}\n\
         or, when the goal is met,\n\
         {{\"thought\": \"...\", \"final_answer\": \"<short summary>\"}}.\n\
         Tools:\n{}\n\
         Allowed source URLs:\n{}\n\
         Tool errors are reported as observations; decide how to proceed.",
        ToolRegistry::definitions(),
        allowed_sources.join("\n")
    )
}

pub struct LlmSelector {
    chat: ChatClient,
    system: String,
}

impl LlmSelector {
    pub fn new(chat: ChatClient, allowed_sources: &[String]) -> Self {
        Self {
            chat,
            system: system_prompt(allowed_sources),
        }
    }

    fn messages(&self, goal: &str, history: &[TraceStep]) -> Vec<ChatMessage> {
        let mut msgs = vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(format!("Goal: {goal}")),
        ];
        for step in history {
            let proposed = json!({
                "thought": step.thought,
                "action": step.call.name(),
                "action_input": serde_json::to_value(&step.call)
                    .ok()
                    .and_then(|v| v.get("action_input").cloned())
                    .unwrap_or_else(|| json!({})),
            });
            msgs.push(ChatMessage::assistant(proposed.to_string()));
            let observed = match &step.outcome {
                StepOutcome::Observation(o) => format!(
                    "Observation: {}",
                    serde_json::to_string(o).unwrap_or_default()
                ),
                StepOutcome::Error(e) => format!("Error: {e}"),
            };
            msgs.push(ChatMessage::user(observed));
        }
        msgs
    }
}

#[async_trait]
impl ToolSelector for LlmSelector {
    async fn select_next_tool(
        &self,
        goal: &str,
        history: &[TraceStep],
    ) -> Result<Decision, SelectorError> {
        let reply = self.chat.complete_json(&self.messages(goal, history)).await?;
        parse_decision(&reply)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

/// Deterministic pipeline: check pending items, analyze pending documents,
/// scrape the next source, render once, finish. Derived purely from history.
pub struct PlanSelector {
    sources: Vec<SourceConfig>,
    documents_per_source: usize,
}

impl PlanSelector {
    /// Plans over the same sources `collect` would use.
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self {
            sources: sources_for_collection(&sources),
            documents_per_source: usize::MAX,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.sources.clone()).with_documents_per_source(cfg.agent.documents_per_source)
    }

    /// Analyze at most `n` documents from each scrape.
    pub fn with_documents_per_source(mut self, n: usize) -> Self {
        self.documents_per_source = n;
        self
    }

    pub fn next(&self, history: &[TraceStep]) -> Decision {
        let mut scraped = HashSet::new();
        let mut analyzed = HashSet::new();
        let mut checked = HashSet::new();
        let mut documents: Vec<&str> = Vec::new();
        let mut items: Vec<&str> = Vec::new();
        let mut rendered = false;

        for step in history {
            match &step.call {
                ToolCall::ScrapeSource { url, .. } => {
                    scraped.insert(url.as_str());
                }
                ToolCall::AnalyzeImpact { document_id, .. } => {
                    analyzed.insert(document_id.as_str());
                }
                ToolCall::CheckDuplicates { item_id } => {
                    checked.insert(item_id.as_str());
                }
                ToolCall::RenderDigest { .. } => rendered = true,
                ToolCall::Finish { .. } => {}
            }
            match &step.outcome {
                StepOutcome::Observation(Observation::ScrapeSource { documents: d, .. }) => {
                    documents.extend(
                        d.iter()
                            .take(self.documents_per_source)
                            .map(String::as_str),
                    );
                }
                StepOutcome::Observation(Observation::AnalyzeImpact { item_id, .. }) => {
                    items.push(item_id.as_str());
                }
                _ => {}
            }
        }

        if let Some(id) = items.iter().find(|i| !checked.contains(*i)) {
            return Decision::new(
                format!("candidate {id} has not been checked against history"),
                ToolCall::CheckDuplicates {
                    item_id: id.to_string(),
                },
            );
        }
        if let Some(id) = documents.iter().find(|d| !analyzed.contains(*d)) {
            return Decision::new(
                format!("document {id} has not been analyzed"),
                ToolCall::AnalyzeImpact {
                    document_id: id.to_string(),
                    category_hint: None,
                },
            );
        }
        if let Some(src) = self.sources.iter().find(|s| !scraped.contains(s.url.as_str())) {
            return Decision::new(
                format!("source {} has not been scraped", src.name),
                ToolCall::ScrapeSource {
                    url: src.url.clone(),
                    source_name: Some(src.name.clone()),
                },
            );
        }
        if !rendered {
            return Decision::new(
                "all sources processed; render the digest",
                ToolCall::RenderDigest {
                    lookback_days: None,
                    max_items: None,
                },
            );
        }
        Decision::new(
            "digest rendered",
            ToolCall::Finish {
                summary: format!(
                    "scraped {} sources, analyzed {} documents, checked {} items",
                    scraped.len(),
                    analyzed.len(),
                    checked.len()
                ),
            },
        )
    }
}

#[async_trait]
impl ToolSelector for PlanSelector {
    async fn select_next_tool(
        &self,
        _goal: &str,
        history: &[TraceStep],
    ) -> Result<Decision, SelectorError> {
        Ok(self.next(history))
    }

    fn name(&self) -> &'static str {
        "plan"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourcePriority;

    #[test]
    fn parses_actions_and_final_answers() {
        let d = parse_decision(
            r#"{"thought":"start","action":"render_digest","action_input":{"lookback_days":3}}"#,
        )
        .unwrap();
        assert_eq!(
            d.call,
            ToolCall::RenderDigest {
                lookback_days: Some(3),
                max_items: None
            }
        );
        assert_eq!(d.thought, "start");

        let d = parse_decision(r#"{"thought":"done","action":"render_digest"}"#).unwrap();
        assert_eq!(d.call.name(), "render_digest");

        let d = parse_decision(r#"{"thought":"ok","final_answer":"all good"}"#).unwrap();
        assert_eq!(
            d.call,
            ToolCall::Finish {
                summary: "all good".into()
            }
        );
    }

    #[test]
    fn unknown_tools_are_rejected() {
        let err = parse_decision(r#"{"action":"shell","action_input":{"cmd":"rm"}}"#).unwrap_err();
        assert!(matches!(err, SelectorError::InvalidAction(_)));
        assert!(parse_decision(r#"{"thought":"?"}"#).is_err());
        assert!(parse_decision("plain text").is_err());
    }

    #[test]
    fn plan_skips_nice_to_have_and_caps_documents() {
        let mut feed = SourceConfig::adhoc("https://a.io/feed", Some("A"));
        feed.priority = SourcePriority::MustHave;
        let page = SourceConfig::adhoc("https://b.io/news", Some("B"));
        let plan = PlanSelector::new(vec![feed, page]).with_documents_per_source(1);

        let scraped = TraceStep {
            step: 1,
            timestamp: chrono::Utc::now(),
            thought: String::new(),
            call: ToolCall::ScrapeSource {
                url: "https://a.io/feed".into(),
                source_name: Some("A".into()),
            },
            outcome: StepOutcome::Observation(Observation::ScrapeSource {
                url: "https://a.io/feed".into(),
                documents: vec!["d1".into(), "d2".into()],
                count: 2,
            }),
        };
        let analyzed = TraceStep {
            step: 2,
            call: ToolCall::AnalyzeImpact {
                document_id: "d1".into(),
                category_hint: None,
            },
            outcome: StepOutcome::Error("bad reply".into()),
            ..scraped.clone()
        };
        // d2 is over the cap and b.io is only nice-to-have.
        assert_eq!(plan.next(&[scraped, analyzed]).call.name(), "render_digest");
    }

    #[test]
    fn plan_starts_with_first_source_and_ends_with_finish() {
        let plan = PlanSelector::new(vec![SourceConfig::adhoc("https://a.io/feed", Some("A"))]);
        let first = plan.next(&[]);
        assert_eq!(first.call.name(), "scrape_source");

        let scraped = TraceStep {
            step: 1,
            timestamp: chrono::Utc::now(),
            thought: String::new(),
            call: first.call,
            outcome: StepOutcome::Observation(Observation::ScrapeSource {
                url: "https://a.io/feed".into(),
                documents: vec![],
                count: 0,
            }),
        };
        let second = plan.next(std::slice::from_ref(&scraped));
        assert_eq!(second.call.name(), "render_digest");

        let rendered = TraceStep {
            step: 2,
            call: second.call,
            outcome: StepOutcome::Error("x".into()),
            ..scraped.clone()
        };
        assert_eq!(plan.next(&[scraped, rendered]).call.name(), "finish");
    }
}
