// src/agent/tools.rs
//! The fixed tool registry and the per-run workspace the tools share.
//!
//! Raw documents and extracted candidates stay in the [`Workspace`]; the
//! selector only ever sees their ids.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Observation, ToolCall};
use crate::collect::{Collector, RawDocument};
use crate::config::{AppConfig, SourceConfig};
use crate::dedup::{normalize_url, prepare_candidate, DedupEngine};
use crate::digest::{render, run_id_for, DigestParams, RenderOptions, RenderedDigest, Scorer};
use crate::error::ToolError;
use crate::extract::Extractor;
use crate::model::TrendItem;
use crate::store::RelevanceStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceStats {
    pub sources_scraped: usize,
    pub documents: usize,
    pub extracted: usize,
    pub extraction_failures: usize,
    pub stored: usize,
    pub duplicates: usize,
}

/// Scratch state private to one run.
#[derive(Debug, Default)]
pub struct Workspace {
    documents: BTreeMap<String, RawDocument>,
    candidates: BTreeMap<String, TrendItem>,
    next_doc: usize,
    digest: Option<RenderedDigest>,
    pub stats: WorkspaceStats,
}

impl Workspace {
    fn add_document(&mut self, doc: RawDocument) -> String {
        self.next_doc += 1;
        let id = format!("d{}", self.next_doc);
        self.documents.insert(id.clone(), doc);
        id
    }

    pub fn document(&self, id: &str) -> Option<&RawDocument> {
        self.documents.get(id)
    }

    pub fn candidate(&self, id: &str) -> Option<&TrendItem> {
        self.candidates.get(id)
    }

    pub fn take_digest(&mut self) -> Option<RenderedDigest> {
        self.digest.take()
    }
}

struct RenderSettings {
    title: String,
    feedback_base_url: Option<String>,
    recipient: Option<String>,
    defaults: DigestParams,
}

pub struct ToolRegistry {
    collector: Arc<dyn Collector>,
    extractor: Arc<dyn Extractor>,
    dedup: DedupEngine,
    relevance: Arc<RelevanceStore>,
    scorer: Scorer,
    sources: Vec<SourceConfig>,
    render: RenderSettings,
}

impl ToolRegistry {
    pub fn new(
        collector: Arc<dyn Collector>,
        extractor: Arc<dyn Extractor>,
        dedup: DedupEngine,
        relevance: Arc<RelevanceStore>,
        cfg: &AppConfig,
    ) -> Self {
        Self {
            collector,
            extractor,
            dedup,
            relevance,
            scorer: Scorer::from_config(&cfg.digest),
            sources: cfg.sources.clone(),
            render: RenderSettings {
                title: cfg.digest.title.clone(),
                feedback_base_url: cfg.feedback.base_url.clone(),
                recipient: cfg.boost_recipient(),
                defaults: DigestParams {
                    lookback_days: cfg.digest.lookback_days,
                    max_items: cfg.digest.max_items,
                },
            },
        }
    }

    /// Name, description and JSON-schema parameters of every tool, for the
    /// selector prompt.
    pub fn definitions() -> Value {
        json!([
            {
                "name": "scrape_source",
                "description": "Fetch documents from an allowlisted source URL. Returns document ids.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "Source URL (must be allowlisted)"},
                        "source_name": {"type": "string", "description": "Human-readable source name"}
                    },
                    "required": ["url"]
                }
            },
            {
                "name": "analyze_impact",
                "description": "Extract a trend item (title, summary, impact, category) from a fetched document. Returns the candidate item id.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "document_id": {"type": "string", "description": "Id returned by scrape_source"},
                        "category_hint": {"type": "string", "description": "payments or regulatory"}
                    },
                    "required": ["document_id"]
                }
            },
            {
                "name": "check_duplicates",
                "description": "Check a candidate item against stored history; new items are stored.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "item_id": {"type": "string", "description": "Id returned by analyze_impact"}
                    },
                    "required": ["item_id"]
                }
            },
            {
                "name": "render_digest",
                "description": "Rank stored items and render the digest.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "lookback_days": {"type": "integer", "minimum": 1},
                        "max_items": {"type": "integer", "minimum": 1}
                    }
                }
            },
            {
                "name": "finish",
                "description": "End the run when the goal is met.",
                "parameters": {
                    "type": "object",
                    "properties": {"summary": {"type": "string"}}
                }
            }
        ])
    }

    fn source_for(&self, url: &str, name: Option<&str>) -> SourceConfig {
        let wanted = normalize_url(url);
        self.sources
            .iter()
            .find(|s| normalize_url(&s.url) == wanted)
            .cloned()
            .unwrap_or_else(|| SourceConfig::adhoc(url, name))
    }

    /// Run one tool. `Finish` is handled by the controller and never reaches here.
    pub async fn dispatch(&self, ws: &mut Workspace, call: &ToolCall) -> Result<Observation, ToolError> {
        match call {
            ToolCall::ScrapeSource { url, source_name } => {
                let source = self.source_for(url, source_name.as_deref());
                let docs = self.collector.fetch(&source).await?;
                ws.stats.sources_scraped += 1;
                ws.stats.documents += docs.len();
                let ids: Vec<String> = docs.into_iter().map(|d| ws.add_document(d)).collect();
                Ok(Observation::ScrapeSource {
                    url: url.clone(),
                    count: ids.len(),
                    documents: ids,
                })
            }
            ToolCall::AnalyzeImpact {
                document_id,
                category_hint,
            } => {
                let mut doc = ws
                    .document(document_id)
                    .cloned()
                    .ok_or_else(|| ToolError::UnknownDocument(document_id.clone()))?;
                if category_hint.is_some() {
                    doc.category_hint = category_hint.clone();
                }
                let mut item = match self.extractor.extract(&doc).await {
                    Ok(item) => item,
                    Err(e) => {
                        ws.stats.extraction_failures += 1;
                        return Err(e.into());
                    }
                };
                prepare_candidate(&mut item);
                ws.stats.extracted += 1;
                let obs = Observation::AnalyzeImpact {
                    document_id: document_id.clone(),
                    item_id: item.id.clone(),
                    impact: item.impact,
                    category: item.category.clone(),
                };
                ws.candidates.insert(item.id.clone(), item);
                Ok(obs)
            }
            ToolCall::CheckDuplicates { item_id } => {
                let item = ws
                    .candidate(item_id)
                    .cloned()
                    .ok_or_else(|| ToolError::UnknownItem(item_id.clone()))?;
                let outcome = self.dedup.check_and_insert(item)?;
                if outcome.is_duplicate {
                    ws.stats.duplicates += 1;
                } else {
                    ws.stats.stored += 1;
                }
                Ok(Observation::CheckDuplicates {
                    item_id: outcome.item_id,
                    is_duplicate: outcome.is_duplicate,
                    stored: !outcome.is_duplicate,
                    matched_id: outcome.matched_id,
                })
            }
            ToolCall::RenderDigest {
                lookback_days,
                max_items,
            } => {
                let params = DigestParams {
                    lookback_days: lookback_days.unwrap_or(self.render.defaults.lookback_days),
                    max_items: max_items.unwrap_or(self.render.defaults.max_items),
                };
                let now = Utc::now();
                let boost_set = self
                    .render
                    .recipient
                    .as_deref()
                    .map(|r| self.relevance.boost_set(r))
                    .unwrap_or_default();
                let items = self.dedup.store().snapshot();
                let digest = self.scorer.build(&items, &boost_set, params, now)?;
                let run_id = run_id_for(now);
                let rendered = render(
                    &digest,
                    &RenderOptions {
                        title: &self.render.title,
                        run_id: &run_id,
                        feedback_base_url: self.render.feedback_base_url.as_deref(),
                        recipient: self.render.recipient.as_deref(),
                    },
                );
                let obs = Observation::RenderDigest {
                    run_id,
                    items_included: digest.included(),
                    items_considered: digest.considered,
                    item_ids: rendered.item_ids.clone(),
                };
                ws.digest = Some(rendered);
                Ok(obs)
            }
            ToolCall::Finish { .. } => Err(ToolError::Validation(
                crate::error::ValidationError::InvalidParameter {
                    name: "action",
                    reason: "finish is not dispatchable".into(),
                },
            )),
        }
    }
}
