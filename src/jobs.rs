// src/jobs.rs
//! Scheduled pipeline runs: collection, digest delivery, high-impact alerts.
//! Each returns a summary of counts; collaborator failures are counted, not
//! raised. Only storage failures abort a job.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::collect::{collect_all, Collector};
use crate::config::{AppConfig, SourceConfig, SourcePriority};
use crate::dedup::DedupEngine;
use crate::digest::{
    render, run_id_for, window_start, DigestParams, RenderOptions, RenderedDigest, Scorer,
};
use crate::extract::Extractor;
use crate::model::{Impact, TrendItem};
use crate::notify::{Delivery, DigestMailer};
use crate::store::{AppendLog, ItemStore, RelevanceStore};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub sources: usize,
    pub failed_sources: Vec<String>,
    pub documents: usize,
    pub extracted: usize,
    pub extraction_failures: usize,
    pub stored: usize,
    pub duplicates: usize,
}

/// `must-have` sources, or every source when none is marked.
pub fn sources_for_collection(all: &[SourceConfig]) -> Vec<SourceConfig> {
    let must: Vec<SourceConfig> = all
        .iter()
        .filter(|s| s.priority == SourcePriority::MustHave)
        .cloned()
        .collect();
    if must.is_empty() {
        all.to_vec()
    } else {
        must
    }
}

pub async fn run_collection(
    collector: &dyn Collector,
    extractor: &dyn Extractor,
    dedup: &DedupEngine,
    sources: &[SourceConfig],
) -> Result<CollectionSummary> {
    let selected = sources_for_collection(sources);
    let report = collect_all(collector, &selected).await;

    let mut summary = CollectionSummary {
        sources: selected.len(),
        failed_sources: report.failed.iter().map(|(name, _)| name.clone()).collect(),
        documents: report.documents.len(),
        ..Default::default()
    };

    for doc in &report.documents {
        let item = match extractor.extract(doc).await {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(target: "jobs", url = %doc.url, error = %e, "skipping document");
                summary.extraction_failures += 1;
                continue;
            }
        };
        summary.extracted += 1;
        let outcome = dedup
            .check_and_insert(item)
            .context("persisting extracted item")?;
        if outcome.is_duplicate {
            summary.duplicates += 1;
        } else {
            summary.stored += 1;
        }
    }

    tracing::info!(
        target: "jobs",
        sources = summary.sources,
        failed = summary.failed_sources.len(),
        documents = summary.documents,
        stored = summary.stored,
        duplicates = summary.duplicates,
        "collection finished"
    );
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct DigestOptions {
    pub lookback_days: u32,
    pub max_items: usize,
    pub dry_run: bool,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
}

impl DigestOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            lookback_days: cfg.digest.lookback_days,
            max_items: cfg.digest.max_items,
            dry_run: false,
            recipients: cfg.email.to.clone(),
            subject: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestSummary {
    pub run_id: String,
    pub items_included: usize,
    pub items_considered: usize,
    pub total_items: usize,
    pub delivery: Delivery,
}

async fn deliver(
    mailer: Option<&dyn DigestMailer>,
    rendered: &RenderedDigest,
    recipients: &[String],
    dry_run: bool,
    empty: bool,
) -> Delivery {
    if dry_run {
        return Delivery::DryRun;
    }
    if empty {
        return Delivery::Skipped;
    }
    let Some(mailer) = mailer else {
        return Delivery::Failed("no mailer configured".into());
    };
    match mailer.send(rendered, recipients).await {
        Ok(()) => Delivery::Sent {
            recipients: recipients.len(),
        },
        Err(e) => {
            tracing::error!(target: "jobs", error = %e, mailer = mailer.name(), "delivery failed");
            Delivery::Failed(e.to_string())
        }
    }
}

/// Rank, render and (unless dry-run) deliver the digest.
pub async fn run_digest(
    cfg: &AppConfig,
    items: &ItemStore,
    relevance: &RelevanceStore,
    mailer: Option<&dyn DigestMailer>,
    opts: &DigestOptions,
    now: DateTime<Utc>,
) -> Result<(DigestSummary, RenderedDigest)> {
    let recipient = cfg
        .feedback
        .recipient
        .clone()
        .or_else(|| opts.recipients.first().cloned());
    let boost_set = recipient
        .as_deref()
        .map(|r| relevance.boost_set(r))
        .unwrap_or_default();

    let digest = Scorer::from_config(&cfg.digest).build(
        &items.snapshot(),
        &boost_set,
        DigestParams {
            lookback_days: opts.lookback_days,
            max_items: opts.max_items,
        },
        now,
    )?;
    let run_id = run_id_for(now);
    let title = opts.subject.as_deref().unwrap_or(&cfg.digest.title);
    let rendered = render(
        &digest,
        &RenderOptions {
            title,
            run_id: &run_id,
            feedback_base_url: cfg.feedback.base_url.as_deref(),
            recipient: recipient.as_deref(),
        },
    );

    let delivery = deliver(mailer, &rendered, &opts.recipients, opts.dry_run, digest.is_empty()).await;
    let summary = DigestSummary {
        run_id,
        items_included: digest.included(),
        items_considered: digest.considered,
        total_items: digest.total,
        delivery,
    };
    tracing::info!(
        target: "jobs",
        run_id = %summary.run_id,
        included = summary.items_included,
        delivery = ?summary.delivery,
        "digest finished"
    );
    Ok((summary, rendered))
}

/// One line of the alert log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub item_id: String,
    pub alerted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertSummary {
    pub items_checked: usize,
    pub candidates: usize,
    pub already_alerted: usize,
    pub alerted: usize,
    pub delivery: Delivery,
}

const ALERT_TITLE: &str = "High-Impact Trend Alert";

/// Alert once per HIGH item collected in the last `hours`.
#[allow(clippy::too_many_arguments)]
pub async fn run_alert(
    cfg: &AppConfig,
    items: &ItemStore,
    alert_log: &AppendLog<AlertRecord>,
    mailer: Option<&dyn DigestMailer>,
    hours: u32,
    recipients: &[String],
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<AlertSummary> {
    if hours == 0 {
        bail!("alert window must be at least one hour");
    }
    let since = window_start(now, Duration::hours(i64::from(hours)));
    let alerted: HashSet<String> = alert_log
        .scan()
        .context("reading alert log")?
        .records
        .into_iter()
        .map(|r| r.item_id)
        .collect();

    let snapshot = items.snapshot();
    let recent_high: Vec<&TrendItem> = snapshot
        .iter()
        .filter(|i| i.impact == Impact::High && i.collected_at >= since && i.collected_at <= now)
        .collect();
    let fresh: Vec<TrendItem> = recent_high
        .iter()
        .filter(|i| !alerted.contains(&i.id))
        .map(|i| (*i).clone())
        .collect();

    let mut summary = AlertSummary {
        items_checked: snapshot.len(),
        candidates: recent_high.len(),
        already_alerted: recent_high.len() - fresh.len(),
        alerted: 0,
        delivery: Delivery::Skipped,
    };
    if fresh.is_empty() {
        tracing::info!(target: "jobs", candidates = summary.candidates, "no new high-impact items");
        return Ok(summary);
    }

    let digest = Scorer::from_config(&cfg.digest).build(
        &fresh,
        &BTreeSet::new(),
        DigestParams {
            lookback_days: hours.div_ceil(24),
            max_items: fresh.len(),
        },
        now,
    )?;
    let run_id = format!("alert-{}", now.format("%Y-%m-%d-%H%M"));
    let subject = format!("{ALERT_TITLE}: {} new item(s)", fresh.len());
    let mut rendered = render(
        &digest,
        &RenderOptions {
            title: ALERT_TITLE,
            run_id: &run_id,
            feedback_base_url: None,
            recipient: None,
        },
    );
    rendered.subject = subject;

    summary.delivery = deliver(mailer, &rendered, recipients, dry_run, false).await;
    if matches!(summary.delivery, Delivery::Sent { .. }) {
        for item in &fresh {
            alert_log
                .append(&AlertRecord {
                    item_id: item.id.clone(),
                    alerted_at: now,
                })
                .context("recording alerted item")?;
        }
        summary.alerted = fresh.len();
    }
    tracing::info!(
        target: "jobs",
        candidates = summary.candidates,
        alerted = summary.alerted,
        delivery = ?summary.delivery,
        "alert finished"
    );
    Ok(summary)
}
