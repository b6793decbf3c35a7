// src/digest/mod.rs
//! Digest selection and ranking.
//!
//! filter (lookback window) -> score -> stable sort -> truncate.
//! `score = impact_weight + recency_weight + feedback_boost`, where the boost
//! is a flat constant applied once when the recipient marked the item relevant.
//! Ties fall back to newer `collected_at`, then lower `id`, so the output is a
//! pure function of the inputs.

pub mod render;

pub use render::{feedback_link, render, run_id_for, RenderOptions, RenderedDigest};

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::config::{DigestConfig, ImpactWeights};
use crate::error::ValidationError;
use crate::model::{DigestEntry, Impact, TrendItem};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_renders_total", "Digests built.");
        describe_histogram!("digest_items_included", "Entries per built digest.");
    });
}

/// `now - span`, saturating at the earliest representable instant.
pub fn window_start(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestParams {
    pub lookback_days: u32,
    pub max_items: usize,
}

impl DigestParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lookback_days == 0 {
            return Err(ValidationError::InvalidParameter {
                name: "lookback_days",
                reason: "must be positive".into(),
            });
        }
        if self.max_items == 0 {
            return Err(ValidationError::InvalidParameter {
                name: "max_items",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Ranked digest content before rendering.
#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub entries: Vec<DigestEntry>,
    /// Items inside the lookback window.
    pub considered: usize,
    /// Items in the store.
    pub total: usize,
    pub lookback_days: u32,
    pub generated_at: DateTime<Utc>,
}

impl Digest {
    pub fn included(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn item_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.item.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scorer {
    weights: ImpactWeights,
    recency_scale: f64,
    half_life_days: f64,
    boost: f64,
}

impl Scorer {
    pub fn new(weights: ImpactWeights, recency_scale: f64, half_life_days: f64, boost: f64) -> Self {
        ensure_metrics_described();
        Self {
            weights,
            recency_scale,
            half_life_days,
            boost,
        }
    }

    pub fn from_config(cfg: &DigestConfig) -> Self {
        Self::new(
            cfg.impact_weights,
            cfg.recency_scale,
            cfg.recency_half_life_days,
            cfg.relevance_boost,
        )
    }

    pub fn impact_weight(&self, impact: Impact) -> f64 {
        match impact {
            Impact::High => self.weights.high,
            Impact::Medium => self.weights.medium,
            Impact::Low => self.weights.low,
        }
    }

    /// Exponential decay on age; non-increasing in age, capped at `recency_scale`.
    pub fn recency_weight(&self, collected_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_secs = (now - collected_at).num_seconds().max(0) as f64;
        let age_days = age_secs / 86_400.0;
        self.recency_scale * 0.5f64.powf(age_days / self.half_life_days)
    }

    pub fn score(&self, item: &TrendItem, boosted: bool, now: DateTime<Utc>) -> f64 {
        let boost = if boosted { self.boost } else { 0.0 };
        self.impact_weight(item.impact) + self.recency_weight(item.collected_at, now) + boost
    }

    /// Select and rank `items` for one recipient's boost set.
    pub fn build(
        &self,
        items: &[TrendItem],
        boost_set: &BTreeSet<String>,
        params: DigestParams,
        now: DateTime<Utc>,
    ) -> Result<Digest, ValidationError> {
        params.validate()?;
        let window_start = window_start(now, Duration::days(i64::from(params.lookback_days)));

        let mut scored: Vec<(f64, bool, &TrendItem)> = items
            .iter()
            .filter(|i| i.collected_at >= window_start && i.collected_at <= now)
            .map(|i| {
                let boosted = boost_set.contains(&i.id);
                (self.score(i, boosted, now), boosted, i)
            })
            .collect();
        let considered = scored.len();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.2.collected_at.cmp(&a.2.collected_at))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });
        scored.truncate(params.max_items);

        let entries: Vec<DigestEntry> = scored
            .into_iter()
            .enumerate()
            .map(|(idx, (score, boosted, item))| DigestEntry {
                rank: idx + 1,
                score,
                boosted,
                item: item.clone(),
            })
            .collect();

        counter!("digest_renders_total").increment(1);
        histogram!("digest_items_included").record(entries.len() as f64);
        tracing::info!(
            target: "digest",
            included = entries.len(),
            considered,
            total = items.len(),
            boosted = entries.iter().filter(|e| e.boosted).count(),
            "digest ranked"
        );

        Ok(Digest {
            entries,
            considered,
            total: items.len(),
            lookback_days: params.lookback_days,
            generated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::prepare_candidate;

    fn item(url: &str, impact: Impact, collected_at: DateTime<Utc>) -> TrendItem {
        let mut it = TrendItem::candidate(url, url, impact, collected_at);
        prepare_candidate(&mut it);
        it
    }

    fn params(lookback_days: u32, max_items: usize) -> DigestParams {
        DigestParams {
            lookback_days,
            max_items,
        }
    }

    #[test]
    fn high_never_below_low_all_else_equal() {
        let now = Utc::now();
        let at = now - Duration::hours(5);
        let items = vec![
            item("https://a.io/low", Impact::Low, at),
            item("https://a.io/high", Impact::High, at),
            item("https://a.io/med", Impact::Medium, at),
        ];
        let scorer = Scorer::from_config(&DigestConfig::default());
        let d = scorer.build(&items, &BTreeSet::new(), params(7, 10), now).unwrap();
        let order: Vec<Impact> = d.entries.iter().map(|e| e.item.impact).collect();
        assert_eq!(order, vec![Impact::High, Impact::Medium, Impact::Low]);
    }

    #[test]
    fn newer_never_scores_lower() {
        let scorer = Scorer::from_config(&DigestConfig::default());
        let now = Utc::now();
        let mut last = f64::INFINITY;
        for h in [0, 1, 12, 48, 24 * 6, 24 * 30] {
            let w = scorer.recency_weight(now - Duration::hours(h), now);
            assert!(w <= last);
            last = w;
        }
        // future timestamps clamp to age zero
        assert_eq!(scorer.recency_weight(now + Duration::hours(1), now), 1.0);
    }

    #[test]
    fn window_filter_and_truncation() {
        let now = Utc::now();
        let items = vec![
            item("https://a.io/old", Impact::High, now - Duration::days(9)),
            item("https://a.io/future", Impact::High, now + Duration::minutes(5)),
            item("https://a.io/1", Impact::Low, now - Duration::days(1)),
            item("https://a.io/2", Impact::Low, now - Duration::days(2)),
        ];
        let scorer = Scorer::from_config(&DigestConfig::default());
        let d = scorer.build(&items, &BTreeSet::new(), params(7, 1), now).unwrap();
        assert_eq!(d.considered, 2);
        assert_eq!(d.total, 4);
        assert_eq!(d.included(), 1);
        assert_eq!(d.entries[0].item.url, "https://a.io/1");
        assert_eq!(d.entries[0].rank, 1);
    }

    #[test]
    fn ties_break_on_collected_at_then_id() {
        let scorer = Scorer::new(ImpactWeights::default(), 0.0, 7.0, 0.5);
        let now = Utc::now();
        let at = now - Duration::hours(1);
        let a = item("https://a.io/x", Impact::Medium, at);
        let b = item("https://a.io/y", Impact::Medium, at);
        let c = item("https://a.io/z", Impact::Medium, now - Duration::minutes(1));
        let items = vec![a.clone(), b.clone(), c.clone()];
        let d = scorer.build(&items, &BTreeSet::new(), params(7, 10), now).unwrap();
        let mut expected_tail = vec![a.id.clone(), b.id.clone()];
        expected_tail.sort();
        assert_eq!(d.entries[0].item.id, c.id);
        assert_eq!(
            d.entries[1..].iter().map(|e| e.item.id.clone()).collect::<Vec<_>>(),
            expected_tail
        );
    }

    #[test]
    fn huge_lookback_covers_everything() {
        let now = Utc::now();
        let items = vec![item("https://a.io/ancient", Impact::Low, now - Duration::days(3650))];
        let scorer = Scorer::from_config(&DigestConfig::default());
        let d = scorer
            .build(&items, &BTreeSet::new(), params(u32::MAX, 10), now)
            .unwrap();
        assert_eq!(d.included(), 1);
        let start = window_start(now, Duration::days(i64::from(u32::MAX)));
        assert_eq!(start, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn empty_window_is_a_valid_digest() {
        let scorer = Scorer::from_config(&DigestConfig::default());
        let d = scorer.build(&[], &BTreeSet::new(), params(7, 10), Utc::now()).unwrap();
        assert!(d.is_empty());
        assert!(scorer.build(&[], &BTreeSet::new(), params(0, 10), Utc::now()).is_err());
    }
}
