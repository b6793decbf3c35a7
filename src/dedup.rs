// src/dedup.rs
//! Two-tier duplicate detection.
//!
//! Tier 1 compares normalized URLs (tracking parameters, fragment and trailing
//! slash removed). Tier 2 compares a hash of the normalized title and the
//! publication date, catching the same story syndicated under another URL.
//! A missing date degrades Tier 2 to title-only matching.

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use url::{form_urlencoded, Url};

use crate::error::StoreError;
use crate::model::{sha256_hex_prefix, TrendItem};
use crate::store::ItemStore;

/// Query keys dropped during normalization (compared case-insensitively).
/// Every `utm_*` key is dropped as well.
pub const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "ref", "ref_src", "ref_url", "mc_cid", "mc_eid", "yclid", "msclkid",
    "_ga", "_gl",
];

const ID_HEX_LEN: usize = 16;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "dedup_checks_total",
            "Dedup decisions by outcome (new, url_match, content_match)."
        );
        describe_counter!("items_stored_total", "Items appended to the item store.");
    });
}

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

/// Canonical URL used as the Tier 1 key and as the input of the item id.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let parsed = match Url::parse(trimmed) {
        Ok(u) if !u.cannot_be_a_base() => u,
        _ => {
            // Not an absolute hierarchical URL; keep it comparable anyway.
            let no_fragment = trimmed.split('#').next().unwrap_or_default();
            return no_fragment.trim_end_matches('/').to_string();
        }
    };

    let mut out = String::with_capacity(trimmed.len());
    out.push_str(parsed.scheme());
    out.push_str("://");
    if let Some(host) = parsed.host_str() {
        out.push_str(&host.to_ascii_lowercase());
    }
    if let Some(port) = parsed.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(parsed.path().trim_end_matches('/'));

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.is_empty() {
        // stable: repeated keys keep their relative order
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter())
            .finish();
        out.push('?');
        out.push_str(&query);
    }
    out
}

/// Lowercase and collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Tier 2 key. `None` when the title carries no text.
pub fn content_hash(title: &str, published_at: Option<chrono::NaiveDate>) -> Option<String> {
    let title = normalize_title(title);
    if title.is_empty() {
        return None;
    }
    let date = published_at
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    Some(sha256_hex_prefix(&format!("{title}|{date}"), ID_HEX_LEN))
}

/// Stable item id derived from the normalized URL.
pub fn item_id(normalized_url: &str) -> String {
    sha256_hex_prefix(normalized_url, ID_HEX_LEN)
}

/// Fill in whichever of `normalized_url`, `id`, `content_hash` is missing.
/// Existing values are never replaced.
pub fn prepare_candidate(item: &mut TrendItem) {
    if item.normalized_url.is_empty() {
        item.normalized_url = normalize_url(&item.url);
    }
    if item.id.is_empty() {
        item.id = item_id(&item.normalized_url);
    }
    if item.content_hash.is_none() {
        item.content_hash = content_hash(&item.title, item.published_at);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Url,
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupMatch {
    pub tier: MatchTier,
    pub matched_id: String,
}

/// Result of a dedup decision for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupOutcome {
    /// Id of the candidate itself.
    pub item_id: String,
    pub is_duplicate: bool,
    pub matched_id: Option<String>,
    pub tier: Option<MatchTier>,
}

impl DedupOutcome {
    pub(crate) fn from_match(item_id: String, m: Option<DedupMatch>) -> Self {
        match m {
            Some(m) => Self {
                item_id,
                is_duplicate: true,
                matched_id: Some(m.matched_id),
                tier: Some(m.tier),
            },
            None => Self {
                item_id,
                is_duplicate: false,
                matched_id: None,
                tier: None,
            },
        }
    }
}

/// In-memory lookup tables over the stored items. First writer wins.
#[derive(Debug, Default)]
pub struct DedupIndex {
    by_url: HashMap<String, String>,
    by_content: HashMap<String, String>,
}

impl DedupIndex {
    /// `item` must already be prepared.
    pub fn lookup(&self, item: &TrendItem) -> Option<DedupMatch> {
        if let Some(id) = self.by_url.get(&item.normalized_url) {
            return Some(DedupMatch {
                tier: MatchTier::Url,
                matched_id: id.clone(),
            });
        }
        item.content_hash
            .as_ref()
            .and_then(|h| self.by_content.get(h))
            .map(|id| DedupMatch {
                tier: MatchTier::Content,
                matched_id: id.clone(),
            })
    }

    pub fn record(&mut self, item: &TrendItem) {
        self.by_url
            .entry(item.normalized_url.clone())
            .or_insert_with(|| item.id.clone());
        if let Some(h) = &item.content_hash {
            self.by_content
                .entry(h.clone())
                .or_insert_with(|| item.id.clone());
        }
    }

    pub fn unique_urls(&self) -> usize {
        self.by_url.len()
    }
}

/// Dedup decisions against an [`ItemStore`].
#[derive(Clone)]
pub struct DedupEngine {
    store: Arc<ItemStore>,
}

impl DedupEngine {
    pub fn new(store: Arc<ItemStore>) -> Self {
        ensure_metrics_described();
        Self { store }
    }

    pub fn store(&self) -> &Arc<ItemStore> {
        &self.store
    }

    /// Read-only decision; nothing is persisted.
    pub fn check(&self, mut candidate: TrendItem) -> DedupOutcome {
        prepare_candidate(&mut candidate);
        let found = self.store.find_duplicate(&candidate);
        DedupOutcome::from_match(candidate.id, found)
    }

    /// Decide and, for a new item, persist it together with its index entries.
    pub fn check_and_insert(&self, mut candidate: TrendItem) -> Result<DedupOutcome, StoreError> {
        prepare_candidate(&mut candidate);
        let outcome = self.store.insert_unless_duplicate(candidate)?;

        let label = match outcome.tier {
            None => "new",
            Some(MatchTier::Url) => "url_match",
            Some(MatchTier::Content) => "content_match",
        };
        counter!("dedup_checks_total", "outcome" => label).increment(1);
        if outcome.is_duplicate {
            tracing::debug!(
                target: "dedup",
                item_id = %outcome.item_id,
                matched_id = ?outcome.matched_id,
                tier = label,
                "duplicate"
            );
        } else {
            counter!("items_stored_total").increment(1);
            tracing::info!(target: "dedup", item_id = %outcome.item_id, "stored new item");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn strips_tracking_and_fragment() {
        assert_eq!(
            normalize_url("https://x.com/a?utm_source=foo"),
            normalize_url("https://x.com/a")
        );
        assert_eq!(
            normalize_url("HTTPS://X.com/a/?UTM_Medium=m&gclid=1&b=2&a=1#top"),
            "https://x.com/a?a=1&b=2"
        );
        assert_eq!(normalize_url("https://x.com/"), "https://x.com");
        assert_eq!(normalize_url("https://x.com:8443/p"), "https://x.com:8443/p");
    }

    #[test]
    fn path_case_is_preserved() {
        assert_ne!(
            normalize_url("https://x.com/Report"),
            normalize_url("https://x.com/report")
        );
    }

    #[test]
    fn unparseable_url_still_normalizes() {
        assert_eq!(normalize_url(" not a url/#frag "), "not a url");
    }

    #[test]
    fn content_hash_degrades_without_date() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1);
        let with_date = content_hash("  New   PSD3  Draft ", d);
        assert_eq!(with_date, content_hash("new psd3 draft", d));
        assert_ne!(with_date, content_hash("new psd3 draft", None));
        assert!(content_hash("new psd3 draft", None).is_some());
        assert_eq!(content_hash("   ", d), None);
    }

    #[test]
    fn index_matches_url_before_content() {
        let mut a = TrendItem::candidate("https://x.com/a", "Title", crate::model::Impact::Low, chrono::Utc::now());
        prepare_candidate(&mut a);
        let mut idx = DedupIndex::default();
        idx.record(&a);

        let mut same_url = a.clone();
        same_url.id.clear();
        same_url.title = "Other".into();
        same_url.content_hash = None;
        prepare_candidate(&mut same_url);
        assert_eq!(idx.lookup(&same_url).map(|m| m.tier), Some(MatchTier::Url));

        let mut same_title = TrendItem::candidate("https://y.com/b", "title", crate::model::Impact::Low, chrono::Utc::now());
        prepare_candidate(&mut same_title);
        let m = idx.lookup(&same_title).expect("content match");
        assert_eq!(m.tier, MatchTier::Content);
        assert_eq!(m.matched_id, a.id);
    }
}
