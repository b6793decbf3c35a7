// src/model.rs
//! Core records: extracted trend items, relevance feedback events and the
//! transient digest entries built from them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Ordered impact level. Declaration order gives `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    #[serde(alias = "Low", alias = "low")]
    Low,
    #[serde(alias = "Medium", alias = "medium")]
    Medium,
    #[serde(alias = "High", alias = "high")]
    High,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Low => "LOW",
            Impact::Medium => "MEDIUM",
            Impact::High => "HIGH",
        }
    }

    /// Lenient parse for model output ("high", "High impact", "MED" ...).
    pub fn parse_lenient(s: &str) -> Option<Impact> {
        let s = s.trim().to_ascii_lowercase();
        if s.starts_with("high") {
            Some(Impact::High)
        } else if s.starts_with("med") {
            Some(Impact::Medium)
        } else if s.starts_with("low") {
            Some(Impact::Low)
        } else {
            None
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of extracted intelligence.
///
/// `id` is assigned once from the normalized URL and never changes. The dedup
/// keys (`normalized_url`, `content_hash`) are filled in by
/// [`crate::dedup::prepare_candidate`] when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendItem {
    #[serde(default)]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub normalized_url: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub why_it_matters: String,
    #[serde(
        default,
        alias = "publication_date",
        deserialize_with = "deserialize_lenient_date"
    )]
    pub published_at: Option<NaiveDate>,
    #[serde(alias = "created_at")]
    pub collected_at: DateTime<Utc>,
    pub impact: Impact,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub source_name: String,
    /// `None` when the title normalizes to nothing; such items only dedup by URL.
    #[serde(default)]
    pub content_hash: Option<String>,
}

impl TrendItem {
    /// Candidate as produced by extraction; dedup keys are computed later.
    pub fn candidate(
        url: impl Into<String>,
        title: impl Into<String>,
        impact: Impact,
        collected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            url: url.into(),
            normalized_url: String::new(),
            title: title.into(),
            summary: String::new(),
            why_it_matters: String::new(),
            published_at: None,
            collected_at,
            impact,
            category: String::new(),
            source_name: String::new(),
            content_hash: None,
        }
    }
}

/// Parse the leading `YYYY-MM-DD` of a date or datetime string.
pub fn parse_date_lenient(s: &str) -> Option<NaiveDate> {
    let head = s.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn deserialize_lenient_date<'de, D>(d: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    // Malformed dates degrade to "absent" instead of failing the whole record.
    let raw: Option<serde_json::Value> = Option::deserialize(d)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(parse_date_lenient))
}

/// One feedback click, as persisted in the relevance log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceEvent {
    pub email: String,
    pub item_id: String,
    #[serde(default)]
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
}

impl RelevanceEvent {
    /// One-way identifier of the recipient, safe to log.
    pub fn email_hash(&self) -> String {
        email_hash(&self.email)
    }
}

/// A ranked item at render time. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestEntry {
    /// 1-based position in the digest.
    pub rank: usize,
    pub score: f64,
    pub boosted: bool,
    pub item: TrendItem,
}

/// First `hex_len` hex characters of SHA-256 over `input`.
pub fn sha256_hex_prefix(input: &str, hex_len: usize) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;

    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(hex_len + 1);
    for b in digest.iter().take(hex_len.div_ceil(2)) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out.truncate(hex_len);
    out
}

/// Canonical form used for boost lookups and persistence.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// 12-hex anonymised recipient id for logs.
pub fn email_hash(email: &str) -> String {
    sha256_hex_prefix(&normalize_email(email), 12)
}
