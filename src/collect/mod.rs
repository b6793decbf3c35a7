// src/collect/mod.rs
//! Raw document collection from configured sources.
//!
//! A [`Collector`] fetches one source at a time. [`collect_all`] walks a list
//! of sources and keeps going when one of them fails; failures are reported
//! in the [`CollectionReport`].

pub mod http;

pub use http::HttpCollector;

use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::Serialize;

use crate::config::SourceConfig;
use crate::error::CollectError;

/// Entries taken from a single feed.
pub const MAX_FEED_ENTRIES: usize = 10;
/// Characters of body text kept per document.
pub const MAX_DOCUMENT_CHARS: usize = 20_000;

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collect_documents_total", "Raw documents fetched.");
        describe_counter!("collect_source_errors_total", "Source fetch/parse failures.");
        describe_histogram!("collect_parse_ms", "Source parse time in milliseconds.");
    });
}

/// A fetched, not yet interpreted document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawDocument {
    pub source_name: String,
    pub url: String,
    pub title: String,
    pub published_at: Option<NaiveDate>,
    pub content: String,
    pub category_hint: Option<String>,
}

#[async_trait]
pub trait Collector: Send + Sync {
    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawDocument>, CollectError>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct CollectionReport {
    pub documents: Vec<RawDocument>,
    pub succeeded: Vec<String>,
    /// (source name, error message)
    pub failed: Vec<(String, String)>,
}

/// Fetch every source, tolerating per-source failures.
pub async fn collect_all(collector: &dyn Collector, sources: &[SourceConfig]) -> CollectionReport {
    ensure_metrics_described();
    let mut report = CollectionReport::default();
    for source in sources {
        match collector.fetch(source).await {
            Ok(docs) => {
                tracing::info!(target: "collect", source = %source.name, documents = docs.len(), "source fetched");
                counter!("collect_documents_total").increment(docs.len() as u64);
                report.succeeded.push(source.name.clone());
                report.documents.extend(docs);
            }
            Err(e) => {
                tracing::warn!(target: "collect", error = %e, source = %source.name, collector = collector.name(), "source failed");
                counter!("collect_source_errors_total").increment(1);
                report.failed.push((source.name.clone(), e.to_string()));
            }
        }
    }
    report
}

static RE_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
        .expect("static script regex")
});
static RE_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("static tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static ws regex"));

/// Strip markup and collapse whitespace; cap at `max_chars` characters.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) drop script/style bodies, then tags
    let out = RE_SCRIPT.replace_all(s, " ");
    let out = RE_TAGS.replace_all(&out, " ");

    // 2) entities after tag removal so "&lt;b&gt;" survives as text
    let out = html_escape::decode_html_entities(&out).to_string();

    // 3) typographic quotes to ASCII
    let out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    let out = RE_WS.replace_all(&out, " ");
    let out = out.trim();
    if out.chars().count() > max_chars {
        out.chars().take(max_chars).collect()
    } else {
        out.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn normalize_strips_markup() {
        let s = "<p>Hello&nbsp;<b>world</b></p><script>var x = 1;</script>\n\n \u{201C}ok\u{201D}";
        assert_eq!(normalize_text(s, 100), "Hello world \"ok\"");
        assert_eq!(normalize_text("abcdef", 3), "abc");
    }

    struct Flaky {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Collector for Flaky {
        async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawDocument>, CollectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if source.name == "bad" {
                return Err(CollectError::Parse {
                    url: source.url.clone(),
                    reason: "boom".into(),
                });
            }
            Ok(vec![RawDocument {
                source_name: source.name.clone(),
                url: format!("{}/1", source.url),
                title: "t".into(),
                published_at: None,
                content: "c".into(),
                category_hint: None,
            }])
        }
        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn one_failing_source_does_not_abort_the_batch() {
        let sources = vec![
            SourceConfig::adhoc("https://a.io", Some("good")),
            SourceConfig::adhoc("https://b.io", Some("bad")),
            SourceConfig::adhoc("https://c.io", Some("good2")),
        ];
        let c = Flaky { calls: AtomicUsize::new(0) };
        let report = collect_all(&c, &sources).await;
        assert_eq!(c.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.succeeded, vec!["good", "good2"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");
    }
}
