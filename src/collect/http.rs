// src/collect/http.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::histogram;
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use super::{normalize_text, Collector, RawDocument, MAX_DOCUMENT_CHARS, MAX_FEED_ENTRIES};
use crate::config::{SourceConfig, SourceKind};
use crate::error::CollectError;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

static RE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static title regex"));

fn parse_rfc2822_date(ts: &str) -> Option<NaiveDate> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()?
        .to_offset(UtcOffset::UTC);
    let d = dt.date();
    NaiveDate::from_ymd_opt(d.year(), u32::from(u8::from(d.month())), u32::from(d.day()))
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Parse an RSS 2.0 body into at most [`MAX_FEED_ENTRIES`] documents.
/// Entries without a link are skipped.
pub fn parse_rss(body: &str, source: &SourceConfig) -> Result<Vec<RawDocument>, CollectError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(body);
    let rss: Rss = from_str(&xml_clean).map_err(|e| CollectError::Parse {
        url: source.url.clone(),
        reason: e.to_string(),
    })?;

    let out: Vec<RawDocument> = rss
        .channel
        .item
        .into_iter()
        .filter_map(|it| {
            let url = it.link.as_deref().map(str::trim).filter(|l| !l.is_empty())?.to_string();
            let title = normalize_text(it.title.as_deref().unwrap_or_default(), 500);
            let description =
                normalize_text(it.description.as_deref().unwrap_or_default(), MAX_DOCUMENT_CHARS);
            Some(RawDocument {
                source_name: source.name.clone(),
                url,
                content: if description.is_empty() { title.clone() } else { description },
                title,
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822_date),
                category_hint: source.category.clone(),
            })
        })
        .take(MAX_FEED_ENTRIES)
        .collect();

    histogram!("collect_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

/// Single page as one document: `<title>` plus the visible text.
pub fn parse_html_page(body: &str, source: &SourceConfig) -> RawDocument {
    let title = RE_TITLE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| normalize_text(m.as_str(), 500))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| source.name.clone());
    RawDocument {
        source_name: source.name.clone(),
        url: source.url.clone(),
        title,
        published_at: None,
        content: normalize_text(body, MAX_DOCUMENT_CHARS),
        category_hint: source.category.clone(),
    }
}

/// reqwest-backed collector for RSS feeds and plain pages.
pub struct HttpCollector {
    client: reqwest::Client,
}

impl HttpCollector {
    pub fn new() -> Result<Self, CollectError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trend-monitor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|source| CollectError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }

    async fn get_text(&self, url: &str) -> Result<String, CollectError> {
        let wrap = |source| CollectError::Http {
            url: url.to_string(),
            source,
        };
        self.client
            .get(url)
            .send()
            .await
            .map_err(wrap)?
            .error_for_status()
            .map_err(wrap)?
            .text()
            .await
            .map_err(wrap)
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawDocument>, CollectError> {
        super::ensure_metrics_described();
        let body = self.get_text(&source.url).await?;
        match source.kind {
            SourceKind::Rss => parse_rss(&body, source),
            SourceKind::Html => Ok(vec![parse_html_page(&body, source)]),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
