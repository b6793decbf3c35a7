// src/digest/render.rs
//! Text and HTML renderings of a ranked [`Digest`]. Pure functions: entries are
//! written in rank order and nothing here re-scores or re-orders them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use url::form_urlencoded;

use super::Digest;
use crate::model::DigestEntry;

const RULE_WIDTH: usize = 70;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions<'a> {
    pub title: &'a str,
    pub run_id: &'a str,
    /// With both set, HTML entries carry a "Relevant" feedback link.
    pub feedback_base_url: Option<&'a str>,
    pub recipient: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedDigest {
    pub run_id: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub item_ids: Vec<String>,
}

/// `digest-YYYY-MM-DD-HHMM` in UTC.
pub fn run_id_for(now: DateTime<Utc>) -> String {
    now.format("digest-%Y-%m-%d-%H%M").to_string()
}

/// Feedback URL for one item. Only the first address of a `,`/`;` list is used.
pub fn feedback_link(base_url: &str, item_id: &str, recipient: &str, run_id: &str) -> Option<String> {
    let email = recipient
        .split([',', ';'])
        .map(str::trim)
        .find(|s| !s.is_empty())?;
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("item_id", item_id)
        .append_pair("email", email)
        .append_pair("run_id", run_id)
        .finish();
    Some(format!(
        "{}/feedback/relevant?{}",
        base_url.trim_end_matches('/'),
        query
    ))
}

pub fn render(digest: &Digest, opts: &RenderOptions<'_>) -> RenderedDigest {
    RenderedDigest {
        run_id: opts.run_id.to_string(),
        subject: opts.title.to_string(),
        text: render_text(digest, opts),
        html: render_html(digest, opts),
        item_ids: digest.item_ids(),
    }
}

fn date_label(entry: &DigestEntry) -> String {
    entry
        .item
        .published_at
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn render_text(digest: &Digest, opts: &RenderOptions<'_>) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{}", opts.title.to_uppercase());
    let _ = writeln!(
        out,
        "Generated: {}",
        digest.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(out, "Run: {}", opts.run_id);
    let _ = writeln!(
        out,
        "Items: {} (of {} in the last {} days)",
        digest.included(),
        digest.considered,
        digest.lookback_days
    );
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);

    if digest.is_empty() {
        let _ = writeln!(out, "No new items in the last {} days.", digest.lookback_days);
    }

    for e in &digest.entries {
        let it = &e.item;
        let _ = writeln!(out, "{}. [{}] {}", e.rank, it.impact, it.title);
        let _ = writeln!(
            out,
            "   Category: {} | Date: {} | Source: {}",
            if it.category.is_empty() { "n/a" } else { it.category.as_str() },
            date_label(e),
            if it.source_name.is_empty() { "n/a" } else { it.source_name.as_str() },
        );
        let _ = writeln!(out, "   URL: {}", it.url);
        if !it.summary.is_empty() {
            let _ = writeln!(out, "   Summary: {}", it.summary);
        }
        if !it.why_it_matters.is_empty() {
            let _ = writeln!(out, "   Why it matters: {}", it.why_it_matters);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    let _ = writeln!(out, "End of digest");
    out
}

pub fn render_html(digest: &Digest, opts: &RenderOptions<'_>) -> String {
    use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
    let _ = write!(out, "<title>{}</title>", text(opts.title));
    out.push_str("</head>\n<body style=\"font-family:Arial,sans-serif;max-width:720px;margin:auto\">\n");
    let _ = writeln!(out, "<h1>{}</h1>", text(opts.title));
    let _ = writeln!(
        out,
        "<p style=\"color:#666\">Generated {} &middot; {} of {} items from the last {} days &middot; {}</p>",
        digest.generated_at.format("%Y-%m-%d %H:%M UTC"),
        digest.included(),
        digest.considered,
        digest.lookback_days,
        text(opts.run_id)
    );

    if digest.is_empty() {
        let _ = writeln!(
            out,
            "<p>No new items in the last {} days.</p>",
            digest.lookback_days
        );
    }

    for e in &digest.entries {
        let it = &e.item;
        out.push_str("<div style=\"border-bottom:1px solid #ddd;padding:12px 0\">\n");
        let _ = writeln!(
            out,
            "<h3 style=\"margin:0\">{}. <a href=\"{}\">{}</a> <small>[{}]</small></h3>",
            e.rank,
            attr(&it.url),
            text(&it.title),
            it.impact
        );
        let _ = writeln!(
            out,
            "<p style=\"color:#666;margin:4px 0\">{} &middot; {} &middot; {}</p>",
            text(if it.category.is_empty() { "n/a" } else { it.category.as_str() }),
            date_label(e),
            text(if it.source_name.is_empty() { "n/a" } else { it.source_name.as_str() }),
        );
        if !it.summary.is_empty() {
            let _ = writeln!(out, "<p>{}</p>", text(&it.summary));
        }
        if !it.why_it_matters.is_empty() {
            let _ = writeln!(
                out,
                "<p><strong>Why it matters:</strong> {}</p>",
                text(&it.why_it_matters)
            );
        }
        if let (Some(base), Some(rcpt)) = (opts.feedback_base_url, opts.recipient) {
            if let Some(link) = feedback_link(base, &it.id, rcpt, opts.run_id) {
                let _ = writeln!(
                    out,
                    "<p><a href=\"{}\">&#128077; Relevant</a></p>",
                    attr(&link)
                );
            }
        }
        out.push_str("</div>\n");
    }

    out.push_str("<p style=\"color:#999\">End of digest</p>\n</body></html>\n");
    out
}
