// src/extract/openai.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use super::Extractor;
use crate::collect::RawDocument;
use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::llm::{strip_code_fence, ChatClient, ChatMessage};
use crate::model::{parse_date_lenient, Impact, TrendItem};

const SYSTEM_PROMPT: &str = "You analyse regulatory and payments news for a financial-services \
audience. Reply with ONE JSON object with keys: \
\"title\" (string), \"summary\" (2-3 sentences), \"why_it_matters\" (one actionable sentence), \
\"category\" (\"payments\" or \"regulatory\" or another short label), \
\"impact\" (\"HIGH\", \"MEDIUM\" or \"LOW\"), \
\"published_at\" (YYYY-MM-DD or null). No prose outside the JSON.";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("extract_items_total", "Documents turned into items.");
        describe_counter!("extract_failures_total", "Documents skipped by extraction.");
    });
}

#[derive(Debug, Deserialize)]
struct Extracted {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    why_it_matters: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

fn nonempty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Build a candidate from the model's JSON reply. The document supplies the
/// URL, the source name and fallbacks for title, date and category.
pub fn item_from_reply(
    reply: &str,
    doc: &RawDocument,
    collected_at: DateTime<Utc>,
) -> Result<TrendItem, ExtractionError> {
    let parsed: Extracted = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| ExtractionError::InvalidOutput(format!("not json: {e}")))?;

    let impact_raw = nonempty(parsed.impact)
        .ok_or_else(|| ExtractionError::InvalidOutput("missing impact".into()))?;
    let impact = Impact::parse_lenient(&impact_raw)
        .ok_or_else(|| ExtractionError::InvalidOutput(format!("unknown impact `{impact_raw}`")))?;

    let title = nonempty(parsed.title).unwrap_or_else(|| doc.title.clone());
    if title.trim().is_empty() {
        return Err(ExtractionError::InvalidOutput("empty title".into()));
    }

    let mut item = TrendItem::candidate(doc.url.clone(), title, impact, collected_at);
    item.summary = nonempty(parsed.summary).unwrap_or_default();
    item.why_it_matters = nonempty(parsed.why_it_matters).unwrap_or_default();
    item.category = nonempty(parsed.category)
        .map(|c| c.to_lowercase())
        .or_else(|| doc.category_hint.clone())
        .unwrap_or_else(|| "general".to_string());
    item.published_at = parsed
        .published_at
        .as_deref()
        .and_then(parse_date_lenient)
        .or(doc.published_at);
    item.source_name = doc.source_name.clone();
    Ok(item)
}

pub struct OpenAiExtractor {
    chat: ChatClient,
    max_content_chars: usize,
}

impl OpenAiExtractor {
    pub fn from_config(cfg: &ExtractionConfig) -> Result<Self, ExtractionError> {
        ensure_metrics_described();
        Ok(Self {
            chat: ChatClient::from_config(cfg)?,
            max_content_chars: cfg.max_content_chars,
        })
    }

    fn user_prompt(&self, doc: &RawDocument) -> String {
        let content: String = doc.content.chars().take(self.max_content_chars).collect();
        let mut prompt = format!("Source: {}\nURL: {}\nTitle: {}\n", doc.source_name, doc.url, doc.title);
        if let Some(d) = doc.published_at {
            prompt.push_str(&format!("Published: {d}\n"));
        }
        if let Some(hint) = &doc.category_hint {
            prompt.push_str(&format!("Category hint: {hint}\n"));
        }
        prompt.push_str("\nContent:\n");
        prompt.push_str(&content);
        prompt
    }
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    async fn extract(&self, doc: &RawDocument) -> Result<TrendItem, ExtractionError> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(self.user_prompt(doc)),
        ];
        let result = match self.chat.complete_json(&messages).await {
            Ok(reply) => item_from_reply(&reply, doc, Utc::now()),
            Err(e) => Err(e.into()),
        };
        match &result {
            Ok(item) => {
                counter!("extract_items_total").increment(1);
                tracing::debug!(target: "extract", url = %doc.url, impact = %item.impact, "extracted");
            }
            Err(e) => {
                counter!("extract_failures_total").increment(1);
                tracing::warn!(target: "extract", url = %doc.url, error = %e, "extraction failed");
            }
        }
        result
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn doc() -> RawDocument {
        RawDocument {
            source_name: "ECB".into(),
            url: "https://ecb.example/press/1".into(),
            title: "Fallback title".into(),
            published_at: NaiveDate::from_ymd_opt(2024, 4, 30),
            content: "body".into(),
            category_hint: Some("regulatory".into()),
        }
    }

    #[test]
    fn reply_maps_onto_item() {
        let reply = r#"```json
{"title":"Digital euro update","summary":"S","why_it_matters":"W","category":"Payments","impact":"high","published_at":"2024-05-01"}
```"#;
        let item = item_from_reply(reply, &doc(), Utc::now()).unwrap();
        assert_eq!(item.title, "Digital euro update");
        assert_eq!(item.impact, Impact::High);
        assert_eq!(item.category, "payments");
        assert_eq!(item.published_at, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(item.source_name, "ECB");
        assert!(item.id.is_empty());
    }

    #[test]
    fn falls_back_to_document_fields() {
        let reply = r#"{"impact":"Low","published_at":"soon"}"#;
        let item = item_from_reply(reply, &doc(), Utc::now()).unwrap();
        assert_eq!(item.title, "Fallback title");
        assert_eq!(item.category, "regulatory");
        assert_eq!(item.published_at, NaiveDate::from_ymd_opt(2024, 4, 30));
    }

    #[test]
    fn rejects_missing_impact_and_garbage() {
        assert!(item_from_reply(r#"{"title":"x"}"#, &doc(), Utc::now()).is_err());
        assert!(item_from_reply("not json", &doc(), Utc::now()).is_err());
        assert!(item_from_reply(r#"{"impact":"critical"}"#, &doc(), Utc::now()).is_err());
    }
}
