// src/config/sources.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Rss,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourcePriority {
    #[default]
    MustHave,
    NiceToHave,
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default, alias = "type")]
    pub kind: SourceKind,
    /// Category hint passed to extraction.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: SourcePriority,
}

impl SourceConfig {
    /// Ad-hoc source for a URL the agent picked; treated as a single page.
    pub fn adhoc(url: &str, name: Option<&str>) -> Self {
        Self {
            name: name.unwrap_or(url).to_string(),
            url: url.to_string(),
            kind: SourceKind::Html,
            category: None,
            priority: SourcePriority::NiceToHave,
        }
    }
}
