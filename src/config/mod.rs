// src/config/mod.rs
//! Process configuration, loaded once at startup and passed down explicitly.
//!
//! Resolution order for the TOML file:
//! 1) explicit path (CLI `--config`)
//! 2) $TREND_CONFIG_PATH
//! 3) config/trend_monitor.toml (optional; built-in defaults when missing)
//!
//! Secrets and deployment values are then overridden from the environment.

pub mod sources;

pub use sources::{SourceConfig, SourceKind, SourcePriority};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "TREND_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/trend_monitor.toml";

pub const DEFAULT_GOAL: &str = "Collect content from all configured sources, extract trend items, \
check for duplicates, and render a digest of financial services trends.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub digest: DigestConfig,
    pub agent: AgentConfig,
    pub feedback: FeedbackConfig,
    pub extraction: ExtractionConfig,
    pub email: EmailConfig,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub items_path: PathBuf,
    pub relevance_path: PathBuf,
    pub alert_state_path: PathBuf,
    /// Directory for the agent's reasoning trace and run summary.
    pub logs_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            items_path: PathBuf::from("data/trend_items.jsonl"),
            relevance_path: PathBuf::from("data/relevance_feedback.jsonl"),
            alert_state_path: PathBuf::from("data/alerted_items.jsonl"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

/// Weight per impact level; must satisfy `high >= medium >= low`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for ImpactWeights {
    fn default() -> Self {
        Self {
            high: 3.0,
            medium: 2.0,
            low: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub lookback_days: u32,
    pub max_items: usize,
    /// Added once to an item the recipient marked relevant.
    pub relevance_boost: f64,
    /// Recency weight of an item collected right now.
    pub recency_scale: f64,
    /// Age at which the recency weight halves.
    pub recency_half_life_days: f64,
    pub impact_weights: ImpactWeights,
    pub title: String,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            max_items: 20,
            relevance_boost: 0.5,
            recency_scale: 1.0,
            recency_half_life_days: 7.0,
            impact_weights: ImpactWeights::default(),
            title: "Financial Services Trend Digest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub timeout_secs: u64,
    /// Hosts (or URLs) `scrape_source` may touch. Empty means the hosts of `[[sources]]`.
    pub allowed_sources: Vec<String>,
    pub goal: String,
    /// Documents the offline plan analyzes from each scraped source.
    pub documents_per_source: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            timeout_secs: 300,
            allowed_sources: Vec::new(),
            goal: DEFAULT_GOAL.to_string(),
            documents_per_source: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub bind: String,
    /// Public base URL for "Relevant" links in digests. No links when unset.
    pub base_url: Option<String>,
    /// Recipient whose clicks boost the digest. Falls back to the first `email.to`.
    pub recipient: Option<String>,
    pub rate_limit_max: usize,
    pub rate_limit_window_secs: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            base_url: None,
            recipient: None,
            rate_limit_max: 30,
            rate_limit_window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub api_base: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Document text beyond this many characters is not sent to the model.
    pub max_content_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.2,
            timeout_secs: 30,
            max_content_chars: 6000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,
    pub from: Option<String>,
    pub to: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            from: None,
            to: Vec::new(),
        }
    }
}

/// Split a `,`/`;` separated address list.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Parse and validate TOML. No environment access.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing config toml")?;
        cfg.finalize();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Full startup load: file resolution, env overrides, validation.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = if let Some(p) = explicit {
            Self::load_from(p)?
        } else if let Some(p) = env_nonempty(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::load_from(&default)?
            } else {
                tracing::info!(target: "config", "no config file, using built-in defaults");
                let mut cfg = Self::default();
                cfg.finalize();
                cfg
            }
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Environment wins over the file for secrets and deployment values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_nonempty("OPENAI_API_KEY") {
            self.extraction.api_key = Some(v);
        }
        if let Some(v) = env_nonempty("LLM_MODEL") {
            self.extraction.model = v;
        }
        if let Some(v) = env_nonempty("SMTP_HOST") {
            self.email.smtp_host = v;
        }
        if let Some(v) = env_nonempty("SMTP_PORT") {
            self.email.smtp_port = v
                .parse()
                .with_context(|| format!("SMTP_PORT is not a port number: {v}"))?;
        }
        if let Some(v) = env_nonempty("SMTP_USER") {
            self.email.smtp_user = Some(v);
        }
        if let Some(v) = env_nonempty("SMTP_PASSWORD") {
            self.email.smtp_password = Some(v);
        }
        if let Some(v) = env_nonempty("EMAIL_FROM") {
            self.email.from = Some(v);
        }
        if let Some(v) = env_nonempty("EMAIL_TO") {
            self.email.to = parse_recipients(&v);
        }
        if let Some(v) = env_nonempty("FEEDBACK_BASE_URL") {
            self.feedback.base_url = Some(v);
        }
        if let Some(v) = env_nonempty("FEEDBACK_RECIPIENT_EMAIL") {
            self.feedback.recipient = Some(v);
        }
        Ok(())
    }

    fn finalize(&mut self) {
        if self.agent.allowed_sources.is_empty() {
            self.agent.allowed_sources = self.sources.iter().map(|s| s.url.clone()).collect();
        }
        if let Some(base) = self.feedback.base_url.as_mut() {
            while base.ends_with('/') {
                base.pop();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.digest;
        if d.lookback_days == 0 {
            bail!("digest.lookback_days must be positive");
        }
        if d.max_items == 0 {
            bail!("digest.max_items must be positive");
        }
        if !(d.relevance_boost >= 0.0) {
            bail!("digest.relevance_boost must be >= 0");
        }
        if !(d.recency_scale >= 0.0) {
            bail!("digest.recency_scale must be >= 0");
        }
        if !(d.recency_half_life_days > 0.0) {
            bail!("digest.recency_half_life_days must be > 0");
        }
        let w = d.impact_weights;
        if !(w.high >= w.medium && w.medium >= w.low) {
            bail!("digest.impact_weights must satisfy high >= medium >= low");
        }
        if self.agent.max_steps == 0 {
            bail!("agent.max_steps must be positive");
        }
        if self.agent.timeout_secs == 0 {
            bail!("agent.timeout_secs must be positive");
        }
        if self.agent.documents_per_source == 0 {
            bail!("agent.documents_per_source must be positive");
        }
        if self.feedback.rate_limit_max == 0 || self.feedback.rate_limit_window_secs == 0 {
            bail!("feedback rate limit must be positive");
        }
        Ok(())
    }

    /// Address whose feedback boosts rankings.
    pub fn boost_recipient(&self) -> Option<String> {
        self.feedback
            .recipient
            .clone()
            .or_else(|| self.email.to.first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.digest.max_items, 20);
        assert_eq!(cfg.agent.max_steps, 50);
        assert_eq!(cfg.agent.documents_per_source, 5);
        assert_eq!(cfg.feedback.rate_limit_max, 30);
    }

    #[test]
    fn rejects_non_monotonic_weights() {
        let err = AppConfig::from_toml_str(
            "[digest.impact_weights]\nhigh = 1.0\nmedium = 2.0\nlow = 0.5\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("impact_weights"));
    }

    #[test]
    fn allowlist_falls_back_to_sources() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [feedback]
            base_url = "https://fb.example.com/"

            [[sources]]
            name = "ECB"
            url = "https://www.ecb.europa.eu/rss/press.html"
            kind = "rss"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.allowed_sources, vec!["https://www.ecb.europa.eu/rss/press.html"]);
        assert_eq!(cfg.feedback.base_url.as_deref(), Some("https://fb.example.com"));
    }

    #[test]
    fn recipients_split_on_comma_and_semicolon() {
        assert_eq!(parse_recipients("a@x.io; b@y.io ,,"), vec!["a@x.io", "b@y.io"]);
    }
}
