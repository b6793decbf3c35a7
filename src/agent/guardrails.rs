// src/agent/guardrails.rs
//! Limits the controller enforces regardless of what the selector asks for.

use std::collections::BTreeSet;
use std::time::Duration;
use url::Url;

use super::ToolCall;
use crate::config::AgentConfig;
use crate::error::GuardrailViolation;

/// Host of an allowlist entry given either as a bare host or as a URL.
fn entry_host(entry: &str) -> Option<String> {
    let e = entry.trim();
    if e.is_empty() {
        return None;
    }
    if e.contains("://") {
        return Url::parse(e)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
    }
    let host = e.split(['/', '?', '#']).next().unwrap_or_default();
    Some(host.trim_end_matches('.').to_ascii_lowercase()).filter(|h| !h.is_empty())
}

#[derive(Debug, Clone)]
pub struct Guardrails {
    max_steps: usize,
    timeout: Duration,
    allowed_hosts: BTreeSet<String>,
}

impl Guardrails {
    pub fn new(max_steps: usize, timeout: Duration, allowlist: &[String]) -> Self {
        Self {
            max_steps,
            timeout,
            allowed_hosts: allowlist.iter().filter_map(|e| entry_host(e)).collect(),
        }
    }

    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self::new(
            cfg.max_steps,
            Duration::from_secs(cfg.timeout_secs),
            &cfg.allowed_sources,
        )
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// http(s) URL whose host exactly matches an allowlisted host.
    pub fn is_url_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        parsed
            .host_str()
            .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
            .is_some_and(|h| self.allowed_hosts.contains(&h))
    }

    pub fn check_time(&self, elapsed: Duration) -> Result<(), GuardrailViolation> {
        if elapsed >= self.timeout {
            return Err(GuardrailViolation::Timeout {
                limit: self.timeout,
                elapsed,
            });
        }
        Ok(())
    }

    /// Checked right before a tool runs: time, step budget, then URL allowlist.
    pub fn check_before_tool(
        &self,
        steps_taken: usize,
        elapsed: Duration,
        call: &ToolCall,
    ) -> Result<(), GuardrailViolation> {
        self.check_time(elapsed)?;
        if steps_taken >= self.max_steps {
            return Err(GuardrailViolation::StepLimit {
                max_steps: self.max_steps,
            });
        }
        if let ToolCall::ScrapeSource { url, .. } = call {
            if !self.is_url_allowed(url) {
                return Err(GuardrailViolation::DisallowedUrl { url: url.clone() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g() -> Guardrails {
        Guardrails::new(
            3,
            Duration::from_secs(10),
            &[
                "https://www.ecb.europa.eu/rss/press.html".to_string(),
                "EBA.europa.eu".to_string(),
            ],
        )
    }

    #[test]
    fn allowlist_is_exact_host_match() {
        let g = g();
        assert!(g.is_url_allowed("https://www.ecb.europa.eu/press/other"));
        assert!(g.is_url_allowed("http://eba.europa.eu/x"));
        assert!(!g.is_url_allowed("https://ecb.europa.eu/press"));
        assert!(!g.is_url_allowed("https://www.ecb.europa.eu.evil.io/"));
        assert!(!g.is_url_allowed("https://evil.io/?u=www.ecb.europa.eu"));
        assert!(!g.is_url_allowed("ftp://eba.europa.eu/x"));
        assert!(!g.is_url_allowed("not a url"));
    }

    #[test]
    fn step_and_time_limits() {
        let g = g();
        let call = ToolCall::RenderDigest {
            lookback_days: None,
            max_items: None,
        };
        assert!(g.check_before_tool(2, Duration::from_secs(1), &call).is_ok());
        assert_eq!(
            g.check_before_tool(3, Duration::from_secs(1), &call),
            Err(GuardrailViolation::StepLimit { max_steps: 3 })
        );
        assert!(matches!(
            g.check_before_tool(0, Duration::from_secs(10), &call),
            Err(GuardrailViolation::Timeout { .. })
        ));
    }
}
