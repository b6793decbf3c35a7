// src/store/relevance.rs
//! Relevance store: append-only log of feedback clicks and the per-recipient
//! boost sets derived from it.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

use super::{lock, AppendLog};
use crate::error::StoreError;
use crate::model::{normalize_email, RelevanceEvent};

/// Outcome of recording a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    New,
    AlreadyNoted,
}

pub struct RelevanceStore {
    log: AppendLog<RelevanceEvent>,
    /// normalized email -> distinct item ids
    boosts: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl RelevanceStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let log: AppendLog<RelevanceEvent> = AppendLog::open(path)?;
        let scan = log.scan()?;
        let mut boosts: HashMap<String, BTreeSet<String>> = HashMap::new();
        for ev in &scan.records {
            boosts
                .entry(normalize_email(&ev.email))
                .or_default()
                .insert(ev.item_id.clone());
        }
        tracing::debug!(
            target: "store",
            path = %log.path().display(),
            events = scan.records.len(),
            recipients = boosts.len(),
            "relevance store loaded"
        );
        Ok(Self {
            log,
            boosts: Mutex::new(boosts),
        })
    }

    /// Append a click unless `(email, item_id)` is already known.
    /// Input validation is the caller's job.
    pub fn record(
        &self,
        email: &str,
        item_id: &str,
        run_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Recorded, StoreError> {
        let email = normalize_email(email);
        let mut boosts = lock(&self.boosts);
        if boosts
            .get(&email)
            .is_some_and(|ids| ids.contains(item_id))
        {
            return Ok(Recorded::AlreadyNoted);
        }
        let ev = RelevanceEvent {
            email: email.clone(),
            item_id: item_id.to_string(),
            run_id: run_id.to_string(),
            timestamp: at,
        };
        self.log.append(&ev)?;
        boosts.entry(email).or_default().insert(ev.item_id);
        Ok(Recorded::New)
    }

    /// Distinct item ids the recipient marked relevant.
    pub fn boost_set(&self, email: &str) -> BTreeSet<String> {
        lock(&self.boosts)
            .get(&normalize_email(email))
            .cloned()
            .unwrap_or_default()
    }

    pub fn recipients(&self) -> usize {
        lock(&self.boosts).len()
    }
}
