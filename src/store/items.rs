// src/store/items.rs
//! Item store: the append-only log of extracted items plus its dedup index.

use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use super::{lock, AppendLog};
use crate::dedup::{prepare_candidate, DedupIndex, DedupMatch, DedupOutcome};
use crate::error::StoreError;
use crate::model::TrendItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_items: usize,
    pub unique_urls: usize,
}

struct Inner {
    items: Vec<TrendItem>,
    index: DedupIndex,
}

pub struct ItemStore {
    log: AppendLog<TrendItem>,
    inner: Mutex<Inner>,
}

impl ItemStore {
    /// Load the log at `path`, backfilling missing ids and dedup keys in memory.
    /// The file is not rewritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let log = AppendLog::open(path)?;
        let scan = log.scan()?;

        let mut items = Vec::with_capacity(scan.records.len());
        let mut index = DedupIndex::default();
        let mut seen = HashSet::new();
        for mut item in scan.records {
            prepare_candidate(&mut item);
            // two writers racing can leave the same id twice; first wins
            if !seen.insert(item.id.clone()) {
                continue;
            }
            index.record(&item);
            items.push(item);
        }

        tracing::debug!(
            target: "store",
            path = %log.path().display(),
            items = items.len(),
            skipped = scan.skipped,
            "item store loaded"
        );
        Ok(Self {
            log,
            inner: Mutex::new(Inner { items, index }),
        })
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistent copy of every stored item, in append order.
    pub fn snapshot(&self) -> Vec<TrendItem> {
        lock(&self.inner).items.clone()
    }

    pub fn stats(&self) -> StoreStats {
        let inner = lock(&self.inner);
        StoreStats {
            total_items: inner.items.len(),
            unique_urls: inner.index.unique_urls(),
        }
    }

    /// `candidate` must be prepared.
    pub fn find_duplicate(&self, candidate: &TrendItem) -> Option<DedupMatch> {
        lock(&self.inner).index.lookup(candidate)
    }

    /// Lookup, append and index update under one lock, so no other caller in
    /// this process can observe the item without its index entries.
    pub fn insert_unless_duplicate(&self, candidate: TrendItem) -> Result<DedupOutcome, StoreError> {
        let mut inner = lock(&self.inner);
        if let Some(m) = inner.index.lookup(&candidate) {
            return Ok(DedupOutcome::from_match(candidate.id, Some(m)));
        }
        self.log.append(&candidate)?;
        inner.index.record(&candidate);
        let id = candidate.id.clone();
        inner.items.push(candidate);
        Ok(DedupOutcome::from_match(id, None))
    }
}
