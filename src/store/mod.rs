// src/store/mod.rs
//! Append-only JSONL persistence.
//!
//! [`AppendLog`] only knows how to append a record and scan the whole file;
//! there is no update or delete. Each append is a single `write_all` of one
//! complete line on an append-mode handle, so a concurrent reader either sees
//! the whole record or none of it. A torn trailing line is skipped on scan.

pub mod items;
pub mod relevance;

pub use items::{ItemStore, StoreStats};
pub use relevance::{Recorded, RelevanceStore};

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;

/// Result of a full scan.
#[derive(Debug)]
pub struct LogScan<T> {
    pub records: Vec<T>,
    /// Lines that failed to parse (corrupt or partially written).
    pub skipped: usize,
}

/// Generic append-only log of JSON records, one per line.
#[derive(Debug)]
pub struct AppendLog<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> AppendLog<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Prepare a log at `path`. The parent directory is created; the file
    /// itself appears on first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &T) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Read every well-formed record. A missing file is an empty log.
    pub fn scan(&self) -> Result<LogScan<T>, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(LogScan {
                    records: Vec::new(),
                    skipped: 0,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(trimmed) {
                Ok(rec) => records.push(rec),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        target: "store",
                        path = %self.path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping malformed log line"
                    );
                }
            }
        }
        Ok(LogScan { records, skipped })
    }
}

/// Lock that survives a panicked holder; the guarded indices stay usable
/// because every mutation completes before the guard is dropped.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
