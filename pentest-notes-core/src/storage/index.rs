//! The engagement index: one summary entry per engagement.
//!
//! Read-modify-write cycles run under the index lock so two processes cannot
//! each read a stale index and clobber the other's change.

use super::atomic::{read_json, write_json};
use super::lock::{with_lock, LockOptions};
use crate::error::Result;
use crate::types::IndexEntry;
use std::path::PathBuf;

/// Handle to `engagements.json` and its lock.
#[derive(Debug, Clone)]
pub struct EngagementIndex {
    path: PathBuf,
    lock_path: PathBuf,
    lock_options: LockOptions,
}

impl EngagementIndex {
    pub fn new(path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>, lock_options: LockOptions) -> Self {
        Self {
            path: path.into(),
            lock_path: lock_path.into(),
            lock_options,
        }
    }

    /// All entries, or an empty list if the index does not exist yet.
    pub fn load(&self) -> Result<Vec<IndexEntry>> {
        read_json(&self.path, Vec::new())
    }

    pub fn get(&self, id: &str) -> Result<Option<IndexEntry>> {
        Ok(self.load()?.into_iter().find(|e| e.id == id))
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.load()?.iter().any(|e| e.id == id))
    }

    /// Replace the entry with the same id, or append it.
    pub fn upsert(&self, entry: IndexEntry) -> Result<()> {
        with_lock(&self.lock_path, &self.lock_options, || {
            let mut entries = self.load()?;
            match entries.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry.clone(),
                None => entries.push(entry.clone()),
            }
            write_json(&self.path, &entries)?;
            tracing::debug!(
                engagement = %entry.id,
                total = entries.len(),
                "index entry upserted"
            );
            Ok(())
        })
    }

    /// Drop the entry with `id`. Returns whether one was removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        with_lock(&self.lock_path, &self.lock_options, || {
            let mut entries = self.load()?;
            let before = entries.len();
            entries.retain(|e| e.id != id);
            let removed = entries.len() != before;
            if removed {
                write_json(&self.path, &entries)?;
                tracing::debug!(engagement = id, "index entry removed");
            }
            Ok(removed)
        })
    }
}
