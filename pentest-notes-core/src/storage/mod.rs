//! On-disk storage layer
//!
//! Everything the engagement store persists goes through this module:
//!
//! ```text
//! <root>/
//!   state.json                         active engagement (AppState)
//!   engagements.json                   index (Vec<IndexEntry>)
//!   engagements.lock                   index lock sentinel, only while held
//!   engagements/<id>/engagement.json   detail record
//!   engagements/<id>/REPORT.md         rendered engagement report
//!   engagements/<id>/hosts/<ip>.md     rendered host reports
//!   engagements/<id>/evidence/         saved evidence files
//! ```
//!
//! Only the index is shared between processes under a lock; detail records
//! assume a single writer per engagement (last writer wins otherwise).

mod atomic;
mod index;
mod lock;
mod state;

pub use atomic::{atomic_write, read_json, stage_write, write_json, StagedWrite};
pub use index::EngagementIndex;
pub use lock::{with_lock, LockGuard, LockOptions};
pub use state::GlobalState;

use std::path::{Path, PathBuf};

const STATE_FILE: &str = "state.json";
const INDEX_FILE: &str = "engagements.json";
const LOCK_FILE: &str = "engagements.lock";
const ENGAGEMENTS_DIR: &str = "engagements";
const RECORD_FILE: &str = "engagement.json";
const REPORT_FILE: &str = "REPORT.md";

/// File name of a host report. `:` (IPv6) and path separators become `_`.
pub fn host_report_name(ip: &str) -> String {
    let name: String = ip
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    format!("{}.md", name)
}

/// Resolves every path under a storage root.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn index_file(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn engagements_dir(&self) -> PathBuf {
        self.root.join(ENGAGEMENTS_DIR)
    }

    pub fn engagement_dir(&self, id: &str) -> PathBuf {
        self.engagements_dir().join(id)
    }

    pub fn record_file(&self, id: &str) -> PathBuf {
        self.engagement_dir(id).join(RECORD_FILE)
    }

    pub fn report_file(&self, id: &str) -> PathBuf {
        self.engagement_dir(id).join(REPORT_FILE)
    }

    pub fn hosts_dir(&self, id: &str) -> PathBuf {
        self.engagement_dir(id).join("hosts")
    }

    pub fn host_report_file(&self, id: &str, ip: &str) -> PathBuf {
        self.hosts_dir(id).join(host_report_name(ip))
    }

    pub fn evidence_dir(&self, id: &str) -> PathBuf {
        self.engagement_dir(id).join("evidence")
    }

    /// Glob pattern matching every detail record. The root is escaped.
    pub fn record_glob(&self) -> String {
        let dir = glob::Pattern::escape(&self.engagements_dir().to_string_lossy());
        Path::new(&dir)
            .join("*")
            .join(RECORD_FILE)
            .to_string_lossy()
            .into_owned()
    }
}
