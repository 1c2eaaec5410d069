//! # pentest-notes-core
//!
//! Core library for pentest-notes, a structured note store for penetration
//! testing engagements.
//!
//! This library provides:
//! - Domain types for engagements, hosts, findings, credentials and evidence
//! - Durable JSON storage with atomic writes and a locked engagement index
//! - Markdown report rendering
//! - Ingestion of security tool output (nmap, nuclei)
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! One engagement is active at a time. Every mutation goes through
//! [`EngagementStore`]:
//! - **Record:** `engagements/<id>/engagement.json`, written atomically
//! - **Index:** `engagements.json`, one summary per engagement, updated under a lock
//! - **Reports:** `REPORT.md` and `hosts/<ip>.md`, re-rendered after each commit
//!
//! ## Example
//!
//! ```rust,no_run
//! use pentest_notes_core::{Config, EngagementStore, NewFinding, Severity};
//!
//! let config = Config::load().expect("failed to load config");
//! let store = EngagementStore::open(&config);
//!
//! store
//!     .create_engagement("Acme Corp", vec!["10.0.0.0/24".into()], "business hours")
//!     .expect("failed to create engagement");
//! let finding = store
//!     .add_finding(NewFinding::new("10.0.0.5", "SMB signing disabled", Severity::Medium))
//!     .expect("failed to add finding");
//! assert_eq!(finding.id, "F-001");
//! ```

// Re-export commonly used items at the crate root
pub use capture::{CaptureOutcome, CommandCapture};
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::IngestReport;
pub use render::{MarkdownRenderer, Renderer};
pub use store::{EngagementStore, ReconcileReport};
pub use types::*;

// Public modules
pub mod capture;
pub mod config;
pub mod engagement;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod render;
pub mod storage;
pub mod store;
pub mod types;
