//! Report rendering
//!
//! Renderers are pure projections of a record into text. The store calls them
//! after every commit and writes the output; a renderer never reads or writes
//! engagement state itself.

mod markdown;

pub use markdown::MarkdownRenderer;

use crate::types::{EngagementRecord, Host};

/// Projects engagement state into human-readable reports.
pub trait Renderer: Send + Sync {
    /// Top-level engagement report (`REPORT.md`).
    fn render_engagement(&self, record: &EngagementRecord) -> String;

    /// Per-host report (`hosts/<ip>.md`).
    fn render_host(&self, record: &EngagementRecord, host: &Host) -> String;
}
