//! Ingestion of security tool output
//!
//! Raw tool output is parsed into host discoveries and findings, applied to
//! the active engagement, and kept as evidence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Tool output    │ ──► │   ingest_file    │ ──► │ EngagementStore │
//! │ (scan.txt, ...) │     │                  │     │ (record, index) │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────────┐
//!                    │  ToolParser          │
//!                    │  ├─ NmapParser       │
//!                    │  └─ NucleiParser     │
//!                    └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pentest_notes_core::{Config, EngagementStore};
//!
//! let store = EngagementStore::open(&Config::load()?);
//! let report = store.ingest_file("nmap", Path::new("scan.txt"))?;
//! println!("{} hosts, {} findings", report.hosts_discovered, report.findings_added);
//! ```

mod parser;
pub mod parsers;

pub use parser::{ParsedOutput, ToolParser};

use crate::error::{Error, Result};
use crate::store::EngagementStore;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Result of ingesting one tool output file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Parser that handled the file
    pub tool: String,
    /// Distinct hosts present in the output
    pub hosts_discovered: usize,
    /// Hosts that were new to the engagement
    pub hosts_created: usize,
    /// Services added across all hosts
    pub services_added: usize,
    /// Findings added
    pub findings_added: usize,
    /// Evidence file holding the raw output
    pub evidence_file: String,
    /// Non-fatal problems from parsing or applying
    pub warnings: Vec<String>,
}

/// Evidence name for ingested output: `<tool>-<yyyymmddTHHMMSS>-<source name>`.
///
/// When `taken` already reports that name, `-2`, `-3`, ... is inserted before
/// the extension until a free one is found.
fn evidence_name(
    tool: &str,
    source: &Path,
    now: chrono::DateTime<Utc>,
    taken: impl Fn(&str) -> bool,
) -> String {
    let source_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let base = format!("{}-{}-{}", tool, now.format("%Y%m%dT%H%M%S"), source_name);
    if !taken(&base) {
        return base;
    }

    let ext = Path::new(&source_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stem = &base[..base.len() - ext.len()];
    (2u32..)
        .map(|n| format!("{}-{}{}", stem, n, ext))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

impl EngagementStore {
    /// Parse `path` with the parser for `tool` and merge the result into the
    /// active engagement.
    ///
    /// Everything is applied in memory and committed with a single save; the
    /// raw output is stored as evidence and linked from each new finding.
    pub fn ingest_file(&self, tool: &str, path: &Path) -> Result<IngestReport> {
        let parser =
            parsers::parser_for(tool).ok_or_else(|| Error::UnsupportedTool(tool.to_string()))?;
        let mut record = self.load_active()?;
        let content = fs::read(path).map_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "cannot read tool output");
            Error::FileNotFound(path.to_path_buf())
        })?;

        let parsed = parser.parse(&String::from_utf8_lossy(&content))?;
        let now = Utc::now();
        let evidence_dir = self.paths().evidence_dir(&record.id);
        let evidence_file = evidence_name(parser.name(), path, now, |name| {
            record.evidence_index.contains_key(name) || evidence_dir.join(name).exists()
        });

        let mut report = IngestReport {
            tool: parser.name().to_string(),
            evidence_file: evidence_file.clone(),
            warnings: parsed.warnings,
            ..Default::default()
        };
        let mut touched = BTreeSet::new();

        for host in parsed.hosts {
            touched.insert(host.ip.clone());
            let outcome = record.discover_host(host, now);
            if outcome.created {
                report.hosts_created += 1;
            }
            report.services_added += outcome.services_added;
        }

        for mut finding in parsed.findings {
            if finding.evidence.is_none() {
                finding.evidence = Some(evidence_file.clone());
            }
            let title = finding.title.clone();
            match record.add_finding(finding, now) {
                Ok(added) => {
                    touched.insert(added.host);
                    report.findings_added += 1;
                }
                Err(e) => report.warnings.push(format!("skipped finding {:?}: {}", title, e)),
            }
        }
        report.hosts_discovered = touched.len();

        let raw = parsed.raw_text.map(String::into_bytes).unwrap_or(content);
        let description = format!("{} output from {}", parser.name(), path.display());
        let (_, staged) =
            self.stage_evidence(&mut record, &evidence_file, &raw, Some(&description), now)?;
        self.save_and_render_with(&mut record, vec![staged])?;
        for ip in &touched {
            self.render_host(&record, ip)?;
        }

        tracing::info!(
            engagement = %record.id,
            tool = %report.tool,
            hosts = report.hosts_discovered,
            services_added = report.services_added,
            findings_added = report.findings_added,
            warnings = report.warnings.len(),
            "tool output ingested"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_evidence_name() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 14, 5, 9).unwrap();
        assert_eq!(
            evidence_name("nmap", Path::new("/tmp/scans/full.txt"), now, |_| false),
            "nmap-20250301T140509-full.txt"
        );
    }

    #[test]
    fn test_evidence_name_avoids_taken_names() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 14, 5, 9).unwrap();
        let taken = ["nmap-20250301T140509-scan.txt", "nmap-20250301T140509-scan-2.txt"];
        assert_eq!(
            evidence_name("nmap", Path::new("b/scan.txt"), now, |n| taken.contains(&n)),
            "nmap-20250301T140509-scan-3.txt"
        );

        let taken = ["nuclei-20250301T140509-results"];
        assert_eq!(
            evidence_name("nuclei", Path::new("results"), now, |n| taken.contains(&n)),
            "nuclei-20250301T140509-results-2"
        );
    }
}
