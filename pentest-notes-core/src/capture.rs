//! Command capture: the log-wrapper path.
//!
//! A wrapper runs a command, then hands over the command line, its exit
//! status and a file with its output. The output is kept as evidence, a
//! command-log entry links to it, and, when asked, the output is ingested
//! with the tool's parser.

use crate::engagement::ids;
use crate::error::{Error, Result};
use crate::ingest::{parsers, IngestReport};
use crate::store::EngagementStore;
use crate::types::{CommandEntry, CommandSource, EvidenceSaved, NewCommand};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

/// A finished command as reported by a wrapper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandCapture {
    pub command: String,
    /// Derived from the command line when absent
    pub tool: Option<String>,
    pub target: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub exit_code: Option<i32>,
    /// File holding the captured output
    pub output: Option<PathBuf>,
    /// Defaults to [`CommandSource::LogWrapper`]
    pub source: Option<CommandSource>,
    /// Feed the output through the tool's parser afterwards
    pub ingest: bool,
}

impl CommandCapture {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }
}

/// What a capture recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureOutcome {
    pub command: CommandEntry,
    pub evidence: Option<EvidenceSaved>,
    pub ingest: Option<IngestReport>,
    /// Why a requested ingestion did not run or did not finish
    pub ingest_skipped: Option<String>,
}

/// Evidence name for captured output: `<command id>-<tool>.log`.
fn output_evidence_name(command_id: &str, tool: &str) -> String {
    let tool = ids::slugify(tool, ids::MAX_SLUG_LEN);
    let tool = if tool.is_empty() { "output" } else { &tool };
    format!("{}-{}.log", command_id.to_lowercase(), tool)
}

impl EngagementStore {
    /// Record a wrapped command and its output in the active engagement.
    pub fn capture_command(&self, capture: CommandCapture) -> Result<CaptureOutcome> {
        let mut record = self.load_active()?;
        let output = match &capture.output {
            Some(path) => Some((
                path.clone(),
                fs::read(path).map_err(|_| Error::FileNotFound(path.clone()))?,
            )),
            None => None,
        };

        let now = Utc::now();
        let tool = capture
            .tool
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| ids::derive_tool_name(&capture.command));
        let command_id = record.next_command_id();

        let mut staged = Vec::new();
        let evidence = match &output {
            Some((path, content)) => {
                let filename = output_evidence_name(&command_id, &tool);
                let description = format!("output of {} ({})", command_id, path.display());
                let (saved, file) =
                    self.stage_evidence(&mut record, &filename, content, Some(&description), now)?;
                staged.push(file);
                Some(saved)
            }
            None => None,
        };

        let entry = record.log_command(
            NewCommand {
                command: capture.command,
                tool: Some(tool.clone()),
                target: capture.target,
                started_at: capture.started_at,
                duration_ms: capture.duration_ms,
                exit_code: capture.exit_code,
                evidence: evidence.as_ref().map(|e| e.entry.filename.clone()),
                source: capture.source.unwrap_or(CommandSource::LogWrapper),
            },
            now,
        );
        self.save_and_render_with(&mut record, staged)?;
        tracing::info!(
            engagement = %record.id,
            command = %entry.id,
            tool = %entry.tool,
            evidence = evidence.is_some(),
            "command captured"
        );

        let mut outcome = CaptureOutcome {
            command: entry,
            evidence,
            ingest: None,
            ingest_skipped: None,
        };
        if !capture.ingest {
            return Ok(outcome);
        }

        match (&output, parsers::parser_for(&tool)) {
            (None, _) => outcome.ingest_skipped = Some("no output captured".to_string()),
            (Some(_), None) => {
                tracing::debug!(tool = %tool, "no parser for captured tool, skipping ingest");
                outcome.ingest_skipped = Some(format!("no parser for tool '{}'", tool));
            }
            (Some((path, _)), Some(_)) => match self.ingest_file(&tool, path) {
                Ok(report) => outcome.ingest = Some(report),
                // The command is already logged; a parse failure only loses the ingest
                Err(e) => {
                    tracing::warn!(
                        command = %outcome.command.id,
                        tool = %tool,
                        error = %e,
                        "ingest of captured output failed"
                    );
                    outcome.ingest_skipped = Some(format!("ingest failed: {}", e));
                }
            },
        }
        Ok(outcome)
    }
}
