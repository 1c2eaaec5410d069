//! Text output for CLI commands.

use anyhow::{Context, Result};
use pentest_notes_core::{
    CaptureOutcome, EngagementListing, EngagementRecord, EngagementSummary, IngestReport,
};
use serde::Serialize;
use std::path::Path;

/// Print `value` as pretty JSON on stdout.
pub fn json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{}", rendered);
    Ok(())
}

pub fn created(record: &EngagementRecord, report: &Path) {
    println!("Created engagement {}", record.id);
    println!("  Target: {}", record.target);
    if !record.scope.is_empty() {
        println!("  Scope:  {}", record.scope.join(", "));
    }
    println!("  Report: {}", report.display());
}

pub fn listing(listing: &[EngagementListing]) {
    if listing.is_empty() {
        println!("No engagements yet. Create one with `pentest-notes create <target>`.");
        return;
    }

    let id_width = listing
        .iter()
        .map(|l| l.entry.id.len())
        .max()
        .unwrap_or(2)
        .max(2);
    println!(
        "  {:<id_width$}  {:<10}  {:>8}  {:>5}  {:>7}  TARGET",
        "ID", "STATUS", "FINDINGS", "HOSTS", "UPDATED"
    );
    for item in listing {
        let entry = &item.entry;
        println!(
            "{} {:<id_width$}  {:<10}  {:>8}  {:>5}  {:>7}  {}",
            if item.is_current { "*" } else { " " },
            entry.id,
            entry.status.as_str(),
            entry.findings,
            entry.hosts,
            entry.updated_at.format("%m-%d").to_string(),
            entry.target,
        );
    }
}

pub fn status(summary: &EngagementSummary) {
    println!("Engagement: {}", summary.id);
    println!("Target:     {}", summary.target);
    println!("Status:     {}", summary.status);
    println!();

    let findings: Vec<String> = summary
        .findings_by_severity
        .iter()
        .map(|(severity, count)| format!("{} {}", count, severity))
        .collect();
    println!("Findings:     {}", findings.join(", "));
    println!("Hosts:        {}", summary.hosts);
    println!("Credentials:  {}", summary.credentials);
    println!("Evidence:     {}", summary.evidence);
    println!("Commands:     {}", summary.commands);
    println!("Open TODOs:   {}", summary.pending_todos);

    if !summary.recent_attack_path.is_empty() {
        println!();
        println!("Recent attack path:");
        for step in &summary.recent_attack_path {
            println!("  {}. {}", step.step, step.description);
        }
    }
}

pub fn ingest(report: &IngestReport) {
    println!(
        "Ingested {} output: {} host(s) ({} new), {} service(s) added, {} finding(s) added",
        report.tool,
        report.hosts_discovered,
        report.hosts_created,
        report.services_added,
        report.findings_added
    );
    println!("Evidence: {}", report.evidence_file);
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
}

pub fn captured(outcome: &CaptureOutcome) {
    println!("Logged {} ({})", outcome.command.id, outcome.command.tool);
    if let Some(evidence) = &outcome.evidence {
        println!(
            "Evidence: {} ({} bytes)",
            evidence.entry.filename, evidence.entry.size_bytes
        );
    }
    if let Some(report) = &outcome.ingest {
        ingest(report);
    }
    if let Some(reason) = &outcome.ingest_skipped {
        println!("Ingest skipped: {}", reason);
    }
}
