//! Markdown report renderer.

use super::Renderer;
use crate::storage::host_report_name;
use crate::types::{
    EngagementRecord, Finding, Host, HostSection, Severity, TodoStatus,
};
use chrono::{DateTime, Utc};

const EMPTY: &str = "_None recorded._";

/// Renders GitHub-flavoured Markdown reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self
    }
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Make a value safe for a single table cell.
fn cell(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return "-".to_string();
    }
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn paragraph(text: &str) -> String {
    if text.trim().is_empty() {
        EMPTY.to_string()
    } else {
        text.trim_end().to_string()
    }
}

/// Lines of a Markdown document, joined with `\n` at the end.
#[derive(Default)]
struct Doc {
    lines: Vec<String>,
}

impl Doc {
    fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }

    fn heading(&mut self, level: usize, title: &str) {
        if !self.lines.is_empty() {
            self.blank();
        }
        self.line(format!("{} {}", "#".repeat(level), title));
        self.blank();
    }

    fn table(&mut self, header: &[&str], rows: Vec<Vec<String>>) {
        if rows.is_empty() {
            self.line(EMPTY);
            return;
        }
        self.line(format!("| {} |", header.join(" | ")));
        self.line(format!(
            "|{}|",
            header.iter().map(|_| "---").collect::<Vec<_>>().join("|")
        ));
        for row in rows {
            self.line(format!("| {} |", row.join(" | ")));
        }
    }

    fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

fn write_finding(doc: &mut Doc, finding: &Finding) {
    doc.heading(
        3,
        &format!(
            "{}: {} [{}]",
            finding.id,
            finding.title,
            finding.severity.as_str().to_uppercase()
        ),
    );
    doc.line(format!("- **Host:** {}", cell(&finding.host)));
    if let Some(cvss) = finding.cvss {
        doc.line(format!("- **CVSS:** {:.1}", cvss));
    }
    doc.line(format!("- **Status:** {}", finding.status));
    if let Some(evidence) = &finding.evidence {
        doc.line(format!("- **Evidence:** `{}`", evidence));
    }
    doc.line(format!("- **Updated:** {}", timestamp(finding.updated_at)));
    if !finding.notes.trim().is_empty() {
        doc.blank();
        doc.line(finding.notes.trim_end());
    }
}

impl Renderer for MarkdownRenderer {
    fn render_engagement(&self, record: &EngagementRecord) -> String {
        let mut doc = Doc::default();

        doc.heading(1, &format!("Penetration Test Report: {}", record.target));
        doc.line(format!("- **Engagement ID:** {}", record.id));
        doc.line(format!("- **Status:** {}", record.status));
        doc.line(format!("- **Created:** {}", timestamp(record.created_at)));
        doc.line(format!("- **Last Updated:** {}", timestamp(record.updated_at)));

        doc.heading(2, "Scope");
        if record.scope.is_empty() {
            doc.line(EMPTY);
        }
        for item in &record.scope {
            doc.line(format!("- {}", item));
        }

        doc.heading(2, "Rules of Engagement");
        doc.line(paragraph(&record.rules_of_engagement));

        doc.heading(2, "Executive Summary");
        doc.line(paragraph(&record.executive_summary));

        doc.heading(2, "Findings Summary");
        let summary = record.summary();
        doc.table(
            &["Severity", "Count"],
            Severity::ALL
                .iter()
                .map(|s| {
                    vec![
                        s.as_str().to_string(),
                        summary.findings_by_severity.get(s).copied().unwrap_or(0).to_string(),
                    ]
                })
                .collect(),
        );

        doc.heading(2, "Findings");
        let findings = record.findings_by_severity();
        if findings.is_empty() {
            doc.line(EMPTY);
        }
        for finding in findings {
            write_finding(&mut doc, finding);
        }

        doc.heading(2, "Hosts");
        doc.table(
            &["IP", "Hostname", "OS", "Services", "Report"],
            record
                .hosts
                .values()
                .map(|host| {
                    vec![
                        cell(&host.ip),
                        cell(&host.hostname),
                        cell(&host.os),
                        host.services.len().to_string(),
                        format!("[notes](hosts/{})", host_report_name(&host.ip)),
                    ]
                })
                .collect(),
        );

        doc.heading(2, "Attack Path");
        if record.attack_path.is_empty() {
            doc.line(EMPTY);
        }
        for step in &record.attack_path {
            doc.line(format!(
                "{}. {} _({})_",
                step.step,
                step.description.trim(),
                timestamp(step.timestamp)
            ));
        }

        doc.heading(2, "Credentials");
        doc.table(
            &["ID", "Username", "Type", "Host", "Service", "Source", "Verified"],
            record
                .credentials
                .iter()
                .map(|c| {
                    vec![
                        c.id.clone(),
                        cell(&c.username),
                        cell(&c.credential_type),
                        cell(&c.host),
                        cell(&c.service),
                        cell(&c.source),
                        if c.verified { "yes" } else { "no" }.to_string(),
                    ]
                })
                .collect(),
        );

        doc.heading(2, "TODOs");
        if record.todos.is_empty() {
            doc.line(EMPTY);
        }
        for todo in &record.todos {
            let mark = match todo.status {
                TodoStatus::Completed => "x",
                TodoStatus::Pending => " ",
            };
            doc.line(format!(
                "- [{}] {} ({}) {}",
                mark,
                todo.id,
                todo.priority,
                todo.description.trim()
            ));
        }

        doc.heading(2, "Dead Ends");
        doc.table(
            &["Time", "Technique", "Target", "Reason"],
            record
                .dead_ends
                .iter()
                .map(|d| {
                    vec![
                        timestamp(d.timestamp),
                        cell(&d.technique),
                        cell(&d.target),
                        cell(&d.reason),
                    ]
                })
                .collect(),
        );

        doc.heading(2, "Evidence");
        doc.table(
            &["File", "Description", "Size", "SHA-256"],
            record
                .evidence_index
                .values()
                .map(|e| {
                    vec![
                        format!("`{}`", e.filename),
                        cell(&e.description),
                        format!("{} B", e.size_bytes),
                        format!("`{}`", e.sha256),
                    ]
                })
                .collect(),
        );

        doc.heading(2, "Command Log");
        doc.table(
            &["ID", "Started", "Tool", "Command", "Exit", "Evidence"],
            record
                .command_log
                .iter()
                .map(|c| {
                    vec![
                        c.id.clone(),
                        timestamp(c.started_at),
                        cell(&c.tool),
                        format!("`{}`", cell(&c.command)),
                        c.exit_code.map(|code| code.to_string()).unwrap_or_else(|| "-".into()),
                        c.evidence.as_deref().map(cell).unwrap_or_else(|| "-".into()),
                    ]
                })
                .collect(),
        );

        doc.finish()
    }

    fn render_host(&self, record: &EngagementRecord, host: &Host) -> String {
        let mut doc = Doc::default();

        let title = if host.hostname.is_empty() {
            format!("Host: {}", host.ip)
        } else {
            format!("Host: {} ({})", host.ip, host.hostname)
        };
        doc.heading(1, &title);
        doc.line(format!("- **Engagement:** {}", record.id));
        doc.line(format!("- **OS:** {}", cell(&host.os)));
        doc.line(format!("- **First Seen:** {}", timestamp(host.first_seen)));
        doc.line(format!("- **Last Updated:** {}", timestamp(host.updated_at)));

        doc.heading(2, "Services");
        doc.table(
            &["Port", "Protocol", "Service", "Version", "Notes"],
            host.services
                .iter()
                .map(|s| {
                    vec![
                        s.port.to_string(),
                        s.protocol.clone(),
                        cell(&s.service),
                        cell(&s.version),
                        cell(&s.notes),
                    ]
                })
                .collect(),
        );

        doc.heading(2, "Findings");
        let findings: Vec<&Finding> = record
            .findings_by_severity()
            .into_iter()
            .filter(|f| f.host == host.ip)
            .collect();
        doc.table(
            &["ID", "Severity", "Title", "Status"],
            findings
                .iter()
                .map(|f| {
                    vec![
                        f.id.clone(),
                        f.severity.to_string(),
                        cell(&f.title),
                        f.status.to_string(),
                    ]
                })
                .collect(),
        );

        for section in HostSection::ALL {
            doc.heading(2, section.title());
            doc.line(paragraph(host.sections.get(section)));
        }

        doc.finish()
    }
}
