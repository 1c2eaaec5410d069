//! Nuclei JSON-lines parser
//!
//! Each line of `nuclei -jsonl` output is one match:
//!
//! ```json
//! {"template-id":"smb-signing","info":{"name":"SMB Signing Not Required",
//!  "severity":"medium","classification":{"cvss-score":5.3}},
//!  "host":"10.0.0.5:445","ip":"10.0.0.5","port":"445","matched-at":"10.0.0.5:445"}
//! ```
//!
//! Every match becomes a `potential` finding; scanner output is unverified.
//! Hosts are taken from `ip`, falling back to the host part of `host`.

use crate::error::Result;
use crate::ingest::{ParsedOutput, ToolParser};
use crate::types::{FindingStatus, HostDiscovery, NewFinding, Service, Severity};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct NucleiParser;

impl NucleiParser {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct NucleiMatch {
    #[serde(rename = "template-id", default)]
    template_id: String,
    #[serde(default)]
    info: NucleiInfo,
    #[serde(default)]
    host: String,
    #[serde(default)]
    ip: String,
    /// String or number depending on the nuclei version
    #[serde(default)]
    port: Option<serde_json::Value>,
    #[serde(default)]
    scheme: String,
    #[serde(rename = "matched-at", default)]
    matched_at: String,
}

#[derive(Debug, Default, Deserialize)]
struct NucleiInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    classification: Option<Classification>,
}

#[derive(Debug, Default, Deserialize)]
struct Classification {
    #[serde(rename = "cvss-score", default)]
    cvss_score: Option<f64>,
}

/// Host part of a nuclei target: strips scheme, path, port and IPv6 brackets.
fn host_from_target(target: &str) -> String {
    let rest = target.split_once("://").map_or(target, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if let Some(bracketed) = authority.strip_prefix('[') {
        return bracketed.split(']').next().unwrap_or_default().to_string();
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
            host.to_string()
        }
        _ => authority.to_string(),
    }
}

fn port_number(value: &serde_json::Value) -> Option<u16> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn severity(raw: &str) -> Option<Severity> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "critical" => Some(Severity::Critical),
        "high" => Some(Severity::High),
        "medium" => Some(Severity::Medium),
        "low" => Some(Severity::Low),
        "info" | "informational" => Some(Severity::Info),
        _ => None,
    }
}

impl ToolParser for NucleiParser {
    fn name(&self) -> &'static str {
        "nuclei"
    }

    fn parse(&self, content: &str) -> Result<ParsedOutput> {
        let mut output = ParsedOutput::default();
        let mut hosts: BTreeMap<String, HostDiscovery> = BTreeMap::new();
        let mut host_order: Vec<String> = Vec::new();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let lineno = lineno + 1;

            let m: NucleiMatch = match serde_json::from_str(line) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(line = lineno, error = %e, "skipping malformed nuclei line");
                    output.warnings.push(format!("line {}: {}", lineno, e));
                    continue;
                }
            };

            let ip = if m.ip.trim().is_empty() {
                host_from_target(&m.host)
            } else {
                m.ip.trim().to_string()
            };
            if ip.is_empty() {
                output
                    .warnings
                    .push(format!("line {}: match has no host", lineno));
                continue;
            }

            let title = if m.info.name.trim().is_empty() {
                m.template_id.clone()
            } else {
                m.info.name.trim().to_string()
            };
            if title.is_empty() {
                output
                    .warnings
                    .push(format!("line {}: match has no name or template id", lineno));
                continue;
            }

            let severity = severity(&m.info.severity).unwrap_or_else(|| {
                output.warnings.push(format!(
                    "line {}: unknown severity {:?}, using info",
                    lineno, m.info.severity
                ));
                Severity::Info
            });

            let cvss = match m.info.classification.and_then(|c| c.cvss_score) {
                Some(score) if (0.0..=10.0).contains(&score) => Some(score),
                Some(score) => {
                    output
                        .warnings
                        .push(format!("line {}: dropping out-of-range CVSS {}", lineno, score));
                    None
                }
                None => None,
            };

            let host = hosts.entry(ip.clone()).or_insert_with(|| {
                host_order.push(ip.clone());
                HostDiscovery::new(ip.clone())
            });
            if let Some(port) = m.port.as_ref().and_then(port_number) {
                if !host.services.iter().any(|s| s.port == port) {
                    host.services.push(Service::new(port, "tcp").named(m.scheme.trim()));
                }
            }

            let mut notes = Vec::new();
            if !m.info.description.trim().is_empty() {
                notes.push(m.info.description.trim().to_string());
            }
            if !m.template_id.is_empty() {
                notes.push(format!("Template: {}", m.template_id));
            }
            if !m.matched_at.is_empty() {
                notes.push(format!("Matched at: {}", m.matched_at));
            }

            output.findings.push(NewFinding {
                host: ip,
                title,
                severity,
                cvss,
                status: Some(FindingStatus::Potential),
                evidence: None,
                notes: notes.join("\n"),
            });
        }

        output.hosts = host_order
            .into_iter()
            .filter_map(|ip| hosts.remove(&ip))
            .collect();

        tracing::debug!(
            hosts = output.hosts.len(),
            findings = output.findings.len(),
            warnings = output.warnings.len(),
            "parsed nuclei output"
        );
        Ok(output)
    }
}
