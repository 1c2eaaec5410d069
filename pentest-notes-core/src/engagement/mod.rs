//! In-memory mutation policies for an [`EngagementRecord`].
//!
//! Every method here changes the record only; persisting it is the store's
//! job (see [`crate::store::EngagementStore::save_and_render`]). Timestamps are
//! passed in so the policies are deterministic under test.

pub mod ids;
pub mod merge;

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use ids::{COMMAND_PREFIX, CREDENTIAL_PREFIX, FINDING_PREFIX, TODO_PREFIX};
use merge::{append_text, fill_if_empty, merge_services};
use std::collections::BTreeMap;

/// Number of attack-path steps included in a status summary
pub const RECENT_STEPS: usize = 5;

/// Reject CVSS scores outside [0, 10] (and NaN).
pub fn validate_cvss(cvss: Option<f64>) -> Result<()> {
    match cvss {
        Some(score) if !(0.0..=10.0).contains(&score) => Err(Error::InvalidCvss(score)),
        _ => Ok(()),
    }
}

/// True when `name` is usable as a single path component.
fn is_plain_component(name: &str) -> bool {
    !(name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']))
}

/// Reject evidence names that could resolve outside the evidence directory.
pub fn validate_evidence_filename(filename: &str) -> Result<()> {
    if !is_plain_component(filename) {
        return Err(Error::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Reject engagement ids that could resolve outside `engagements/`.
pub fn validate_engagement_id(id: &str) -> Result<()> {
    if !is_plain_component(id) {
        return Err(Error::InvalidEngagementId(id.to_string()));
    }
    Ok(())
}

impl EngagementRecord {
    /// A fresh, empty, active engagement.
    pub fn new(
        id: impl Into<String>,
        target: impl Into<String>,
        scope: Vec<String>,
        rules_of_engagement: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            id: id.into(),
            target: target.into(),
            scope,
            rules_of_engagement: rules_of_engagement.into(),
            status: EngagementStatus::Active,
            created_at: now,
            updated_at: now,
            executive_summary: String::new(),
            attack_path: Vec::new(),
            findings: BTreeMap::new(),
            hosts: BTreeMap::new(),
            credentials: Vec::new(),
            dead_ends: Vec::new(),
            todos: Vec::new(),
            evidence_index: BTreeMap::new(),
            command_log: Vec::new(),
        }
    }

    /// Create the host or merge into it additively.
    pub fn discover_host(&mut self, discovery: HostDiscovery, now: DateTime<Utc>) -> HostDiscoveryOutcome {
        let HostDiscovery {
            ip,
            hostname,
            os,
            services,
        } = discovery;

        match self.hosts.get_mut(&ip) {
            Some(host) => {
                fill_if_empty(&mut host.hostname, hostname.as_deref());
                fill_if_empty(&mut host.os, os.as_deref());
                let stats = merge_services(&mut host.services, services);
                host.updated_at = now;
                HostDiscoveryOutcome {
                    created: false,
                    services_added: stats.added,
                    services_updated: stats.updated,
                }
            }
            None => {
                let mut host = Host {
                    ip: ip.clone(),
                    hostname: hostname.unwrap_or_default(),
                    os: os.unwrap_or_default(),
                    first_seen: now,
                    updated_at: now,
                    services: Vec::new(),
                    sections: HostSections::default(),
                };
                let stats = merge_services(&mut host.services, services);
                self.hosts.insert(ip, host);
                HostDiscoveryOutcome {
                    created: true,
                    services_added: stats.added,
                    services_updated: stats.updated,
                }
            }
        }
    }

    /// Append `text` to one narrative section of a known host.
    pub fn update_host_section(
        &mut self,
        ip: &str,
        section: HostSection,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Host> {
        let host = self
            .hosts
            .get_mut(ip)
            .ok_or_else(|| Error::HostNotFound(ip.to_string()))?;
        let slot = host.sections.get_mut(section);
        *slot = append_text(slot, text);
        host.updated_at = now;
        Ok(host.clone())
    }

    pub fn next_finding_id(&self) -> String {
        ids::next_sequential_id(FINDING_PREFIX, self.findings.keys().map(String::as_str))
    }

    pub fn add_finding(&mut self, new: NewFinding, now: DateTime<Utc>) -> Result<Finding> {
        validate_cvss(new.cvss)?;
        let finding = Finding {
            id: self.next_finding_id(),
            host: new.host,
            title: new.title,
            severity: new.severity,
            cvss: new.cvss,
            status: new.status.unwrap_or_default(),
            evidence: new.evidence,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        self.findings.insert(finding.id.clone(), finding.clone());
        Ok(finding)
    }

    /// Overwrite supplied fields; notes are appended.
    pub fn update_finding(&mut self, id: &str, update: FindingUpdate, now: DateTime<Utc>) -> Result<Finding> {
        let finding = self
            .findings
            .get_mut(id)
            .ok_or_else(|| Error::FindingNotFound(id.to_string()))?;
        validate_cvss(update.cvss)?;

        if let Some(title) = update.title {
            finding.title = title;
        }
        if let Some(severity) = update.severity {
            finding.severity = severity;
        }
        if let Some(cvss) = update.cvss {
            finding.cvss = Some(cvss);
        }
        if let Some(status) = update.status {
            finding.status = status;
        }
        if let Some(evidence) = update.evidence {
            finding.evidence = Some(evidence);
        }
        if let Some(notes) = update.notes {
            finding.notes = append_text(&finding.notes, &notes);
        }
        finding.updated_at = now;
        Ok(finding.clone())
    }

    pub fn add_credential(&mut self, new: NewCredential, now: DateTime<Utc>) -> Credential {
        let credential = Credential {
            id: ids::next_sequential_id(
                CREDENTIAL_PREFIX,
                self.credentials.iter().map(|c| c.id.as_str()),
            ),
            username: new.username,
            secret: new.secret.unwrap_or_default(),
            credential_type: new.credential_type.unwrap_or_default(),
            host: new.host.unwrap_or_default(),
            service: new.service.unwrap_or_default(),
            source: new.source.unwrap_or_default(),
            verified: new.verified.unwrap_or(false),
            created_at: now,
        };
        self.credentials.push(credential.clone());
        credential
    }

    /// Insert or replace the evidence entry for `entry.filename`.
    ///
    /// Returns whether an entry of that name already existed.
    pub fn record_evidence(&mut self, entry: EvidenceEntry) -> bool {
        self.evidence_index
            .insert(entry.filename.clone(), entry)
            .is_some()
    }

    pub fn add_attack_step(&mut self, description: impl Into<String>, now: DateTime<Utc>) -> AttackStep {
        let step = AttackStep {
            step: self.attack_path.len() as u32 + 1,
            description: description.into(),
            timestamp: now,
        };
        self.attack_path.push(step.clone());
        step
    }

    pub fn set_executive_summary(&mut self, summary: impl Into<String>) {
        self.executive_summary = summary.into();
    }

    pub fn log_dead_end(
        &mut self,
        technique: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DeadEnd {
        let dead_end = DeadEnd {
            timestamp: now,
            technique: technique.into(),
            target: target.into(),
            reason: reason.into(),
        };
        self.dead_ends.push(dead_end.clone());
        dead_end
    }

    pub fn add_todo(
        &mut self,
        description: impl Into<String>,
        priority: Option<TodoPriority>,
        now: DateTime<Utc>,
    ) -> Todo {
        let todo = Todo {
            id: ids::next_sequential_id(TODO_PREFIX, self.todos.iter().map(|t| t.id.as_str())),
            description: description.into(),
            priority: priority.unwrap_or_default(),
            status: TodoStatus::Pending,
            created_at: now,
            completed_at: None,
        };
        self.todos.push(todo.clone());
        todo
    }

    /// Mark a TODO completed. Completing it again changes nothing.
    pub fn complete_todo(&mut self, id: &str, now: DateTime<Utc>) -> Result<TodoCompletion> {
        let todo = self
            .todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::TodoNotFound(id.to_string()))?;

        let already_completed = todo.status == TodoStatus::Completed;
        if !already_completed {
            todo.status = TodoStatus::Completed;
            todo.completed_at = Some(now);
        }
        Ok(TodoCompletion {
            todo: todo.clone(),
            already_completed,
        })
    }

    pub fn next_command_id(&self) -> String {
        ids::next_sequential_id(
            COMMAND_PREFIX,
            self.command_log.iter().map(|c| c.id.as_str()),
        )
    }

    pub fn log_command(&mut self, new: NewCommand, now: DateTime<Utc>) -> CommandEntry {
        let tool = new
            .tool
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| ids::derive_tool_name(&new.command));
        let entry = CommandEntry {
            id: self.next_command_id(),
            command: new.command,
            tool,
            target: new.target.unwrap_or_default(),
            started_at: new.started_at.unwrap_or(now),
            duration_ms: new.duration_ms,
            exit_code: new.exit_code,
            evidence: new.evidence,
            source: new.source,
            logged_at: now,
        };
        self.command_log.push(entry.clone());
        entry
    }

    pub fn pending_todos(&self) -> usize {
        self.todos
            .iter()
            .filter(|t| t.status == TodoStatus::Pending)
            .count()
    }

    pub fn summary(&self) -> EngagementSummary {
        let mut findings_by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for finding in self.findings.values() {
            *findings_by_severity.entry(finding.severity).or_default() += 1;
        }

        let recent_start = self.attack_path.len().saturating_sub(RECENT_STEPS);
        EngagementSummary {
            id: self.id.clone(),
            target: self.target.clone(),
            status: self.status,
            findings_by_severity,
            hosts: self.hosts.len(),
            credentials: self.credentials.len(),
            evidence: self.evidence_index.len(),
            commands: self.command_log.len(),
            pending_todos: self.pending_todos(),
            recent_attack_path: self.attack_path[recent_start..].to_vec(),
        }
    }

    /// Findings ordered by severity, then numeric id.
    pub fn findings_by_severity(&self) -> Vec<&Finding> {
        let mut findings: Vec<&Finding> = self.findings.values().collect();
        findings.sort_by_key(|f| (f.severity, f.id.len(), f.id.clone()));
        findings
    }
}
