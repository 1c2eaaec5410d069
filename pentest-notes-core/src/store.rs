//! Engagement store: lifecycle and persistence of engagements.
//!
//! [`EngagementStore`] is the explicit context every operation runs against.
//! It owns the storage layout, the index lock policy and the renderer.
//!
//! Each mutating operation follows the same path:
//!
//! ```text
//! require active -> load record -> mutate in memory -> save_and_render
//!                                                        |
//!                      write engagement.json (atomic) <--+
//!                      upsert index entry (locked)
//!                      render REPORT.md (and touched host reports)
//! ```
//!
//! A mutation is committed once `engagement.json` is renamed into place. A
//! crash after that but before the index upsert leaves a stale index entry;
//! [`EngagementStore::reconcile_index`] repairs it.

use crate::config::Config;
use crate::engagement::{ids, validate_engagement_id, validate_evidence_filename};
use crate::error::{Error, Result};
use crate::render::{MarkdownRenderer, Renderer};
use crate::storage::{
    atomic_write, read_json, stage_write, write_json, EngagementIndex, GlobalState, LockOptions,
    StagedWrite, StoragePaths,
};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of [`EngagementStore::reconcile_index`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Index entries rewritten from a detail record
    pub refreshed: usize,
    /// Index entries dropped because their record is gone
    pub removed: Vec<String>,
    /// Records that could not be read
    pub skipped: Vec<PathBuf>,
}

/// Persistence and consistency layer for engagements.
pub struct EngagementStore {
    paths: StoragePaths,
    state: GlobalState,
    index: EngagementIndex,
    renderer: Box<dyn Renderer>,
}

impl std::fmt::Debug for EngagementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngagementStore")
            .field("root", &self.paths.root())
            .finish_non_exhaustive()
    }
}

impl EngagementStore {
    pub fn new(paths: StoragePaths, lock_options: LockOptions, renderer: Box<dyn Renderer>) -> Self {
        let state = GlobalState::new(paths.state_file());
        let index = EngagementIndex::new(paths.index_file(), paths.lock_file(), lock_options);
        Self {
            paths,
            state,
            index,
            renderer,
        }
    }

    /// Store at the configured root with the configured lock policy.
    pub fn open(config: &Config) -> Self {
        let root = config.storage_root();
        tracing::debug!(root = %root.display(), "opening engagement store");
        Self::new(
            StoragePaths::new(root),
            config.lock.options(),
            Box::new(MarkdownRenderer::new()),
        )
    }

    /// Store at `root` with default lock policy and Markdown reports.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::new(
            StoragePaths::new(root),
            LockOptions::default(),
            Box::new(MarkdownRenderer::new()),
        )
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn index(&self) -> &EngagementIndex {
        &self.index
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    // ============================================
    // Lifecycle
    // ============================================

    /// Create an engagement, make it active and render its first report.
    pub fn create_engagement(
        &self,
        target: &str,
        scope: Vec<String>,
        rules_of_engagement: &str,
    ) -> Result<EngagementRecord> {
        let now = Utc::now();
        let base = ids::engagement_id_candidate(now.date_naive(), target);
        let id = self.allocate_id(&base)?;

        fs::create_dir_all(self.paths.engagement_dir(&id))?;
        let record = EngagementRecord::new(&id, target, scope, rules_of_engagement, now);
        self.persist(&record)?;
        self.state.set_active_engagement(&id)?;
        self.render_report(&record)?;

        tracing::info!(engagement = %id, target = %target, "engagement created");
        Ok(record)
    }

    /// First unused id among `base`, `base-2`, `base-3`, ...
    fn allocate_id(&self, base: &str) -> Result<String> {
        let taken: BTreeSet<String> = self.index.load()?.into_iter().map(|e| e.id).collect();
        let mut n = 1;
        loop {
            let candidate = ids::with_collision_suffix(base, n);
            if !taken.contains(&candidate) && !self.paths.engagement_dir(&candidate).exists() {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Every indexed engagement, flagged if it is the active one.
    pub fn list_engagements(&self) -> Result<Vec<EngagementListing>> {
        let active = self.state.active_engagement_id()?;
        Ok(self
            .index
            .load()?
            .into_iter()
            .map(|entry| EngagementListing {
                is_current: active.as_deref() == Some(entry.id.as_str()),
                entry,
            })
            .collect())
    }

    /// Make `id` active again. Returns the record and its open TODO count.
    ///
    /// The engagement's status is left as it is.
    pub fn resume_engagement(&self, id: &str) -> Result<(EngagementRecord, usize)> {
        let record = self.load_engagement(id)?;
        self.state.set_active_engagement(id)?;
        let open_todos = record.pending_todos();
        tracing::info!(engagement = id, open_todos, "engagement resumed");
        Ok((record, open_todos))
    }

    pub fn engagement_status(&self) -> Result<EngagementSummary> {
        Ok(self.load_active()?.summary())
    }

    /// Close the active engagement and clear the active pointer.
    pub fn close_engagement(
        &self,
        status: CloseStatus,
        executive_summary: Option<&str>,
    ) -> Result<CloseOutcome> {
        let mut record = self.load_active()?;
        record.status = status.into();
        if let Some(summary) = executive_summary {
            record.set_executive_summary(summary);
        }
        record.updated_at = Utc::now();
        self.persist(&record)?;
        self.state.clear_active_engagement()?;
        self.render_report(&record)?;
        self.render_all_hosts(&record)?;

        tracing::info!(engagement = %record.id, status = %record.status, "engagement closed");
        Ok(CloseOutcome {
            id: record.id,
            status: record.status,
        })
    }

    // ============================================
    // Loading and committing
    // ============================================

    /// Read a detail record, or [`Error::EngagementNotFound`].
    ///
    /// Ids that are not a single path component are rejected before any
    /// file is touched.
    pub fn load_engagement(&self, id: &str) -> Result<EngagementRecord> {
        validate_engagement_id(id)?;
        let path = self.paths.record_file(id);
        read_json::<Option<EngagementRecord>>(&path, None)?
            .ok_or_else(|| Error::EngagementNotFound(id.to_string()))
    }

    pub fn load_active(&self) -> Result<EngagementRecord> {
        let id = self.state.require_active_engagement()?;
        self.load_engagement(&id)
    }

    /// Commit `record`: stamp it, write it, update the index, render it.
    pub fn save_and_render(&self, record: &mut EngagementRecord) -> Result<()> {
        self.save_and_render_with(record, Vec::new())
    }

    /// [`save_and_render`](Self::save_and_render) that also moves `staged`
    /// evidence files into place once the detail record is written.
    pub(crate) fn save_and_render_with(
        &self,
        record: &mut EngagementRecord,
        staged: Vec<StagedWrite>,
    ) -> Result<()> {
        record.updated_at = Utc::now();
        self.persist_with(record, staged)?;
        self.render_report(record)
    }

    fn persist(&self, record: &EngagementRecord) -> Result<()> {
        self.persist_with(record, Vec::new())
    }

    /// Detail write, staged files, then index upsert.
    ///
    /// Nothing after the detail write runs if it fails, so staged files are
    /// discarded and the evidence on disk keeps matching the stored hashes.
    fn persist_with(&self, record: &EngagementRecord, staged: Vec<StagedWrite>) -> Result<()> {
        write_json(&self.paths.record_file(&record.id), record)?;
        for file in staged {
            file.commit()?;
        }
        self.index.upsert(IndexEntry::from(record))?;
        tracing::debug!(engagement = %record.id, "record persisted");
        Ok(())
    }

    fn render_report(&self, record: &EngagementRecord) -> Result<()> {
        let report = self.renderer.render_engagement(record);
        atomic_write(&self.paths.report_file(&record.id), report.as_bytes())
    }

    /// Re-render one host's report. Unknown hosts are ignored.
    pub fn render_host(&self, record: &EngagementRecord, ip: &str) -> Result<()> {
        let Some(host) = record.hosts.get(ip) else {
            return Ok(());
        };
        fs::create_dir_all(self.paths.hosts_dir(&record.id))?;
        let report = self.renderer.render_host(record, host);
        atomic_write(
            &self.paths.host_report_file(&record.id, ip),
            report.as_bytes(),
        )
    }

    pub fn render_all_hosts(&self, record: &EngagementRecord) -> Result<()> {
        for ip in record.hosts.keys() {
            self.render_host(record, ip)?;
        }
        Ok(())
    }

    /// Load the active record, apply `mutation`, commit.
    fn mutate_active<T>(
        &self,
        mutation: impl FnOnce(&mut EngagementRecord, DateTime<Utc>) -> Result<T>,
    ) -> Result<(EngagementRecord, T)> {
        let mut record = self.load_active()?;
        let value = mutation(&mut record, Utc::now())?;
        self.save_and_render(&mut record)?;
        Ok((record, value))
    }

    // ============================================
    // Hosts and findings
    // ============================================

    pub fn discover_host(&self, discovery: HostDiscovery) -> Result<HostDiscoveryOutcome> {
        let ip = discovery.ip.clone();
        let (record, outcome) =
            self.mutate_active(|record, now| Ok(record.discover_host(discovery, now)))?;
        self.render_host(&record, &ip)?;

        tracing::info!(
            engagement = %record.id,
            host = %ip,
            created = outcome.created,
            services_added = outcome.services_added,
            services_updated = outcome.services_updated,
            "host discovered"
        );
        Ok(outcome)
    }

    pub fn update_host_section(&self, ip: &str, section: HostSection, text: &str) -> Result<Host> {
        let (record, host) =
            self.mutate_active(|record, now| record.update_host_section(ip, section, text, now))?;
        self.render_host(&record, ip)?;
        tracing::info!(engagement = %record.id, host = ip, section = %section, "host section updated");
        Ok(host)
    }

    pub fn add_finding(&self, finding: NewFinding) -> Result<Finding> {
        let (record, finding) = self.mutate_active(|record, now| record.add_finding(finding, now))?;
        self.render_host(&record, &finding.host)?;
        tracing::info!(
            engagement = %record.id,
            finding = %finding.id,
            severity = %finding.severity,
            "finding added"
        );
        Ok(finding)
    }

    pub fn update_finding(&self, id: &str, update: FindingUpdate) -> Result<Finding> {
        let (record, finding) =
            self.mutate_active(|record, now| record.update_finding(id, update, now))?;
        self.render_host(&record, &finding.host)?;
        tracing::info!(engagement = %record.id, finding = id, "finding updated");
        Ok(finding)
    }

    // ============================================
    // Credentials, evidence, narrative
    // ============================================

    pub fn add_credential(&self, credential: NewCredential) -> Result<Credential> {
        let (record, credential) =
            self.mutate_active(|record, now| Ok(record.add_credential(credential, now)))?;
        tracing::info!(engagement = %record.id, credential = %credential.id, "credential added");
        Ok(credential)
    }

    /// Save `content` as `evidence/<filename>` and index it.
    pub fn save_evidence(
        &self,
        filename: &str,
        content: &[u8],
        description: Option<&str>,
    ) -> Result<EvidenceSaved> {
        validate_evidence_filename(filename)?;
        let mut record = self.load_active()?;
        let (saved, staged) =
            self.stage_evidence(&mut record, filename, content, description, Utc::now())?;
        self.save_and_render_with(&mut record, vec![staged])?;
        tracing::info!(
            engagement = %record.id,
            file = filename,
            bytes = content.len(),
            overwritten = saved.overwritten,
            "evidence saved"
        );
        Ok(saved)
    }

    /// Stage an evidence file and record it on `record` without committing.
    ///
    /// The file only replaces `evidence/<filename>` when the returned
    /// [`StagedWrite`] is passed to [`save_and_render_with`](Self::save_and_render_with).
    pub(crate) fn stage_evidence(
        &self,
        record: &mut EngagementRecord,
        filename: &str,
        content: &[u8],
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(EvidenceSaved, StagedWrite)> {
        validate_evidence_filename(filename)?;
        let dir = self.paths.evidence_dir(&record.id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(filename);
        let overwritten = path.exists();
        let staged = stage_write(&path, content)?;

        let entry = EvidenceEntry {
            filename: filename.to_string(),
            description: description.unwrap_or_default().to_string(),
            size_bytes: content.len() as u64,
            sha256: sha256_hex(content),
            saved_at: now,
        };
        record.record_evidence(entry.clone());
        Ok((
            EvidenceSaved {
                entry,
                path,
                overwritten,
            },
            staged,
        ))
    }

    pub fn add_attack_step(&self, description: &str) -> Result<AttackStep> {
        let (record, step) =
            self.mutate_active(|record, now| Ok(record.add_attack_step(description, now)))?;
        tracing::info!(engagement = %record.id, step = step.step, "attack step added");
        Ok(step)
    }

    pub fn set_executive_summary(&self, summary: &str) -> Result<()> {
        let (record, ()) = self.mutate_active(|record, _| {
            record.set_executive_summary(summary);
            Ok(())
        })?;
        tracing::info!(engagement = %record.id, "executive summary set");
        Ok(())
    }

    pub fn log_dead_end(&self, technique: &str, target: &str, reason: &str) -> Result<DeadEnd> {
        let (record, dead_end) = self
            .mutate_active(|record, now| Ok(record.log_dead_end(technique, target, reason, now)))?;
        tracing::info!(engagement = %record.id, technique, "dead end logged");
        Ok(dead_end)
    }

    pub fn add_todo(&self, description: &str, priority: Option<TodoPriority>) -> Result<Todo> {
        let (record, todo) =
            self.mutate_active(|record, now| Ok(record.add_todo(description, priority, now)))?;
        tracing::info!(engagement = %record.id, todo = %todo.id, "todo added");
        Ok(todo)
    }

    /// Complete a TODO. An already-completed TODO is reported, not rewritten.
    pub fn complete_todo(&self, id: &str) -> Result<TodoCompletion> {
        let mut record = self.load_active()?;
        let completion = record.complete_todo(id, Utc::now())?;
        if completion.already_completed {
            tracing::debug!(engagement = %record.id, todo = id, "todo already completed");
            return Ok(completion);
        }
        self.save_and_render(&mut record)?;
        tracing::info!(engagement = %record.id, todo = id, "todo completed");
        Ok(completion)
    }

    pub fn log_command(&self, command: NewCommand) -> Result<CommandEntry> {
        let (record, entry) =
            self.mutate_active(|record, now| Ok(record.log_command(command, now)))?;
        tracing::info!(
            engagement = %record.id,
            command = %entry.id,
            tool = %entry.tool,
            "command logged"
        );
        Ok(entry)
    }

    // ============================================
    // Repair
    // ============================================

    /// Rebuild index entries from the detail records on disk.
    ///
    /// Every readable record gets a fresh entry; entries without a record are
    /// removed. Unreadable records are skipped and reported.
    pub fn reconcile_index(&self) -> Result<ReconcileReport> {
        let pattern = self.paths.record_glob();
        let entries = glob::glob(&pattern)
            .map_err(|e| Error::Config(format!("invalid storage path pattern: {}", e)))?;

        let mut report = ReconcileReport::default();
        let mut live = BTreeSet::new();
        for path in entries.flatten() {
            match read_record(&path) {
                Ok(record) => {
                    self.index.upsert(IndexEntry::from(&record))?;
                    live.insert(record.id);
                    report.refreshed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                    report.skipped.push(path);
                }
            }
        }

        for entry in self.index.load()? {
            let unreadable = report
                .skipped
                .iter()
                .any(|p| p.starts_with(self.paths.engagement_dir(&entry.id)));
            if !live.contains(&entry.id) && !unreadable && self.index.remove(&entry.id)? {
                report.removed.push(entry.id);
            }
        }

        tracing::info!(
            refreshed = report.refreshed,
            removed = report.removed.len(),
            skipped = report.skipped.len(),
            "index reconciled"
        );
        Ok(report)
    }
}

fn read_record(path: &Path) -> Result<EngagementRecord> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Lowercase hex SHA-256 of `content`.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> EngagementStore {
        EngagementStore::with_root(dir.path())
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_create_sets_active_and_writes_layout() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let record = store
            .create_engagement("Test Corp", vec!["10.0.0.0/24".into()], "no DoS")
            .unwrap();

        assert!(record.id.ends_with("-test-corp"));
        assert_eq!(store.state().active_engagement_id().unwrap(), Some(record.id.clone()));
        assert!(store.paths().record_file(&record.id).exists());
        assert!(store.paths().report_file(&record.id).exists());
        assert_eq!(store.index().load().unwrap().len(), 1);
        assert_eq!(store.load_active().unwrap(), record);
    }

    #[test]
    fn test_operations_require_active_engagement() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(matches!(store.engagement_status(), Err(Error::NoActiveEngagement)));
        assert!(matches!(
            store.add_todo("x", None),
            Err(Error::NoActiveEngagement)
        ));
        assert!(matches!(
            store.save_evidence("a.txt", b"x", None),
            Err(Error::NoActiveEngagement)
        ));
    }

    #[test]
    fn test_failed_mutation_leaves_record_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let record = store.create_engagement("Acme", Vec::new(), "").unwrap();

        let mut finding = NewFinding::new("10.0.0.1", "bad", Severity::High);
        finding.cvss = Some(11.0);
        assert!(matches!(store.add_finding(finding), Err(Error::InvalidCvss(_))));

        assert_eq!(store.load_active().unwrap(), record);
    }

    #[test]
    fn test_invalid_evidence_filename_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let record = store.create_engagement("Acme", Vec::new(), "").unwrap();

        for name in ["../escape.txt", "", ".."] {
            assert!(matches!(
                store.save_evidence(name, b"x", None),
                Err(Error::InvalidFilename(_))
            ));
        }
        assert!(!store.paths().evidence_dir(&record.id).exists());
        assert!(!dir.path().join("engagements").join("escape.txt").exists());
    }

    #[test]
    fn test_complete_todo_twice_does_not_rewrite_record() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create_engagement("Acme", Vec::new(), "").unwrap();
        store.add_todo("enumerate shares", Some(TodoPriority::High)).unwrap();

        let first = store.complete_todo("T-001").unwrap();
        let stamped = store.load_active().unwrap().updated_at;
        let second = store.complete_todo("T-001").unwrap();

        assert!(!first.already_completed);
        assert!(second.already_completed);
        assert_eq!(first.todo.completed_at, second.todo.completed_at);
        assert_eq!(store.load_active().unwrap().updated_at, stamped);
    }

    #[test]
    fn test_host_reports_follow_mutations() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let record = store.create_engagement("Acme", Vec::new(), "").unwrap();

        store
            .discover_host(HostDiscovery {
                ip: "fe80::1".into(),
                services: vec![Service::new(22, "tcp").named("ssh")],
                ..Default::default()
            })
            .unwrap();
        store
            .update_host_section("fe80::1", HostSection::Exploitation, "reused root key")
            .unwrap();

        let path = store.paths().host_report_file(&record.id, "fe80::1");
        assert!(path.ends_with("fe80__1.md"));
        let report = fs::read_to_string(path).unwrap();
        assert!(report.contains("reused root key"));
        assert!(report.contains("| 22 | tcp | ssh |"));
    }

    #[test]
    fn test_load_unknown_engagement() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            store(&dir).resume_engagement("2020-01-01-nope"),
            Err(Error::EngagementNotFound(id)) if id == "2020-01-01-nope"
        ));
    }
}
