//! Core domain types for pentest-notes
//!
//! These types are the persisted data model. One [`EngagementRecord`] is stored
//! per engagement; [`IndexEntry`] is its denormalized summary in the global
//! index; [`AppState`] names the active engagement.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Engagement** | One penetration-testing project: scope, hosts, findings, ... |
//! | **Active engagement** | The single engagement all mutating operations target |
//! | **Index** | Summary list of all engagements, used for listing without loading detail |
//! | **Additive merge** | Update policy that only fills empty fields or appends, never deletes |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Schema version written into every record produced by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Implements `as_str`, `Display` and `FromStr` for a snake_case unit enum.
macro_rules! string_enum {
    ($ty:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    _ => Err(format!("unknown {}: {}", $label, s)),
                }
            }
        }
    };
}

// ============================================
// Engagement
// ============================================

/// Lifecycle status of an engagement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStatus {
    Active,
    Paused,
    Completed,
}

string_enum!(EngagementStatus, "engagement status" {
    Active => "active",
    Paused => "paused",
    Completed => "completed",
});

/// Status an engagement may be closed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseStatus {
    #[default]
    Completed,
    Paused,
}

string_enum!(CloseStatus, "close status" {
    Completed => "completed",
    Paused => "paused",
});

impl From<CloseStatus> for EngagementStatus {
    fn from(status: CloseStatus) -> Self {
        match status {
            CloseStatus::Completed => EngagementStatus::Completed,
            CloseStatus::Paused => EngagementStatus::Paused,
        }
    }
}

/// Full detail record of one engagement.
///
/// Serialized to `engagements/<id>/engagement.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub schema_version: u32,
    /// `<date>-<slug>`, immutable once assigned
    pub id: String,
    pub target: String,
    pub scope: Vec<String>,
    pub rules_of_engagement: String,
    pub status: EngagementStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub executive_summary: String,
    #[serde(default)]
    pub attack_path: Vec<AttackStep>,
    #[serde(default)]
    pub findings: BTreeMap<String, Finding>,
    #[serde(default)]
    pub hosts: BTreeMap<String, Host>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub dead_ends: Vec<DeadEnd>,
    #[serde(default)]
    pub todos: Vec<Todo>,
    #[serde(default)]
    pub evidence_index: BTreeMap<String, EvidenceEntry>,
    #[serde(default)]
    pub command_log: Vec<CommandEntry>,
}

/// One step of the attack narrative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackStep {
    /// 1-based, dense, never reused
    pub step: u32,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================
// Findings
// ============================================

/// Finding severity, ordered from most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

string_enum!(Severity, "severity" {
    Critical => "critical",
    High => "high",
    Medium => "medium",
    Low => "low",
    Info => "info",
});

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];
}

/// Confirmation status of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    #[default]
    Confirmed,
    Potential,
    Exploited,
    FalsePositive,
}

string_enum!(FindingStatus, "finding status" {
    Confirmed => "confirmed",
    Potential => "potential",
    Exploited => "exploited",
    FalsePositive => "false_positive",
});

/// A vulnerability finding, keyed `F-NNN`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub host: String,
    pub title: String,
    pub severity: Severity,
    pub cvss: Option<f64>,
    pub status: FindingStatus,
    pub evidence: Option<String>,
    /// Append-only
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for adding a finding
#[derive(Debug, Clone, PartialEq)]
pub struct NewFinding {
    pub host: String,
    pub title: String,
    pub severity: Severity,
    pub cvss: Option<f64>,
    /// Defaults to [`FindingStatus::Confirmed`]
    pub status: Option<FindingStatus>,
    pub evidence: Option<String>,
    pub notes: String,
}

impl NewFinding {
    pub fn new(host: impl Into<String>, title: impl Into<String>, severity: Severity) -> Self {
        Self {
            host: host.into(),
            title: title.into(),
            severity,
            cvss: None,
            status: None,
            evidence: None,
            notes: String::new(),
        }
    }
}

/// Partial update of a finding. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindingUpdate {
    pub title: Option<String>,
    pub severity: Option<Severity>,
    pub cvss: Option<f64>,
    pub status: Option<FindingStatus>,
    pub evidence: Option<String>,
    /// Appended to the existing notes
    pub notes: Option<String>,
}

// ============================================
// Hosts
// ============================================

/// A discovered host, keyed by IP string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub ip: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub os: String,
    pub first_seen: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub sections: HostSections,
}

/// A network service, unique within a host by `(port, protocol)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub port: u16,
    pub protocol: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub notes: String,
}

impl Service {
    /// Build a service, lowercasing the protocol and defaulting it to `tcp`.
    pub fn new(port: u16, protocol: &str) -> Self {
        Self {
            port,
            protocol: normalize_protocol(protocol),
            service: String::new(),
            version: String::new(),
            notes: String::new(),
        }
    }

    pub fn named(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn key(&self) -> (u16, &str) {
        (self.port, self.protocol.as_str())
    }
}

/// Lowercased, trimmed protocol name; empty means `tcp`.
pub fn normalize_protocol(protocol: &str) -> String {
    let protocol = protocol.trim().to_ascii_lowercase();
    if protocol.is_empty() {
        "tcp".to_string()
    } else {
        protocol
    }
}

/// Append-only narrative sections of a host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSections {
    #[serde(default)]
    pub enumeration: String,
    #[serde(default)]
    pub vulnerabilities: String,
    #[serde(default)]
    pub exploitation: String,
    #[serde(default)]
    pub post_exploitation: String,
    #[serde(default)]
    pub credentials: String,
    #[serde(default)]
    pub key_commands: String,
}

impl HostSections {
    pub fn get(&self, section: HostSection) -> &str {
        match section {
            HostSection::Enumeration => &self.enumeration,
            HostSection::Vulnerabilities => &self.vulnerabilities,
            HostSection::Exploitation => &self.exploitation,
            HostSection::PostExploitation => &self.post_exploitation,
            HostSection::Credentials => &self.credentials,
            HostSection::KeyCommands => &self.key_commands,
        }
    }

    pub fn get_mut(&mut self, section: HostSection) -> &mut String {
        match section {
            HostSection::Enumeration => &mut self.enumeration,
            HostSection::Vulnerabilities => &mut self.vulnerabilities,
            HostSection::Exploitation => &mut self.exploitation,
            HostSection::PostExploitation => &mut self.post_exploitation,
            HostSection::Credentials => &mut self.credentials,
            HostSection::KeyCommands => &mut self.key_commands,
        }
    }
}

/// Names one of the six host narrative sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostSection {
    Enumeration,
    Vulnerabilities,
    Exploitation,
    PostExploitation,
    Credentials,
    KeyCommands,
}

string_enum!(HostSection, "host section" {
    Enumeration => "enumeration",
    Vulnerabilities => "vulnerabilities",
    Exploitation => "exploitation",
    PostExploitation => "post_exploitation",
    Credentials => "credentials",
    KeyCommands => "key_commands",
});

impl HostSection {
    pub const ALL: [HostSection; 6] = [
        HostSection::Enumeration,
        HostSection::Vulnerabilities,
        HostSection::Exploitation,
        HostSection::PostExploitation,
        HostSection::Credentials,
        HostSection::KeyCommands,
    ];

    /// Heading used in rendered reports
    pub fn title(&self) -> &'static str {
        match self {
            HostSection::Enumeration => "Enumeration",
            HostSection::Vulnerabilities => "Vulnerabilities",
            HostSection::Exploitation => "Exploitation",
            HostSection::PostExploitation => "Post-Exploitation",
            HostSection::Credentials => "Credentials",
            HostSection::KeyCommands => "Key Commands",
        }
    }
}

/// Input for host discovery (create or additive merge)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostDiscovery {
    pub ip: String,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub services: Vec<Service>,
}

impl HostDiscovery {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Default::default()
        }
    }
}

/// What a host discovery changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostDiscoveryOutcome {
    /// The host did not exist before
    pub created: bool,
    pub services_added: usize,
    pub services_updated: usize,
}

// ============================================
// Credentials, dead ends, TODOs
// ============================================

/// A harvested credential, keyed `C-NNN`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub secret: String,
    /// password, hash, key, token, ...
    #[serde(default)]
    pub credential_type: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub service: String,
    /// Where it was found
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for adding a credential
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewCredential {
    pub username: String,
    pub secret: Option<String>,
    pub credential_type: Option<String>,
    pub host: Option<String>,
    pub service: Option<String>,
    pub source: Option<String>,
    pub verified: Option<bool>,
}

/// A technique that did not work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadEnd {
    pub timestamp: DateTime<Utc>,
    pub technique: String,
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    High,
    #[default]
    Medium,
    Low,
}

string_enum!(TodoPriority, "todo priority" {
    High => "high",
    Medium => "medium",
    Low => "low",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    Completed,
}

string_enum!(TodoStatus, "todo status" {
    Pending => "pending",
    Completed => "completed",
});

/// A follow-up item, keyed `T-NNN`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub description: String,
    pub priority: TodoPriority,
    pub status: TodoStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of completing a TODO
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodoCompletion {
    pub todo: Todo,
    /// The TODO was already completed; nothing was changed
    pub already_completed: bool,
}

// ============================================
// Evidence and command log
// ============================================

/// Index entry for a saved evidence file, keyed by filename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub filename: String,
    #[serde(default)]
    pub description: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the content
    pub sha256: String,
    pub saved_at: DateTime<Utc>,
}

/// Result of saving evidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceSaved {
    pub entry: EvidenceEntry,
    pub path: std::path::PathBuf,
    /// A file of the same name existed and was replaced
    pub overwritten: bool,
}

/// Which front end recorded a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    Protocol,
    #[default]
    Cli,
    LogWrapper,
}

string_enum!(CommandSource, "command source" {
    Protocol => "protocol",
    Cli => "cli",
    LogWrapper => "log_wrapper",
});

/// A logged command, keyed `CMD-NNN`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub id: String,
    pub command: String,
    pub tool: String,
    #[serde(default)]
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub exit_code: Option<i32>,
    /// Evidence filename holding the captured output
    pub evidence: Option<String>,
    pub source: CommandSource,
    pub logged_at: DateTime<Utc>,
}

/// Input for logging a command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewCommand {
    pub command: String,
    /// Derived from the command text when absent
    pub tool: Option<String>,
    pub target: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub exit_code: Option<i32>,
    pub evidence: Option<String>,
    pub source: CommandSource,
}

impl NewCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }
}

// ============================================
// Index and global state
// ============================================

/// Denormalized summary of one engagement in `engagements.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub target: String,
    pub status: EngagementStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub findings: usize,
    pub hosts: usize,
    pub credentials: usize,
    pub commands: usize,
}

impl From<&EngagementRecord> for IndexEntry {
    fn from(record: &EngagementRecord) -> Self {
        Self {
            id: record.id.clone(),
            target: record.target.clone(),
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            findings: record.findings.len(),
            hosts: record.hosts.len(),
            credentials: record.credentials.len(),
            commands: record.command_log.len(),
        }
    }
}

/// Index entry annotated for listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngagementListing {
    #[serde(flatten)]
    pub entry: IndexEntry,
    pub is_current: bool,
}

/// Process-independent global state (`state.json`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub active_engagement: Option<String>,
}

/// Snapshot returned by the status operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementSummary {
    pub id: String,
    pub target: String,
    pub status: EngagementStatus,
    pub findings_by_severity: BTreeMap<Severity, usize>,
    pub hosts: usize,
    pub credentials: usize,
    pub evidence: usize,
    pub commands: usize,
    pub pending_todos: usize,
    /// Last five attack-path steps, oldest first
    pub recent_attack_path: Vec<AttackStep>,
}

/// Result of closing an engagement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseOutcome {
    pub id: String,
    pub status: EngagementStatus,
}
