//! Error types for pentest-notes-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the pentest-notes-core library
#[derive(Error, Debug)]
pub enum Error {
    /// An operation needs an active engagement and none is set
    #[error("no active engagement; create or resume one first")]
    NoActiveEngagement,

    /// Engagement not found
    #[error("engagement not found: {0}")]
    EngagementNotFound(String),

    /// Engagement id that is not a plain directory name
    #[error("invalid engagement id: {0:?}")]
    InvalidEngagementId(String),

    /// Host not found in the active engagement
    #[error("host not found: {0}")]
    HostNotFound(String),

    /// Finding not found in the active engagement
    #[error("finding not found: {0}")]
    FindingNotFound(String),

    /// TODO not found in the active engagement
    #[error("todo not found: {0}")]
    TodoNotFound(String),

    /// CVSS score outside [0, 10]
    #[error("invalid CVSS score {0}: must be between 0 and 10")]
    InvalidCvss(f64),

    /// Evidence filename would escape the evidence directory
    #[error("invalid evidence filename: {0:?}")]
    InvalidFilename(String),

    /// No parser registered for the requested tool
    #[error("unsupported tool: {0}")]
    UnsupportedTool(String),

    /// Ingestion or capture source file could not be read
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Lock could not be obtained within the retry budget
    #[error("timed out acquiring lock {} after {attempts} attempts", path.display())]
    LockTimeout { path: PathBuf, attempts: u32 },

    /// Parse error for tool output
    #[error("parse error in {tool} output: {message}")]
    Parse { tool: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for pentest-notes-core
pub type Result<T> = std::result::Result<T, Error>;
