//! Parser trait abstraction
//!
//! Each supported tool implements [`ToolParser`] to turn its raw output into
//! host discoveries and findings. Parsers are pure: they never touch the
//! store, so the caller decides how parsed data is committed.
//!
//! ## Design Principles
//!
//! 1. **Resilience**: a bad record becomes a warning, parsing continues
//! 2. **Additive**: output only adds to an engagement, it never removes
//! 3. **Extensible**: a new tool only requires implementing this trait

use crate::error::Result;
use crate::types::{HostDiscovery, NewFinding};

/// Everything extracted from one tool output file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedOutput {
    /// Hosts to create or merge, in the order seen
    pub hosts: Vec<HostDiscovery>,
    /// Findings to add
    pub findings: Vec<NewFinding>,
    /// Text to store as evidence instead of the original bytes
    pub raw_text: Option<String>,
    /// Non-fatal problems (skipped lines and the like)
    pub warnings: Vec<String>,
}

/// Trait implemented by all tool output parsers.
///
/// ## Example
///
/// ```rust,ignore
/// struct MyToolParser;
///
/// impl ToolParser for MyToolParser {
///     fn name(&self) -> &'static str {
///         "mytool"
///     }
///
///     fn parse(&self, content: &str) -> Result<ParsedOutput> {
///         // Extract hosts and findings from content
///         Ok(ParsedOutput::default())
///     }
/// }
/// ```
pub trait ToolParser: Send + Sync {
    /// Registry key, lowercase
    fn name(&self) -> &'static str;

    /// Parse the complete output of one tool run.
    ///
    /// Returns [`crate::Error::Parse`] only when the input as a whole is
    /// unusable; individual bad records go to [`ParsedOutput::warnings`].
    fn parse(&self, content: &str) -> Result<ParsedOutput>;
}
