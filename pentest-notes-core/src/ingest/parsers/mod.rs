//! Tool-specific parsers
//!
//! Each supported tool has a parser module that implements
//! the [`ToolParser`](super::ToolParser) trait.
//!
//! ## Supported Tools
//!
//! | Tool | Module | Input |
//! |------|--------|-------|
//! | nmap | [`nmap`] | normal output (`-oN`) |
//! | nuclei | [`nuclei`] | JSON lines (`-jsonl`) |

mod nmap;
mod nuclei;

pub use nmap::NmapParser;
pub use nuclei::NucleiParser;

use super::ToolParser;

/// Create all available parsers.
pub fn create_all_parsers() -> Vec<Box<dyn ToolParser>> {
    vec![Box::new(NmapParser::new()), Box::new(NucleiParser::new())]
}

/// Get the parser for a tool name, ignoring case.
///
/// Returns `None` if no parser is implemented for the tool.
pub fn parser_for(tool: &str) -> Option<Box<dyn ToolParser>> {
    let tool = tool.trim().to_ascii_lowercase();
    create_all_parsers().into_iter().find(|p| p.name() == tool)
}

/// Names of every supported tool.
pub fn supported_tools() -> Vec<&'static str> {
    create_all_parsers().iter().map(|p| p.name()).collect()
}
