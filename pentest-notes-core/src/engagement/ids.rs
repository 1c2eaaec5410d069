//! Identifier generation.
//!
//! Sub-entity ids (`F-001`, `C-002`, `T-003`, `CMD-004`) are derived by
//! scanning the ids already present, so hand edits to a record stay
//! consistent with future ids. There is no stored counter.

use chrono::NaiveDate;

pub const FINDING_PREFIX: &str = "F";
pub const CREDENTIAL_PREFIX: &str = "C";
pub const TODO_PREFIX: &str = "T";
pub const COMMAND_PREFIX: &str = "CMD";

/// Maximum slug length inside an engagement id
pub const MAX_SLUG_LEN: usize = 40;

/// Next id for `prefix`: highest numeric suffix plus one, at least 3 digits.
///
/// Gaps are not filled and ids that do not parse are ignored.
pub fn next_sequential_id<'a>(prefix: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let next = existing
        .into_iter()
        .filter_map(|id| numeric_suffix(prefix, id))
        .max()
        .map_or(1, |max| max + 1);
    format!("{}-{:03}", prefix, next)
}

fn numeric_suffix(prefix: &str, id: &str) -> Option<u64> {
    let digits = id.strip_prefix(prefix)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Lowercase ASCII slug: runs of anything else become one `-`, no `-` at
/// either end, at most `max_len` characters.
pub fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(max_len);
    slug.trim_matches('-').to_string()
}

/// `<YYYY-MM-DD>-<slug>`; the slug falls back to `engagement`.
pub fn engagement_id_candidate(date: NaiveDate, target: &str) -> String {
    let slug = slugify(target, MAX_SLUG_LEN);
    let slug = if slug.is_empty() { "engagement" } else { &slug };
    format!("{}-{}", date.format("%Y-%m-%d"), slug)
}

/// The `n`th candidate for `base`: `base`, `base-2`, `base-3`, ...
pub fn with_collision_suffix(base: &str, n: u32) -> String {
    if n <= 1 {
        base.to_string()
    } else {
        format!("{}-{}", base, n)
    }
}

/// Tool name from a command line: first token without any path prefix.
pub fn derive_tool_name(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .and_then(|token| token.rsplit(|c: char| c == '/' || c == '\\').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
