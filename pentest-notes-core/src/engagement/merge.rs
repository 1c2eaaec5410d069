//! Additive merge rules.
//!
//! Re-discovered data only fills gaps or appends; nothing already recorded is
//! removed or blanked.

use crate::types::{normalize_protocol, Service};

/// Join `incoming` after `existing` with a blank line.
///
/// Empty `existing` yields `incoming`; blank `incoming` changes nothing.
pub fn append_text(existing: &str, incoming: &str) -> String {
    if incoming.trim().is_empty() {
        return existing.to_string();
    }
    if existing.trim().is_empty() {
        return incoming.to_string();
    }
    format!("{}\n\n{}", existing, incoming)
}

/// Set `field` to `incoming` only if `field` is empty and `incoming` is not.
pub fn fill_if_empty(field: &mut String, incoming: Option<&str>) -> bool {
    match incoming {
        Some(value) if field.is_empty() && !value.is_empty() => {
            *field = value.to_string();
            true
        }
        _ => false,
    }
}

/// Set `field` to `incoming` when `incoming` is non-empty and different.
pub fn overwrite_if_present(field: &mut String, incoming: &str) -> bool {
    if incoming.is_empty() || field == incoming {
        return false;
    }
    *field = incoming.to_string();
    true
}

/// Counts produced by [`merge_services`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceMergeStats {
    pub added: usize,
    pub updated: usize,
}

/// Merge `incoming` into `existing` by `(port, protocol)`.
///
/// A matching service takes each non-empty incoming name/version/notes; an
/// unknown pair is appended. Never removes a service, never duplicates a pair.
pub fn merge_services(
    existing: &mut Vec<Service>,
    incoming: impl IntoIterator<Item = Service>,
) -> ServiceMergeStats {
    let mut stats = ServiceMergeStats::default();

    for mut service in incoming {
        service.protocol = normalize_protocol(&service.protocol);

        match existing.iter_mut().find(|s| s.key() == service.key()) {
            Some(current) => {
                let mut changed = overwrite_if_present(&mut current.service, &service.service);
                changed |= overwrite_if_present(&mut current.version, &service.version);
                changed |= overwrite_if_present(&mut current.notes, &service.notes);
                if changed {
                    stats.updated += 1;
                }
            }
            None => {
                existing.push(service);
                stats.added += 1;
            }
        }
    }

    stats
}
