//! Global state: which engagement, if any, is active.
//!
//! Stored separately from engagement detail so short-lived CLI runs and a
//! long-lived server agree on it. A single scalar write, so no lock.

use super::atomic::{read_json, write_json};
use crate::error::{Error, Result};
use crate::types::AppState;
use std::path::PathBuf;

/// Handle to `state.json`.
#[derive(Debug, Clone)]
pub struct GlobalState {
    path: PathBuf,
}

impl GlobalState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<AppState> {
        read_json(&self.path, AppState::default())
    }

    /// The active engagement id, or `None` if never set or cleared.
    pub fn active_engagement_id(&self) -> Result<Option<String>> {
        Ok(self.load()?.active_engagement)
    }

    /// Overwrite the active engagement. Existence is the caller's concern.
    pub fn set_active_engagement(&self, id: &str) -> Result<()> {
        tracing::debug!(engagement = id, "setting active engagement");
        write_json(
            &self.path,
            &AppState {
                active_engagement: Some(id.to_string()),
            },
        )
    }

    pub fn clear_active_engagement(&self) -> Result<()> {
        tracing::debug!("clearing active engagement");
        write_json(&self.path, &AppState::default())
    }

    /// The active engagement id or [`Error::NoActiveEngagement`].
    pub fn require_active_engagement(&self) -> Result<String> {
        self.active_engagement_id()?
            .ok_or(Error::NoActiveEngagement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unset_state_has_no_active_engagement() {
        let dir = TempDir::new().unwrap();
        let state = GlobalState::new(dir.path().join("state.json"));

        assert_eq!(state.active_engagement_id().unwrap(), None);
        assert!(matches!(
            state.require_active_engagement(),
            Err(Error::NoActiveEngagement)
        ));
    }

    #[test]
    fn test_set_then_clear() {
        let dir = TempDir::new().unwrap();
        let state = GlobalState::new(dir.path().join("state.json"));

        state.set_active_engagement("2025-03-01-acme").unwrap();
        assert_eq!(state.require_active_engagement().unwrap(), "2025-03-01-acme");

        // A second handle on the same file sees the same value
        let other = GlobalState::new(dir.path().join("state.json"));
        assert_eq!(
            other.active_engagement_id().unwrap().as_deref(),
            Some("2025-03-01-acme")
        );

        state.clear_active_engagement().unwrap();
        assert_eq!(other.active_engagement_id().unwrap(), None);
    }
}
