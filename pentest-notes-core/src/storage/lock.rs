//! Cross-process advisory lock on a sentinel file.
//!
//! Lock strategy:
//! - The lock is held while `<name>.lock` exists; it is created with
//!   `create_new`, which gives single-winner semantics per path.
//! - The sentinel carries a random owner token plus the holder pid and
//!   acquisition time. Release removes the sentinel only while it still
//!   holds our token.
//! - A sentinel older than [`LockOptions::stale_after`] belongs to a crashed
//!   holder and is reclaimed. Reclaim renames it aside first and only deletes
//!   it if the renamed file is still stale; a fresh lock is linked back.
//! - Contended acquisitions retry with exponential backoff, then fail with
//!   [`Error::LockTimeout`].
//! - [`LockGuard`] removes the sentinel on drop, so every exit path releases.

use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Lock acquisition policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Age after which a held lock is considered abandoned
    pub stale_after: Duration,
    /// Attempts before giving up
    pub retries: u32,
    /// First backoff delay, doubled per attempt
    pub min_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(10),
            retries: 10,
            min_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl LockOptions {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.min_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// A held lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: String,
    _file: File,
}

impl LockGuard {
    /// Acquire the lock at `path`, retrying per `options`.
    pub fn acquire(path: &Path, options: &LockOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let mut guard = Self::try_acquire(path)?;
            if guard.is_none() && reclaim_if_stale(path, options.stale_after)? {
                guard = Self::try_acquire(path)?;
            }
            if let Some(guard) = guard {
                tracing::debug!(path = %path.display(), attempt, "lock acquired");
                return Ok(guard);
            }

            if attempt >= options.retries.max(1) {
                return Err(Error::LockTimeout {
                    path: path.to_path_buf(),
                    attempts: attempt,
                });
            }

            let delay = options.backoff(attempt);
            tracing::debug!(
                path = %path.display(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "lock busy, backing off"
            );
            std::thread::sleep(delay);
        }
    }

    fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let token = Uuid::new_v4().simple().to_string();
        let written = writeln!(file, "{}{}", TOKEN_KEY, token)
            .and_then(|()| writeln!(file, "pid={}", std::process::id()))
            .and_then(|()| writeln!(file, "acquired_at={}", chrono::Utc::now().to_rfc3339()))
            .and_then(|()| file.sync_all());
        if let Err(e) = written {
            // Without the token we could never release it
            let _ = fs::remove_file(path);
            return Err(e.into());
        }

        Ok(Some(Self {
            path: path.to_path_buf(),
            token,
            _file: file,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the sentinel on disk is still the one we created.
    pub fn is_held(&self) -> bool {
        sentinel_token(&self.path).as_deref() == Some(self.token.as_str())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.is_held() {
            tracing::warn!(path = %self.path.display(), "lock was reclaimed while held, not releasing");
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

const TOKEN_KEY: &str = "token=";

/// Owner token written into the sentinel at `path`, if readable.
fn sentinel_token(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content
        .lines()
        .find_map(|line| line.strip_prefix(TOKEN_KEY))
        .map(str::to_string)
}

fn age_of(path: &Path) -> io::Result<Duration> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO))
}

/// Remove the sentinel if its holder has been gone longer than `stale_after`.
///
/// Returns `true` when the caller should retry immediately.
fn reclaim_if_stale(path: &Path, stale_after: Duration) -> Result<bool> {
    match age_of(path) {
        Ok(age) if age <= stale_after => return Ok(false),
        Ok(_) => {}
        // Released between our attempt and this check
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    }

    // Move the sentinel out of the way first, then judge what we moved. Another
    // process may have reclaimed and re-created the lock since the check above.
    let aside = path.with_file_name(format!(
        ".{}.{}.stale",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Uuid::new_v4().simple()
    ));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    }

    let age = age_of(&aside)?;
    if age <= stale_after {
        // Took a live lock: put it back unless someone already holds the path
        let restored = fs::hard_link(&aside, path);
        let _ = fs::remove_file(&aside);
        if let Err(e) = restored {
            tracing::warn!(path = %path.display(), error = %e, "could not restore a live lock");
        }
        return Ok(false);
    }

    tracing::warn!(
        path = %path.display(),
        age_secs = age.as_secs(),
        "reclaimed stale lock"
    );
    fs::remove_file(&aside)?;
    Ok(true)
}

/// Run `critical_section` while holding the lock at `path`.
pub fn with_lock<T>(
    path: &Path,
    options: &LockOptions,
    critical_section: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let _guard = LockGuard::acquire(path, options)?;
    critical_section()
}
