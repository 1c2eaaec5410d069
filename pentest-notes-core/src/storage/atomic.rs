//! Crash-safe file writes and JSON helpers.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Write `bytes` to `path` so readers see either the old or the new content.
///
/// Data goes to a hidden sibling salted with the pid and a random suffix,
/// is fsynced, then renamed over the target. The parent directory must exist.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    stage_write(path, bytes)?.commit()
}

/// Content written and fsynced next to its target but not yet visible there.
///
/// [`StagedWrite::commit`] renames it into place; dropping it uncommitted
/// removes the temp file and leaves the target untouched.
#[derive(Debug)]
pub struct StagedWrite {
    tmp_path: PathBuf,
    path: PathBuf,
    bytes: usize,
    committed: bool,
}

/// First half of [`atomic_write`]: stage `bytes` for `path`.
pub fn stage_write(path: &Path, bytes: &[u8]) -> Result<StagedWrite> {
    let file_name = path.file_name().ok_or_else(|| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a file path: {}", path.display()),
        ))
    })?;
    let tmp_path = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name.to_string_lossy(),
        std::process::id(),
        Uuid::new_v4().simple()
    ));

    let written = File::create(&tmp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(StagedWrite {
        tmp_path,
        path: path.to_path_buf(),
        bytes: bytes.len(),
        committed: false,
    })
}

impl StagedWrite {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.tmp_path, &self.path)?;
        self.committed = true;
        tracing::debug!(path = %self.path.display(), bytes = self.bytes, "atomic write");
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Read JSON from `path`, returning `default` when the file does not exist.
///
/// Any other I/O or parse failure is an error.
pub fn read_json<T: DeserializeOwned>(path: &Path, default: T) -> Result<T> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(default),
        Err(e) => Err(e.into()),
    }
}

/// Write `value` as indented JSON with a trailing newline, atomically.
///
/// Creates the parent directory if needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    atomic_write(path, buf.as_bytes())
}
