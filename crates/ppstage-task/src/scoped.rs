//! Scoped Temporary Sink
//!
//! A uniquely named temporary directory holding the file the engine writes
//! to. It belongs to exactly one invocation and is removed when released or
//! dropped, so early error returns cannot leave it behind.

use ppstage_core::CapturedOutput;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Prefix of every sink directory name
pub const SINK_PREFIX: &str = "ppstage-";

/// Result of removing a sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupStatus {
    Removed,
    Failed { path: PathBuf, reason: String },
}

impl CleanupStatus {
    pub fn is_removed(&self) -> bool {
        matches!(self, CleanupStatus::Removed)
    }
}

/// Temporary directory plus fixed-name output file
pub struct ScopedTempSink {
    dir: Option<TempDir>,
    path: PathBuf,
    file: PathBuf,
    id: String,
}

impl ScopedTempSink {
    /// Create a fresh sink directory
    ///
    /// Uses the system temp dir unless `temp_root` is given. The output file
    /// itself is not created here. `file_name` must be a plain file name so
    /// the file stays inside the sink directory.
    pub fn acquire(temp_root: Option<&Path>, file_name: &str) -> io::Result<Self> {
        let mut components = Path::new(file_name).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sink file name {:?} is not a plain file name", file_name),
            ));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix(SINK_PREFIX);

        let dir = match temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let path = dir.path().to_path_buf();
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = path.join(file_name);
        debug!("Acquired sink {} at {:?}", id, path);

        Ok(Self {
            dir: Some(dir),
            path,
            file,
            id,
        })
    }

    /// Unique identifier of this sink
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sink directory
    pub fn dir(&self) -> &Path {
        &self.path
    }

    /// File the engine writes to
    pub fn file_path(&self) -> &Path {
        &self.file
    }

    /// Read the whole output file
    ///
    /// Fails if the engine never created the file.
    pub fn read_captured(&self) -> io::Result<CapturedOutput> {
        let bytes = fs::read(&self.file)?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!("Sink {} holds invalid UTF-8, replacing bad sequences", self.id);
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        Ok(CapturedOutput::new(text))
    }

    /// Move the output file to `dest`
    ///
    /// Renames when possible and falls back to copy-then-remove when the
    /// destination is on another filesystem.
    pub fn relocate_to(&self, dest: &Path) -> io::Result<()> {
        match fs::rename(&self.file, dest) {
            Ok(()) => {
                debug!("Moved sink {} output to {:?}", self.id, dest);
                Ok(())
            }
            Err(rename_err) => {
                debug!("Rename to {:?} failed ({}), copying", dest, rename_err);
                fs::copy(&self.file, dest)?;
                let _ = fs::remove_file(&self.file);
                Ok(())
            }
        }
    }

    /// Remove the sink directory and everything in it
    pub fn release(mut self) -> CleanupStatus {
        match self.dir.take() {
            Some(dir) => Self::remove(dir, &self.id, &self.path),
            None => CleanupStatus::Removed,
        }
    }

    fn remove(dir: TempDir, id: &str, path: &Path) -> CleanupStatus {
        match dir.close() {
            Ok(()) => {
                debug!("Released sink {}", id);
                CleanupStatus::Removed
            }
            Err(e) => {
                warn!("Failed to remove sink {} at {:?}: {}", id, path, e);
                CleanupStatus::Failed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl Drop for ScopedTempSink {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            Self::remove(dir, &self.id, &self.path);
        }
    }
}
