//! Ephemeral on-disk artifact holding one snippet
//!
//! Each run gets a fresh, uniquely named scratch directory containing the
//! script file. The directory doubles as the child's working directory, so
//! anything the snippet manages to write next to itself goes away with it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

use crate::errors::Result;

const SCRIPT_STEM: &str = "snippet";

/// Scratch directory plus script file, owned by exactly one run.
///
/// Dropping the unit deletes both; deletion failures are only logged.
#[derive(Debug)]
pub struct ExecutionUnit {
    dir: Option<TempDir>,
    script: PathBuf,
}

impl ExecutionUnit {
    /// Write `source` verbatim into a new unit under `root`.
    ///
    /// `suffix` is the interpreter-recognizable extension (e.g. `.py`).
    /// With `shared` set, the directory is made traversable and the script
    /// readable for other users, for children that run under a different uid.
    pub fn create(root: &Path, source: &str, suffix: &str, shared: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("snippet-")
            .tempdir_in(root)?;

        let script = dir.path().join(format!("{}{}", SCRIPT_STEM, suffix));
        let mode = if shared { 0o644 } else { 0o600 };
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&script)?;
        file.write_all(source.as_bytes())?;
        file.flush()?;

        if shared {
            fs::set_permissions(&script, fs::Permissions::from_mode(0o644))?;
            fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o711))?;
        }

        debug!("Created execution unit {}", script.display());

        Ok(Self {
            dir: Some(dir),
            script,
        })
    }

    /// Path of the script handed to the interpreter
    pub fn script_path(&self) -> &Path {
        &self.script
    }

    /// Scratch directory used as the child's working directory
    pub fn workdir(&self) -> &Path {
        self.script.parent().unwrap_or(&self.script)
    }
}

impl Drop for ExecutionUnit {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove execution unit {}: {}", path.display(), e);
            }
        }
    }
}
