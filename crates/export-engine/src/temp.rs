//! Intermediate file bookkeeping.

use std::path::{Path, PathBuf};

use splice_common::clock::unique_stamp;

/// Allocates unique intermediate paths and removes them again.
///
/// Names look like `<prefix>-<pid>-<nanos>-<index>.<ext>`. Allocation only
/// reserves a name; nothing is created on disk. Everything allocated is
/// released when the manager is dropped.
#[derive(Debug)]
pub struct TempFileManager {
    root: PathBuf,
    extension: String,
    next_index: usize,
    allocated: Vec<PathBuf>,
}

impl TempFileManager {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            next_index: 0,
            allocated: vec![],
        }
    }

    /// Manager rooted in the OS temp directory.
    pub fn in_os_temp(extension: impl Into<String>) -> Self {
        Self::new(std::env::temp_dir(), extension)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a fresh path.
    pub fn allocate(&mut self, prefix: &str) -> PathBuf {
        let index = self.next_index;
        self.next_index += 1;
        let name = format!(
            "{prefix}-{pid}-{stamp}-{index}.{ext}",
            pid = std::process::id(),
            stamp = unique_stamp(),
            ext = self.extension,
        );
        let path = self.root.join(name);
        self.allocated.push(path.clone());
        path
    }

    /// Every path handed out so far, in allocation order.
    pub fn allocated(&self) -> &[PathBuf] {
        &self.allocated
    }

    /// Delete the given paths if they exist. Safe to call repeatedly.
    ///
    /// Deletion failures are logged, never returned. Returns how many files
    /// were actually removed.
    pub fn release(&self, paths: &[PathBuf]) -> usize {
        let mut removed = 0;
        for path in paths {
            if !path.exists() {
                continue;
            }
            match std::fs::remove_file(path) {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!(path = %path.display(), "Removed intermediate file");
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "Failed to remove intermediate file"
                    );
                }
            }
        }
        removed
    }

    /// Release everything this manager allocated.
    pub fn release_all(&self) -> usize {
        self.release(&self.allocated)
    }
}

impl Drop for TempFileManager {
    fn drop(&mut self) {
        self.release_all();
    }
}
