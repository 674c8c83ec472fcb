//! Pre-patch backups of the layout tree.
//!
//! Patching rewrites OCR text in place, so the untouched tree is persisted
//! first. The first backup of a layout is the only one: a later patch run
//! must not replace the true original with an already-corrected copy.

use crate::error::LayoutError;
use crate::layout::LayoutTree;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the backup written next to a `layout.json`.
pub const BACKUP_FILE_NAME: &str = "layout_uncorrected.json";

/// Destination for the pre-patch copy of a tree.
pub trait BackupSink {
    /// Persist `tree` before it is mutated.
    ///
    /// An error aborts the patch with the tree untouched.
    fn store(&mut self, tree: &LayoutTree) -> Result<(), LayoutError>;
}

/// Writes the backup to disk, never replacing an existing one.
#[derive(Debug, Clone)]
pub struct FileBackup {
    path: PathBuf,
}

impl FileBackup {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backup at [`BACKUP_FILE_NAME`] in the directory holding `layout_path`.
    pub fn beside(layout_path: impl AsRef<Path>) -> Self {
        let dir = layout_path
            .as_ref()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::new(dir.join(BACKUP_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackupSink for FileBackup {
    fn store(&mut self, tree: &LayoutTree) -> Result<(), LayoutError> {
        let fail = |source| LayoutError::BackupFailed {
            path: self.path.clone(),
            source,
        };
        let json = tree.to_json_pretty()?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(fail)?;
        tmp.write_all(json.as_bytes()).map_err(fail)?;

        // Atomic create-new: a concurrent or earlier backup always wins.
        match tmp.persist_noclobber(&self.path) {
            Ok(_) => {
                info!(path = %self.path.display(), "Backup written");
                Ok(())
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                info!(path = %self.path.display(), "Existing backup kept");
                Ok(())
            }
            Err(e) => Err(fail(e.error)),
        }
    }
}

/// Keeps the first stored tree in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackup {
    snapshot: Option<LayoutTree>,
    stores: usize,
}

impl MemoryBackup {
    pub fn new() -> Self {
        Self::default()
    }

    /// The preserved original, if anything was stored.
    pub fn snapshot(&self) -> Option<&LayoutTree> {
        self.snapshot.as_ref()
    }

    /// Number of times [`BackupSink::store`] was called.
    pub fn stores(&self) -> usize {
        self.stores
    }
}

impl BackupSink for MemoryBackup {
    fn store(&mut self, tree: &LayoutTree) -> Result<(), LayoutError> {
        self.stores += 1;
        if self.snapshot.is_none() {
            self.snapshot = Some(tree.clone());
        }
        Ok(())
    }
}
