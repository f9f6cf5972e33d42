use std::path::{Path, PathBuf};

use crate::error::SyncError;

use super::hierarchy::{FolderTable, FolderTree};
use super::paths;

/// Materializes the folder hierarchy under the configured storage path.
pub struct LocalMirror {
    root: PathBuf,
    dry_run: bool,
}

impl LocalMirror {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            dry_run,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every directory in the tree, idempotently: directories
    /// that already exist are not errors. With `dry_run` the walk still
    /// happens (and logs), but nothing is created.
    pub fn prepare(&self, table: &FolderTable, tree: &FolderTree) -> Result<(), SyncError> {
        tracing::info!(root = %self.root.display(), "preparing local mirror");
        if !self.dry_run {
            std::fs::create_dir_all(&self.root).map_err(|e| SyncError::local_fs(&self.root, e))?;
        }
        self.create_level(tree, &self.root, table)
    }

    fn create_level(
        &self,
        node: &FolderTree,
        parent: &Path,
        table: &FolderTable,
    ) -> Result<(), SyncError> {
        for (id, subtree) in node.children() {
            let meta = table.get(id).ok_or_else(|| {
                SyncError::Integrity(format!("folder {id} is in the tree but not the table"))
            })?;
            paths::validate_segment(&meta.name)?;
            let path = parent.join(&meta.name);
            tracing::debug!(path = %path.display(), "creating folder");
            if !self.dry_run {
                std::fs::create_dir_all(&path).map_err(|e| SyncError::local_fs(&path, e))?;
            }
            self.create_level(subtree, &path, table)?;
        }
        Ok(())
    }

    /// Remove all mirrored content recursively. Never called during a
    /// sync run, only from the explicit erase command.
    pub fn erase(&self) -> Result<(), SyncError> {
        if !self.root.exists() {
            tracing::info!(root = %self.root.display(), "nothing to erase");
            return Ok(());
        }
        tracing::info!(root = %self.root.display(), "erasing mirrored content");
        if !self.dry_run {
            std::fs::remove_dir_all(&self.root).map_err(|e| SyncError::local_fs(&self.root, e))?;
        }
        Ok(())
    }
}
