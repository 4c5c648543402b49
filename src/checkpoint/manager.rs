//! Checkpoint manager for numbered checkpoint files with bounded retention.

use super::state::{Checkpoint, CheckpointMeta};
use crate::{FlowError, Result};
use std::fs;
use std::path::{Path, PathBuf};

const CHECKPOINT_PREFIX: &str = "ckpt-";
const CHECKPOINT_EXT: &str = "safetensors";

/// Manages a directory of numbered checkpoints.
///
/// Each save writes `ckpt-NNNNNN.safetensors` (weights, via candle) and
/// `ckpt-NNNNNN.json` (metadata) with a monotonically increasing index, then
/// prunes the oldest checkpoints beyond the retention bound.
///
/// # Example
///
/// ```ignore
/// let manager = CheckpointManager::new("candle_ckpts", 3);
/// manager.save(&checkpoint)?;
///
/// // To resume:
/// manager.restore_latest(&mut checkpoint)?;
/// ```
pub struct CheckpointManager {
    dir: PathBuf,
    max_to_keep: usize,
}

impl CheckpointManager {
    /// Create a manager over the given directory, keeping at most
    /// `max_to_keep` checkpoints (0 = keep all).
    pub fn new(dir: impl Into<PathBuf>, max_to_keep: usize) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!("Failed to create checkpoint directory: {}", e);
        }

        Self { dir, max_to_keep }
    }

    /// The managed checkpoint directory.
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Retention bound (0 = keep all).
    pub fn max_to_keep(&self) -> usize {
        self.max_to_keep
    }

    /// Durably persist the checkpoint's tracked variables and metadata.
    ///
    /// Returns the path of the written weights file.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let index = self.next_index()?;
        let path = self
            .dir
            .join(format!("{}{:06}.{}", CHECKPOINT_PREFIX, index, CHECKPOINT_EXT));

        checkpoint.varmap().save(&path)?;

        let meta = CheckpointMeta::new(checkpoint.step());
        fs::write(
            path.with_extension("json"),
            serde_json::to_string_pretty(&meta)?,
        )?;
        tracing::info!(path = %path.display(), step = checkpoint.step(), "Saved checkpoint");

        if self.max_to_keep > 0 {
            self.prune()?;
        }

        Ok(path)
    }

    /// List all checkpoint weight files in index order.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Ok(Vec::new()),
        };

        let mut checkpoints: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| {
                        n.starts_with(CHECKPOINT_PREFIX)
                            && n.ends_with(&format!(".{}", CHECKPOINT_EXT))
                    })
                    .unwrap_or(false)
            })
            .collect();

        checkpoints.sort();
        Ok(checkpoints)
    }

    /// Path of the most recent checkpoint, if any exists.
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.list()?.pop())
    }

    /// Restore the checkpoint's tracked variables from the most recent
    /// checkpoint file.
    pub fn restore_latest(&self, checkpoint: &mut Checkpoint) -> Result<()> {
        let path = self.latest()?.ok_or_else(|| FlowError::NoCheckpoint {
            dir: self.dir.clone(),
        })?;
        checkpoint.restore(&path)
    }

    /// Next checkpoint index: one past the highest on disk.
    fn next_index(&self) -> Result<u64> {
        let last = self
            .list()?
            .last()
            .map(|p| Self::extract_index(p))
            .unwrap_or(0);
        Ok(last + 1)
    }

    /// Remove old checkpoints and their sidecars beyond the retention bound.
    fn prune(&self) -> Result<()> {
        let mut checkpoints = self.list()?;

        while checkpoints.len() > self.max_to_keep {
            let old = checkpoints.remove(0);
            if let Err(e) = fs::remove_file(&old) {
                tracing::warn!(path = %old.display(), "Failed to remove old checkpoint: {}", e);
            } else {
                fs::remove_file(old.with_extension("json")).ok();
                tracing::debug!(path = %old.display(), "Removed old checkpoint");
            }
        }

        Ok(())
    }

    /// Extract the numeric index from a checkpoint filename.
    fn extract_index(path: &Path) -> u64 {
        path.file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix(CHECKPOINT_PREFIX))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}
