//! Checkpoint state: the tracked-variable handle and its metadata sidecar.

use crate::Result;
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A restorable snapshot handle over a model's trainable variables.
///
/// Tracks the training step counter and the `VarMap` every trainable
/// parameter was registered in. The weights themselves are persisted by
/// candle (`VarMap::save`/`load`, safetensors); this type only pairs them
/// with the counter so a restore brings both back together.
#[derive(Clone)]
pub struct Checkpoint {
    step: u64,
    varmap: VarMap,
}

impl Checkpoint {
    /// Track the given variable map, starting the step counter at 1.
    pub fn new(varmap: VarMap) -> Self {
        Self { step: 1, varmap }
    }

    /// Current training step counter.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Advance the step counter by one.
    pub fn increment_step(&mut self) {
        self.step += 1;
    }

    /// The tracked variable map.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Overwrite the tracked variables with the values stored at `weights`,
    /// and pick the step counter back up from the metadata sidecar.
    ///
    /// The tracked map must contain the same variable names and shapes the
    /// file was written from; mismatches surface as candle errors.
    pub fn restore(&mut self, weights: &Path) -> Result<()> {
        self.varmap.load(weights)?;

        let meta_path = weights.with_extension("json");
        if meta_path.exists() {
            let meta: CheckpointMeta = serde_json::from_str(&fs::read_to_string(&meta_path)?)?;
            self.step = meta.step;
        }

        tracing::debug!(path = %weights.display(), step = self.step, "Restored checkpoint");
        Ok(())
    }
}

/// Metadata written next to each checkpoint's weights file.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckpointMeta {
    /// Training step counter at save time
    pub step: u64,
    /// Candleflow version that wrote the checkpoint
    pub version: String,
    /// Unix timestamp (seconds) of the save
    pub created_at: String,
}

impl CheckpointMeta {
    /// Create metadata for the given step, stamped with the current time.
    pub fn new(step: u64) -> Self {
        Self {
            step,
            version: crate::VERSION.to_string(),
            created_at: unix_timestamp(),
        }
    }
}

/// Get current timestamp as unix seconds.
fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_counter() {
        let mut checkpoint = Checkpoint::new(VarMap::new());
        assert_eq!(checkpoint.step(), 1);

        checkpoint.increment_step();
        checkpoint.increment_step();
        assert_eq!(checkpoint.step(), 3);
    }

    #[test]
    fn test_meta_serialization() {
        let meta = CheckpointMeta::new(42);
        let json = serde_json::to_string(&meta).unwrap();
        let restored: CheckpointMeta = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.step, 42);
        assert_eq!(restored.version, crate::VERSION);
    }
}
