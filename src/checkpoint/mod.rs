//! Checkpointing over candle's safetensors persistence.
//!
//! Provides:
//! - `Checkpoint`: a step counter plus the tracked variable map, restorable
//!   from a checkpoint file
//! - `CheckpointManager`: numbered checkpoint files with bounded retention
//!   and latest-checkpoint lookup
//! - `CheckpointMeta`: the JSON sidecar written next to each weights file

mod manager;
mod state;

pub use manager::CheckpointManager;
pub use state::{Checkpoint, CheckpointMeta};
