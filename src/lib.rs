//! # Candleflow
//!
//! Adapters that let a data pipeline drive [candle](https://github.com/huggingface/candle)
//! models as ordinary pipeline steps.
//!
//! ## Overview
//!
//! Candleflow provides:
//! - The `Step` / `FitTransform` traits a pipeline engine drives
//! - `CandleModelStep`, which wraps a user-built model/loss/optimizer triple
//!   behind a lazy setup/strip lifecycle
//! - `Checkpoint` and `CheckpointManager` over candle's safetensors
//!   persistence, with bounded retention
//! - `CheckpointStepSaver`, which coordinates checkpointing with the step
//!   lifecycle at serialization boundaries
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use candleflow::prelude::*;
//!
//! let config = ModelStepConfig::new("candle_ckpts").max_to_keep(3);
//! let mut step = CandleModelStep::new(MyFactory, config);
//!
//! step.setup()?;
//! step.fit(&inputs, &targets)?;
//! let outputs = step.transform(&inputs)?;
//! ```
//!
//! Training iteration (batching, shuffling, epochs) is the caller's job:
//! `fit` performs exactly one optimizer step.

pub mod checkpoint;
pub mod model;
pub mod step;
pub mod tensor;

use std::path::PathBuf;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{Checkpoint, CheckpointManager, CheckpointMeta};
    pub use crate::model::{
        CandleModelStep, CheckpointStepSaver, ModelFactory, ModelStepConfig, StepOptimizer,
    };
    pub use crate::step::{ExecutionContext, FitTransform, Step, StepSaver};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint metadata error: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Step is not initialized: call setup() before {0}")]
    NotInitialized(&'static str),

    #[error("No checkpoint found under {}", .dir.display())]
    NoCheckpoint { dir: PathBuf },
}

pub type Result<T> = std::result::Result<T, FlowError>;
