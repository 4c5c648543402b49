//! Checkpoint-backed saver for candle model steps.

use super::factory::ModelFactory;
use super::step::CandleModelStep;
use crate::step::{ExecutionContext, Step, StepSaver};
use crate::{FlowError, Result};

/// Persists a `CandleModelStep` through its checkpoint manager.
///
/// `save_step` writes the current weights to the step's checkpoint directory
/// and strips the live resources, leaving the initialization flag set: the
/// engine's generic serialization runs right after, and `load_step` is
/// required before the step is usable again. `load_step` rebuilds everything
/// from the factory and overwrites the fresh weights with the most recent
/// checkpoint.
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckpointStepSaver;

impl CheckpointStepSaver {
    pub fn new() -> Self {
        Self
    }
}

impl<F: ModelFactory> StepSaver<CandleModelStep<F>> for CheckpointStepSaver {
    fn save_step(&self, step: &mut CandleModelStep<F>, _context: &ExecutionContext) -> Result<()> {
        {
            let (manager, checkpoint) = step
                .checkpoint_parts()
                .ok_or(FlowError::NotInitialized("save_step"))?;
            manager.save(checkpoint)?;
        }

        // Flag stays true until load_step; only generic serialization may
        // touch the step in between.
        step.strip();
        Ok(())
    }

    fn load_step(&self, step: &mut CandleModelStep<F>, _context: &ExecutionContext) -> Result<()> {
        step.set_initialized(false);
        step.setup()?;
        step.restore_latest()?;
        tracing::debug!("Model step restored from checkpoint");
        Ok(())
    }

    fn can_load(&self, _step: &CandleModelStep<F>, _context: &ExecutionContext) -> bool {
        true
    }
}
