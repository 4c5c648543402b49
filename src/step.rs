//! Core step and saver trait definitions.

use crate::Result;
use ndarray::ArrayD;
use std::path::{Path, PathBuf};

/// Execution context handed to savers by the pipeline engine.
///
/// Carries the root path the engine serializes into. Steps that manage their
/// own persistence (e.g. checkpoint directories) may ignore it.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    root: PathBuf,
}

impl ExecutionContext {
    /// Create a context rooted at the given path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root path of this execution.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Lifecycle contract a pipeline engine drives on every step.
///
/// `setup` is idempotent; the initialization flag tells the engine whether
/// the step currently holds live resources. Savers toggle the flag around
/// their own strip/rebuild cycle, so it is exposed for writing too.
pub trait Step {
    /// Acquire the step's runtime resources. Idempotent.
    fn setup(&mut self) -> Result<()>;

    /// Whether `setup` has run and not been undone by a saver.
    fn is_initialized(&self) -> bool;

    /// Force the initialization flag. Reserved for savers.
    fn set_initialized(&mut self, initialized: bool);
}

/// Data surface of a trainable step: one training step and a forward pass,
/// both over dynamic-dimensional `f32` arrays.
pub trait FitTransform: Step {
    /// Run a single in-place training step on one batch.
    fn fit(&mut self, data_inputs: &ArrayD<f32>, expected_outputs: &ArrayD<f32>) -> Result<()>;

    /// Run the forward pass only. Does not mutate weights.
    fn transform(&self, data_inputs: &ArrayD<f32>) -> Result<ArrayD<f32>>;
}

/// Capability pair consumed by the engine's generic persistence orchestrator.
///
/// `save_step` must leave the step in a state the engine's generic
/// serialization can handle; `load_step` must undo that and return the step
/// to a fully usable state.
pub trait StepSaver<S: Step> {
    /// Persist the step's runtime state, then release it from the step.
    fn save_step(&self, step: &mut S, context: &ExecutionContext) -> Result<()>;

    /// Rebuild the step's runtime state and restore the persisted values.
    fn load_step(&self, step: &mut S, context: &ExecutionContext) -> Result<()>;

    /// Whether a load attempt is worth making. Failures still surface from
    /// `load_step` itself.
    fn can_load(&self, step: &S, context: &ExecutionContext) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_root() {
        let ctx = ExecutionContext::new("/tmp/pipeline");
        assert_eq!(ctx.root(), Path::new("/tmp/pipeline"));
    }
}
