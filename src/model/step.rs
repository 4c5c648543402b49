//! The candle model step adapter.

use super::config::ModelStepConfig;
use super::factory::{ModelFactory, StepOptimizer};
use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::step::{FitTransform, Step};
use crate::{tensor, FlowError, Result};
use candle_core::{DType, Device, Module};
use candle_nn::{VarBuilder, VarMap};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Runtime resources held only while the step is initialized.
struct LiveState {
    model: Box<dyn Module + Send>,
    optimizer: Box<dyn StepOptimizer + Send>,
    checkpoint: Checkpoint,
    manager: CheckpointManager,
}

/// A pipeline step wrapping a candle model.
///
/// Construction is cheap and leaves the step uninitialized; `setup` builds
/// the model, optimizer, checkpoint, and checkpoint manager through the
/// factory. `strip` releases them again, leaving a remainder (factory,
/// config, flag, last loss) that serializes with serde whenever the factory
/// type does. The weights themselves live only in the checkpoint directory.
///
/// `fit` performs exactly one optimizer step; iteration is the caller's job.
#[derive(Serialize, Deserialize)]
pub struct CandleModelStep<F: ModelFactory> {
    factory: F,
    config: ModelStepConfig,
    loss: Option<f64>,
    initialized: bool,
    #[serde(skip, default = "default_device")]
    device: Device,
    #[serde(skip)]
    state: Option<LiveState>,
}

fn default_device() -> Device {
    Device::Cpu
}

impl<F: ModelFactory> CandleModelStep<F> {
    /// Create an uninitialized step on the CPU device.
    pub fn new(factory: F, config: ModelStepConfig) -> Self {
        Self {
            factory,
            config,
            loss: None,
            initialized: false,
            device: default_device(),
            state: None,
        }
    }

    /// Place model and tensors on the given device.
    ///
    /// Only meaningful before `setup`; live state built on another device is
    /// not migrated.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Build model, optimizer, checkpoint, and checkpoint manager.
    /// Idempotent: returns immediately if the step is already initialized.
    ///
    /// Factory failures are fatal and propagate unchanged.
    pub fn setup(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &self.device);
        // The optimizer takes the variable list at construction, so the
        // model has to exist first for its parameters to be registered.
        let model = self.factory.build_model(vb, &self.config)?;
        let optimizer = self.factory.build_optimizer(varmap.all_vars(), &self.config)?;

        let checkpoint = Checkpoint::new(varmap);
        let manager = CheckpointManager::new(&self.config.checkpoint_dir, self.config.max_to_keep);

        self.state = Some(LiveState {
            model,
            optimizer,
            checkpoint,
            manager,
        });
        self.initialized = true;
        tracing::debug!(dir = %self.config.checkpoint_dir.display(), "Model step initialized");

        Ok(())
    }

    /// Release model, optimizer, checkpoint, and checkpoint manager.
    ///
    /// Does not touch the initialization flag; savers own the flag around
    /// their persistence cycle. After this call the step holds no candle
    /// resources and is safe to hand to a generic serializer.
    pub fn strip(&mut self) {
        self.state = None;
    }

    /// Run one training step: forward, loss, backward, optimizer update.
    /// Advances the checkpoint step counter and records the scalar loss.
    pub fn fit(&mut self, data_inputs: &ArrayD<f32>, expected_outputs: &ArrayD<f32>) -> Result<()> {
        let x = tensor::to_tensor(data_inputs, &self.device)?;
        let y = tensor::to_tensor(expected_outputs, &self.device)?;

        let state = self
            .state
            .as_mut()
            .ok_or(FlowError::NotInitialized("fit"))?;

        let output = state.model.forward(&x)?;
        let loss = self.factory.loss(&y, &output)?;
        let grads = loss.backward()?;
        state.optimizer.step(&grads)?;
        state.checkpoint.increment_step();

        self.loss = Some(loss.to_dtype(DType::F64)?.to_scalar::<f64>()?);
        Ok(())
    }

    /// Run the forward pass only and convert the result back to an array.
    /// Detached: no gradients are recorded, no weights change.
    pub fn transform(&self, data_inputs: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let state = self
            .state
            .as_ref()
            .ok_or(FlowError::NotInitialized("transform"))?;

        let x = tensor::to_tensor(data_inputs, &self.device)?;
        let output = state.model.forward(&x)?.detach();
        tensor::to_array(&output)
    }

    /// Restore the tracked variables from the most recent checkpoint,
    /// overwriting the current weights.
    pub fn restore_latest(&mut self) -> Result<()> {
        let state = self
            .state
            .as_mut()
            .ok_or(FlowError::NotInitialized("restore_latest"))?;
        state.manager.restore_latest(&mut state.checkpoint)
    }

    /// Loss recorded by the most recent `fit`, if any.
    pub fn last_loss(&self) -> Option<f64> {
        self.loss
    }

    /// The step's configuration.
    pub fn config(&self) -> &ModelStepConfig {
        &self.config
    }

    /// The device model and tensors are placed on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Whether the step currently holds live candle resources.
    ///
    /// Differs from `is_initialized` only in the half-state a saver leaves
    /// behind: after `save_step` the flag stays true while resources are
    /// gone, and only `load_step` makes the step usable again.
    pub fn has_live_resources(&self) -> bool {
        self.state.is_some()
    }

    /// The live checkpoint, if the step holds resources.
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.state.as_ref().map(|s| &s.checkpoint)
    }

    /// The live checkpoint manager, if the step holds resources.
    pub fn checkpoint_manager(&self) -> Option<&CheckpointManager> {
        self.state.as_ref().map(|s| &s.manager)
    }

    /// Manager and checkpoint together, for savers.
    pub fn checkpoint_parts(&self) -> Option<(&CheckpointManager, &Checkpoint)> {
        self.state.as_ref().map(|s| (&s.manager, &s.checkpoint))
    }
}

impl<F: ModelFactory> Step for CandleModelStep<F> {
    fn setup(&mut self) -> Result<()> {
        CandleModelStep::setup(self)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }
}

impl<F: ModelFactory> FitTransform for CandleModelStep<F> {
    fn fit(&mut self, data_inputs: &ArrayD<f32>, expected_outputs: &ArrayD<f32>) -> Result<()> {
        CandleModelStep::fit(self, data_inputs, expected_outputs)
    }

    fn transform(&self, data_inputs: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        CandleModelStep::transform(self, data_inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Tensor, Var};
    use candle_nn::{Optimizer, SGD};
    use ndarray::Array2;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize, Clone)]
    struct LinearFactory {
        in_dim: usize,
        out_dim: usize,
    }

    impl ModelFactory for LinearFactory {
        fn build_model(
            &self,
            vb: VarBuilder,
            _config: &ModelStepConfig,
        ) -> candle_core::Result<Box<dyn Module + Send>> {
            let layer = candle_nn::linear_no_bias(self.in_dim, self.out_dim, vb.pp("linear"))?;
            Ok(Box::new(layer))
        }

        fn loss(&self, expected: &Tensor, predicted: &Tensor) -> candle_core::Result<Tensor> {
            candle_nn::loss::mse(predicted, expected)
        }

        fn build_optimizer(
            &self,
            vars: Vec<Var>,
            config: &ModelStepConfig,
        ) -> candle_core::Result<Box<dyn StepOptimizer + Send>> {
            let sgd = SGD::new(vars, config.param_or("learning_rate", 0.05))?;
            Ok(Box::new(sgd))
        }
    }

    fn test_step(dir: &std::path::Path) -> CandleModelStep<LinearFactory> {
        CandleModelStep::new(
            LinearFactory {
                in_dim: 1,
                out_dim: 1,
            },
            ModelStepConfig::new(dir),
        )
    }

    fn batch(values: &[f32]) -> ArrayD<f32> {
        Array2::from_shape_vec((values.len(), 1), values.to_vec())
            .unwrap()
            .into_dyn()
    }

    #[test]
    fn test_setup_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut step = test_step(dir.path());

        step.setup().unwrap();
        assert!(step.is_initialized());
        assert!(step.has_live_resources());

        // Mark the weights, then re-run setup: nothing may be rebuilt
        let marked = Tensor::full(7.0f32, (1, 1), &Device::Cpu).unwrap();
        step.checkpoint().unwrap().varmap().all_vars()[0]
            .set(&marked)
            .unwrap();

        step.setup().unwrap();
        let weights = step.checkpoint().unwrap().varmap().all_vars()[0]
            .as_tensor()
            .to_vec2::<f32>()
            .unwrap();
        assert_eq!(weights, vec![vec![7.0]]);
    }

    #[test]
    fn test_strip_clears_resources_but_not_flag() {
        let dir = tempdir().unwrap();
        let mut step = test_step(dir.path());
        step.setup().unwrap();

        step.strip();

        assert!(!step.has_live_resources());
        assert!(step.checkpoint().is_none());
        assert!(step.checkpoint_manager().is_none());
        assert!(step.is_initialized());
    }

    #[test]
    fn test_fit_requires_setup() {
        let dir = tempdir().unwrap();
        let mut step = test_step(dir.path());

        let err = step.fit(&batch(&[1.0]), &batch(&[2.0])).unwrap_err();
        assert!(matches!(err, FlowError::NotInitialized(_)));

        let err = step.transform(&batch(&[1.0])).unwrap_err();
        assert!(matches!(err, FlowError::NotInitialized(_)));
    }

    #[test]
    fn test_fit_records_loss_and_updates_weights() {
        let dir = tempdir().unwrap();
        let mut step = test_step(dir.path());
        step.setup().unwrap();

        let x = batch(&[1.0, 2.0]);
        let y = batch(&[3.0, 6.0]);

        let before = step.transform(&x).unwrap();
        assert!(step.last_loss().is_none());

        step.fit(&x, &y).unwrap();

        assert!(step.last_loss().is_some());
        assert_eq!(step.checkpoint().unwrap().step(), 2);

        let after = step.transform(&x).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_fit_converges_on_linear_target() {
        let dir = tempdir().unwrap();
        let mut step = test_step(dir.path());
        step.setup().unwrap();

        // y = 3x is exactly representable by a 1x1 linear layer
        let x = batch(&[1.0, 2.0, -1.0]);
        let y = batch(&[3.0, 6.0, -3.0]);

        for _ in 0..200 {
            step.fit(&x, &y).unwrap();
        }

        assert!(step.last_loss().unwrap() < 1e-3);
    }

    #[test]
    fn test_transform_does_not_mutate_weights() {
        let dir = tempdir().unwrap();
        let mut step = test_step(dir.path());
        step.setup().unwrap();

        let x = batch(&[1.0, 2.0, 3.0]);
        let first = step.transform(&x).unwrap();
        let second = step.transform(&x).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_usable_as_trait_object() {
        let dir = tempdir().unwrap();
        let mut step = test_step(dir.path());

        let dyn_step: &mut dyn FitTransform = &mut step;
        dyn_step.setup().unwrap();
        dyn_step.fit(&batch(&[1.0]), &batch(&[2.0])).unwrap();
        let out = dyn_step.transform(&batch(&[1.0])).unwrap();

        assert_eq!(out.shape(), &[1, 1]);
        assert!(dyn_step.is_initialized());
    }

    #[test]
    fn test_stripped_step_serializes() {
        let dir = tempdir().unwrap();
        let mut step = test_step(dir.path());
        step.setup().unwrap();
        step.fit(&batch(&[1.0]), &batch(&[2.0])).unwrap();
        step.strip();

        let json = serde_json::to_string(&step).unwrap();
        let restored: CandleModelStep<LinearFactory> = serde_json::from_str(&json).unwrap();

        assert!(restored.is_initialized());
        assert!(!restored.has_live_resources());
        assert_eq!(restored.last_loss(), step.last_loss());
        assert_eq!(restored.config().checkpoint_dir, step.config().checkpoint_dir);
    }
}
