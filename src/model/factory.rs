//! Factory and optimizer seams between a step and the candle runtime.

use super::config::ModelStepConfig;
use candle_core::backprop::GradStore;
use candle_core::{Module, Tensor, Var};
use candle_nn::{Optimizer, VarBuilder};

/// User-supplied builders for the wrapped model, loss, and optimizer.
///
/// `build_model` must register every trainable parameter through the given
/// `VarBuilder`; that is what ties the parameters to the step's checkpoint
/// and hands them to the optimizer. Both builders receive the step config so
/// hyperparameters can flow in without a back-reference to the step.
///
/// Builder failures are fatal to `setup` and propagate unchanged.
pub trait ModelFactory: Send {
    /// Build the model, registering its parameters in the builder's map.
    fn build_model(
        &self,
        vb: VarBuilder,
        config: &ModelStepConfig,
    ) -> candle_core::Result<Box<dyn Module + Send>>;

    /// Compute the training loss from expected and predicted outputs.
    ///
    /// Must return a scalar tensor reachable from the model's parameters,
    /// otherwise `backward` yields no gradients.
    fn loss(&self, expected: &Tensor, predicted: &Tensor) -> candle_core::Result<Tensor>;

    /// Build the optimizer over the model's trainable variables.
    fn build_optimizer(
        &self,
        vars: Vec<Var>,
        config: &ModelStepConfig,
    ) -> candle_core::Result<Box<dyn StepOptimizer + Send>>;
}

/// Object-safe surface over candle optimizers.
///
/// `candle_nn::Optimizer` carries an associated config type and constructor,
/// so it cannot be boxed directly; steps hold optimizers behind this trait
/// instead. Every candle optimizer gets the impl for free.
pub trait StepOptimizer {
    /// Apply one update from the recorded gradients.
    fn step(&mut self, grads: &GradStore) -> candle_core::Result<()>;

    /// Current learning rate.
    fn learning_rate(&self) -> f64;

    /// Replace the learning rate.
    fn set_learning_rate(&mut self, lr: f64);
}

impl<O: Optimizer> StepOptimizer for O {
    fn step(&mut self, grads: &GradStore) -> candle_core::Result<()> {
        Optimizer::step(self, grads)
    }

    fn learning_rate(&self) -> f64 {
        Optimizer::learning_rate(self)
    }

    fn set_learning_rate(&mut self, lr: f64) {
        Optimizer::set_learning_rate(self, lr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{VarMap, SGD};

    #[test]
    fn test_candle_optimizers_are_step_optimizers() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let _layer = candle_nn::linear(2, 2, vb.pp("lin")).unwrap();

        let sgd = SGD::new(varmap.all_vars(), 0.1).unwrap();
        let mut boxed: Box<dyn StepOptimizer + Send> = Box::new(sgd);

        assert!((boxed.learning_rate() - 0.1).abs() < 1e-12);
        boxed.set_learning_rate(0.05);
        assert!((boxed.learning_rate() - 0.05).abs() < 1e-12);
    }
}
