//! Model step configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration for a model step.
///
/// Factories receive this when building the model and optimizer, so any
/// architecture or training knob a factory needs can ride along in the
/// hyperparameter map without the factory holding a back-reference to the
/// step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelStepConfig {
    /// Directory checkpoints are written to
    pub checkpoint_dir: PathBuf,
    /// Keep only the last N checkpoints (0 = keep all)
    pub max_to_keep: usize,
    /// Named numeric hyperparameters exposed to the factories
    pub hyperparams: HashMap<String, f64>,
}

impl Default for ModelStepConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("candle_ckpts"),
            max_to_keep: 3,
            hyperparams: HashMap::new(),
        }
    }
}

impl ModelStepConfig {
    /// Create a new config with the given checkpoint directory.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    /// Set the checkpoint retention bound.
    pub fn max_to_keep(mut self, n: usize) -> Self {
        self.max_to_keep = n;
        self
    }

    /// Set a named hyperparameter.
    pub fn hyperparam(mut self, name: impl Into<String>, value: f64) -> Self {
        self.hyperparams.insert(name.into(), value);
        self
    }

    /// Look up a hyperparameter.
    pub fn param(&self, name: &str) -> Option<f64> {
        self.hyperparams.get(name).copied()
    }

    /// Look up a hyperparameter, falling back to a default.
    pub fn param_or(&self, name: &str, default: f64) -> f64 {
        self.param(name).unwrap_or(default)
    }
}
