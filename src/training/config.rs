use serde::{Serialize, Deserialize};
use std::str::FromStr;

/// Built-in objectives selectable from configuration.
///
/// A caller-supplied cost is attached with
/// [`Trainer::with_objective`](super::Trainer::with_objective) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Mean squared error, for plain and denoising autoencoders
    #[default]
    Mse,
    /// Binary cross-entropy over labeled rows
    BinaryCrossEntropy,
    /// Categorical cross-entropy over labeled rows
    CrossEntropy,
}

impl FromStr for ObjectiveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mse" => Ok(ObjectiveKind::Mse),
            "binary_cross_entropy" => Ok(ObjectiveKind::BinaryCrossEntropy),
            "cross_entropy" | "categorical_crossentropy" => Ok(ObjectiveKind::CrossEntropy),
            other => Err(format!("unknown objective: {}", other)),
        }
    }
}

/// Hyper-parameters of one training run
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Adam step size
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    #[serde(default = "default_beta1")]
    pub beta1: f32,
    #[serde(default = "default_beta2")]
    pub beta2: f32,
    #[serde(default = "default_eps")]
    pub eps: f32,
    #[serde(default)]
    pub l1_weight: f32,
    #[serde(default = "default_l2_weight")]
    pub l2_weight: f32,
    #[serde(default)]
    pub objective: ObjectiveKind,
    /// Seed for batch shuffling
    #[serde(default)]
    pub seed: u64,
    /// Emit progress lines through `log`
    #[serde(default = "default_logging")]
    pub logging: bool,
}

// Default values for optional fields
fn default_epochs() -> usize { 100 }
fn default_batch_size() -> usize { 32 }
fn default_alpha() -> f32 { 0.001 }
fn default_beta1() -> f32 { 0.9 }
fn default_beta2() -> f32 { 0.999 }
fn default_eps() -> f32 { 1e-8 }
fn default_l2_weight() -> f32 { 0.1 }
fn default_logging() -> bool { true }

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            alpha: default_alpha(),
            beta1: default_beta1(),
            beta2: default_beta2(),
            eps: default_eps(),
            l1_weight: 0.0,
            l2_weight: default_l2_weight(),
            objective: ObjectiveKind::Mse,
            seed: 0,
            logging: default_logging(),
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    pub fn l1_weight(mut self, weight: f32) -> Self {
        self.l1_weight = weight;
        self
    }

    pub fn l2_weight(mut self, weight: f32) -> Self {
        self.l2_weight = weight;
        self
    }

    pub fn objective(mut self, objective: ObjectiveKind) -> Self {
        self.objective = objective;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// Rejects values no run can use
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch size must be positive".into());
        }
        if self.alpha.is_nan() || self.alpha <= 0.0 {
            return Err(format!("alpha must be positive, got {}", self.alpha));
        }
        if !(0.0..1.0).contains(&self.beta1) || !(0.0..1.0).contains(&self.beta2) {
            return Err(format!(
                "decay rates must lie in [0, 1), got beta1={} beta2={}",
                self.beta1, self.beta2
            ));
        }
        if !(self.eps.is_finite() && self.eps >= 0.0) {
            return Err(format!("eps must be finite and non-negative, got {}", self.eps));
        }
        if self.l1_weight < 0.0 || self.l2_weight < 0.0 {
            return Err("regularisation weights must be non-negative".into());
        }
        Ok(())
    }
}
