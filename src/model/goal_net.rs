//! Goal regression network
//!
//! Architecture: Input(features) → Hidden1(128) → ReLU → Dropout
//!                               → Hidden2(64)  → ReLU → Dropout
//!                               → goals_head(2)
//!
//! The two outputs are Team A and Team B expected goals, in standardized
//! target space. Clamping to non-negative happens at the serving edge.

use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::record::{FullPrecisionSettings, Recorder};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Configuration for the goal regression net
#[derive(Debug, Clone)]
pub struct GoalNetConfig {
    /// Input dimension (assembled feature columns)
    pub input_dim: usize,
    /// Output dimension (one per target column)
    pub output_dim: usize,
    /// Hidden layer dimensions (e.g., [128, 64] for two layers)
    pub hidden_dims: Vec<usize>,
    /// Dropout rate
    pub dropout: f64,
}

/// A single hidden layer block: Linear → ReLU → Dropout
#[derive(Module, Debug)]
pub struct HiddenBlock<B: Backend> {
    linear: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> HiddenBlock<B> {
    pub fn new(device: &B::Device, in_dim: usize, out_dim: usize, dropout: f64) -> Self {
        HiddenBlock {
            linear: LinearConfig::new(in_dim, out_dim).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.linear.forward(x);
        let x = relu(x);
        self.dropout.forward(x)
    }
}

/// Fully connected regression net over the assembled feature row
#[derive(Module, Debug)]
pub struct GoalNet<B: Backend> {
    hidden1: HiddenBlock<B>,
    hidden2: Option<HiddenBlock<B>>,
    goals_head: Linear<B>,
}

impl<B: Backend> GoalNet<B> {
    /// Create a new goal regression net
    pub fn new(device: &B::Device, config: &GoalNetConfig) -> Self {
        let hidden1 = HiddenBlock::new(
            device,
            config.input_dim,
            config.hidden_dims.first().copied().unwrap_or(64),
            config.dropout,
        );

        let (hidden2, head_input_dim) = if config.hidden_dims.len() > 1 {
            let h2 = HiddenBlock::new(
                device,
                config.hidden_dims[0],
                config.hidden_dims[1],
                config.dropout,
            );
            (Some(h2), config.hidden_dims[1])
        } else {
            (None, config.hidden_dims.first().copied().unwrap_or(64))
        };

        GoalNet {
            hidden1,
            hidden2,
            goals_head: LinearConfig::new(head_input_dim, config.output_dim).init(device),
        }
    }

    /// Forward pass: [batch, input_dim] → [batch, output_dim]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.hidden1.forward(features);
        let x = if let Some(h2) = &self.hidden2 {
            h2.forward(x)
        } else {
            x
        };
        self.goals_head.forward(x)
    }

    /// Save model weights to file
    pub fn save(&self, path: &str) -> crate::Result<()>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(self.clone().into_record(), path.into())
            .map_err(|e| crate::XgoalsError::Model(e.to_string()))
    }

    /// Load model weights from file
    pub fn load(device: &B::Device, path: &str, config: &GoalNetConfig) -> crate::Result<Self>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(path.into(), device)
            .map_err(|e| crate::XgoalsError::Model(e.to_string()))?;

        let model = Self::new(device, config);
        Ok(model.load_record(record))
    }
}
