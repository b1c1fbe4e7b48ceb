use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Mlp`](super::Mlp).
pub struct MlpConfig {
    pub(super) in_dim: i64,
    pub(super) units: Vec<i64>,
    pub(super) out_dim: i64,
    pub(super) activation_out: bool,
    #[serde(default)]
    pub(super) zero_init_out: bool,
    #[serde(default)]
    pub(super) zero_bias_out: bool,
}

impl MlpConfig {
    /// Creates configuration of an MLP.
    pub fn new(in_dim: i64, units: Vec<i64>, out_dim: i64) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
            activation_out: false,
            zero_init_out: false,
            zero_bias_out: false,
        }
    }

    /// Applies ReLU to the output.
    pub fn activation_out(mut self, v: bool) -> Self {
        self.activation_out = v;
        self
    }

    /// Initializes the weight and bias of the output layer with zero.
    pub fn zero_init_out(mut self, v: bool) -> Self {
        self.zero_init_out = v;
        self
    }

    /// Initializes the bias of the output layer with zero.
    pub fn zero_bias_out(mut self, v: bool) -> Self {
        self.zero_bias_out = v;
        self
    }

    /// Output dimension.
    pub fn out_dim(&self) -> i64 {
        self.out_dim
    }
}
