//! Configuration of communicating agents.
use crate::{action::ActionSelector, opt::OptimizerConfig, util::CriticLoss, Device};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// What the agents exchange and how their critics are formed.
///
/// `H` is the width of a thought, `N` the number of agents.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum CommKind {
    /// Policy and state-value critic over the own thought and the thoughts
    /// of all neighbors (`H * N`).
    ThoughtShare,

    /// Policy over all thoughts. The critic evaluates all thoughts and all
    /// actions, and the advantage is counterfactual: the value of the
    /// taken action minus the value expected under the policy of the agent
    /// with the other actions fixed.
    CounterfactualThoughtShare,

    /// Policy over all thoughts; state-value critic over all thoughts and
    /// the actions of the neighbors.
    HybridShare,

    /// Policy over the own thought and the global thought, the mean of the
    /// thoughts of all agents (`2 * H`); state-value critic over those and
    /// the actions of the neighbors.
    GlobalThought,

    /// Policy as [`CommKind::GlobalThought`]. The critic evaluates the
    /// global thought and the actions of the neighbors, and returns the
    /// values of the own actions as a state value plus a zero-mean advantage.
    GlobalThoughtAdvantage,
}

impl CommKind {
    /// Name used in log messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ThoughtShare => "ACC",
            Self::CounterfactualThoughtShare => "SIC",
            Self::HybridShare => "ACHAC",
            Self::GlobalThought => "SIHA",
            Self::GlobalThoughtAdvantage => "SIHCA",
        }
    }

    /// Returns `true` if the policy sees the global thought instead of the
    /// thoughts of the neighbors.
    pub fn uses_global_thought(&self) -> bool {
        matches!(self, Self::GlobalThought | Self::GlobalThoughtAdvantage)
    }

    /// Returns `true` if the critic estimates action values instead of state values.
    pub fn action_valued(&self) -> bool {
        matches!(
            self,
            Self::CounterfactualThoughtShare | Self::GlobalThoughtAdvantage
        )
    }
}

/// Configuration of [`Comm`](super::Comm).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CommConfig {
    /// Exchange between the agents.
    pub kind: CommKind,

    /// Optimizer of the networks of all agents.
    pub opt_config: OptimizerConfig,

    /// Hidden units of the MLP applied to the observation before the LSTM cell.
    pub units: Vec<i64>,

    /// Width of the input of the LSTM cell.
    pub x_dim: i64,

    /// Width of a thought.
    pub hidden_size: i64,

    /// Discount factor.
    pub discount_factor: f64,

    /// Rate of the soft update of the target networks.
    pub tau: f64,

    /// Number of stored transitions before updates start.
    pub min_transitions_warmup: usize,

    /// Loss between critic values and their targets.
    pub critic_loss: CriticLoss,

    /// Maximum norm of the gradients. No clipping if `None`.
    pub clip_grad_norm: Option<f64>,

    /// Selection of actions from the logits of the policies.
    pub action_selector: ActionSelector,

    /// Device.
    pub device: Device,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            kind: CommKind::ThoughtShare,
            opt_config: OptimizerConfig::default(),
            units: vec![64],
            x_dim: 32,
            hidden_size: 32,
            discount_factor: 0.95,
            tau: 0.01,
            min_transitions_warmup: 1,
            critic_loss: CriticLoss::SmoothL1,
            clip_grad_norm: Some(10.0),
            action_selector: ActionSelector::default(),
            device: Device::default(),
        }
    }
}

impl CommConfig {
    /// Sets the exchange between the agents.
    pub fn kind(mut self, v: CommKind) -> Self {
        self.kind = v;
        self
    }

    /// Sets the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the width of a thought.
    pub fn hidden_size(mut self, v: i64) -> Self {
        self.hidden_size = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.discount_factor = v;
        self
    }

    /// Sets the rate of the soft update.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Sets the number of transitions before updates start.
    pub fn min_transitions_warmup(mut self, v: usize) -> Self {
        self.min_transitions_warmup = v;
        self
    }

    /// Sets the maximum norm of the gradients.
    pub fn clip_grad_norm(mut self, v: Option<f64>) -> Self {
        self.clip_grad_norm = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
