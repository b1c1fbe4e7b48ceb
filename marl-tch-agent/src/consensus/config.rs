//! Configuration of consensus DQN.
use crate::{dqn::DqnExplorer, opt::OptimizerConfig, util::CriticLoss, Device};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`ConsensusDqn`](super::ConsensusDqn).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ConsensusConfig {
    /// Optimizer of the networks of all agents.
    pub opt_config: OptimizerConfig,

    /// Hidden units of the encoder of observations into thoughts.
    pub units: Vec<i64>,

    /// Width of a thought.
    pub hidden_size: i64,

    /// If `true`, the shared baseline is evaluated on the mean of the
    /// thoughts of all agents. Otherwise on the thought of each agent.
    pub consensus: bool,

    /// Discount factor.
    pub discount_factor: f64,

    /// Rate of the soft update of the target networks.
    pub tau: f64,

    /// Batch size.
    pub batch_size: usize,

    /// Number of stored transitions before updates start.
    pub min_transitions_warmup: usize,

    /// Exploration strategy.
    pub explorer: DqnExplorer,

    /// Loss between action values and their targets.
    pub critic_loss: CriticLoss,

    /// Maximum norm of the gradients. No clipping if `None`.
    pub clip_grad_norm: Option<f64>,

    /// Device.
    pub device: Device,

    /// Seed of the explorers. Agent `i` uses `seed + i`.
    #[serde(default)]
    pub seed: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            opt_config: OptimizerConfig::default(),
            units: vec![64],
            hidden_size: 32,
            consensus: true,
            discount_factor: 0.95,
            tau: 0.01,
            batch_size: 128,
            min_transitions_warmup: 1,
            explorer: DqnExplorer::default(),
            critic_loss: CriticLoss::Mse,
            clip_grad_norm: Some(10.0),
            device: Device::default(),
            seed: 0,
        }
    }
}

impl ConsensusConfig {
    /// Sets the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets whether the baseline is evaluated on the consensus thought.
    pub fn consensus(mut self, v: bool) -> Self {
        self.consensus = v;
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

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the number of transitions before updates start.
    pub fn min_transitions_warmup(mut self, v: usize) -> Self {
        self.min_transitions_warmup = v;
        self
    }

    /// Sets the exploration strategy.
    pub fn explorer(mut self, v: DqnExplorer) -> Self {
        self.explorer = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Sets the seed of the explorers.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
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
