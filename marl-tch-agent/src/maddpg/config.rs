//! Configuration of MADDPG.
use crate::{action::ActionSelector, opt::OptimizerConfig, util::CriticLoss, Device};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Maddpg`](super::Maddpg).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MaddpgConfig {
    /// Optimizer of the actors and critics of all agents.
    pub opt_config: OptimizerConfig,

    /// Hidden units of the actor of each agent.
    pub actor_units: Vec<i64>,

    /// Width of the embedding of the joint observation in the critic.
    pub critic_units: i64,

    /// Discount factor.
    pub discount_factor: f64,

    /// Rate of the soft update of the target networks.
    pub tau: f64,

    /// Batch size.
    pub batch_size: usize,

    /// Number of stored transitions before updates start.
    pub min_transitions_warmup: usize,

    /// Loss between critic values and their targets.
    pub critic_loss: CriticLoss,

    /// Maximum norm of the gradients. No clipping if `None`.
    pub clip_grad_norm: Option<f64>,

    /// Selection of actions from the outputs of the actors.
    pub action_selector: ActionSelector,

    /// If `true`, the bootstrapped joint action of the critic of agent `i`
    /// consists of the target actions of all agents. Otherwise only the
    /// action of agent `i` is replaced by its target action and the others
    /// are taken from the batch.
    pub target_all_agents: bool,

    /// Device.
    pub device: Device,
}

impl Default for MaddpgConfig {
    fn default() -> Self {
        Self {
            opt_config: OptimizerConfig::default(),
            actor_units: vec![32],
            critic_units: 128,
            discount_factor: 0.95,
            tau: 0.01,
            batch_size: 128,
            min_transitions_warmup: 1,
            critic_loss: CriticLoss::SmoothL1,
            clip_grad_norm: Some(10.0),
            action_selector: ActionSelector::default(),
            target_all_agents: false,
            device: Device::default(),
        }
    }
}

impl MaddpgConfig {
    /// Sets the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the hidden units of the actors.
    pub fn actor_units(mut self, v: Vec<i64>) -> Self {
        self.actor_units = v;
        self
    }

    /// Sets the width of the observation embedding of the critics.
    pub fn critic_units(mut self, v: i64) -> Self {
        self.critic_units = v;
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

    /// Sets the critic loss.
    pub fn critic_loss(mut self, v: CriticLoss) -> Self {
        self.critic_loss = v;
        self
    }

    /// Sets the maximum norm of the gradients.
    pub fn clip_grad_norm(mut self, v: Option<f64>) -> Self {
        self.clip_grad_norm = v;
        self
    }

    /// Sets the action selector.
    pub fn action_selector(mut self, v: ActionSelector) -> Self {
        self.action_selector = v;
        self
    }

    /// Bootstraps the critics with the target actions of all agents.
    pub fn target_all_agents(mut self, v: bool) -> Self {
        self.target_all_agents = v;
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
