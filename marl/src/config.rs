//! Configuration of a run.
use crate::env::SwitchEnvConfig;
use anyhow::Result;
use marl_core::{replay_buffer::TransitionStoreConfig, TrainerConfig};
use marl_tch_agent::{
    comm::CommConfig, consensus::ConsensusConfig, dqn::DqnConfig, maddpg::MaddpgConfig,
    opt::OptimizerConfig, Device,
};
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configurations of the environment, the trainer and every algorithm.
///
/// Only the configuration of the selected algorithm is used in a run.
/// Missing fields of a YAML file take their default values.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct RunConfig {
    /// Environment.
    pub env: SwitchEnvConfig,

    /// Trainer.
    pub trainer: TrainerConfig,

    /// Transition store.
    pub store: TransitionStoreConfig,

    /// Independent and value-decomposition Q-learning.
    pub dqn: DqnConfig,

    /// MADDPG.
    pub maddpg: MaddpgConfig,

    /// Communicating agents.
    pub comm: CommConfig,

    /// Consensus Q-learning.
    pub consensus: ConsensusConfig,
}

fn set_lr(opt_config: &mut OptimizerConfig, v: f64) {
    *opt_config = opt_config.clone().learning_rate(v);
}

impl RunConfig {
    /// Sets the learning rate of every algorithm.
    pub fn learning_rate(mut self, v: f64) -> Self {
        set_lr(&mut self.dqn.opt_config, v);
        set_lr(&mut self.maddpg.opt_config, v);
        set_lr(&mut self.comm.opt_config, v);
        set_lr(&mut self.consensus.opt_config, v);
        self
    }

    /// Sets the discount factor of every algorithm.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.dqn.discount_factor = v;
        self.maddpg.discount_factor = v;
        self.comm.discount_factor = v;
        self.consensus.discount_factor = v;
        self
    }

    /// Sets the batch size of the algorithms learning from sampled batches.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.dqn.batch_size = v;
        self.maddpg.batch_size = v;
        self.consensus.batch_size = v;
        self
    }

    /// Sets the device of every algorithm.
    pub fn device(mut self, v: Device) -> Self {
        self.dqn.device = v;
        self.maddpg.device = v;
        self.comm.device = v;
        self.consensus.device = v;
        self
    }

    /// Sets the seed of the transition store and the explorers.
    pub fn seed(mut self, v: u64) -> Self {
        self.store = self.store.seed(v);
        self.dqn.seed = v;
        self.consensus.seed = v;
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
