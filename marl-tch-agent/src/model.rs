//! Containers of the parameters of all agents.
mod base;
pub use base::{AgentNet, ModelBase, SubModel};

use crate::opt::{Optimizer, OptimizerConfig};
use anyhow::{anyhow, Result};
use log::{info, trace};
use std::path::Path;
use tch::{nn, Tensor};

/// Networks of `N` agents in a single [`nn::VarStore`].
///
/// Agent `i` lives under the path `agent_{i}`. The live model owns the
/// optimizer of all parameters. A target model made with
/// [`MultiAgentModel::target`] has frozen parameters and no optimizer;
/// it is only changed by [`track`](crate::util::track).
pub struct MultiAgentModel<A: AgentNet> {
    var_store: nn::VarStore,
    configs: Vec<A::Config>,
    agents: Vec<A>,
    opt: Option<Optimizer>,
}

impl<A: AgentNet> MultiAgentModel<A> {
    fn build_agents(var_store: &nn::VarStore, configs: &[A::Config]) -> Result<Vec<A>> {
        let root = var_store.root();
        configs
            .iter()
            .enumerate()
            .map(|(i, config)| A::build(&(&root / format!("agent_{}", i)), config))
            .collect()
    }

    /// Builds the networks of the agents, one per configuration.
    pub fn build(
        configs: Vec<A::Config>,
        opt_config: &OptimizerConfig,
        device: tch::Device,
    ) -> Result<Self> {
        let var_store = nn::VarStore::new(device);
        let agents = Self::build_agents(&var_store, &configs)?;
        let opt = opt_config.build(&var_store)?;

        Ok(Self {
            var_store,
            configs,
            agents,
            opt: Some(opt),
        })
    }

    /// Makes a target model with the same structure and parameters.
    pub fn target(&self) -> Result<Self> {
        let mut var_store = nn::VarStore::new(self.var_store.device());
        let agents = Self::build_agents(&var_store, &self.configs)?;
        var_store.copy(&self.var_store)?;
        var_store.freeze();

        Ok(Self {
            var_store,
            configs: self.configs.clone(),
            agents,
            opt: None,
        })
    }

    /// The networks of agent `i`.
    pub fn agent(&self, i: usize) -> &A {
        &self.agents[i]
    }

    /// The networks of all agents.
    pub fn agents(&self) -> &[A] {
        &self.agents
    }

    /// The number of agents.
    pub fn n_agents(&self) -> usize {
        self.agents.len()
    }

    /// The device of the parameters.
    pub fn device(&self) -> tch::Device {
        self.var_store.device()
    }

    /// Takes an optimization step, clipping the norm of the gradients if `max_norm` is given.
    pub fn step(&mut self, loss: &Tensor, max_norm: Option<f64>) -> Result<()> {
        let opt = self
            .opt
            .as_mut()
            .ok_or_else(|| anyhow!("The model has no optimizer"))?;
        opt.step(loss, max_norm);
        Ok(())
    }

    /// Takes an optimization step, clipping the gradients of each agent by their own norm.
    ///
    /// The update of an agent then does not depend on the gradients of the others.
    pub fn step_per_agent(&mut self, loss: &Tensor, max_norm: Option<f64>) -> Result<()> {
        let max_norm = match max_norm {
            Some(v) => v,
            None => return self.step(loss, None),
        };
        let groups: Vec<Vec<Tensor>> = (0..self.n_agents())
            .map(|i| self.agent_variables(i))
            .collect();
        let opt = self
            .opt
            .as_mut()
            .ok_or_else(|| anyhow!("The model has no optimizer"))?;
        opt.step_grouped(loss, max_norm, &groups);
        Ok(())
    }

    /// Trainable variables of agent `i`.
    pub fn agent_variables(&self, i: usize) -> Vec<Tensor> {
        let prefix = format!("agent_{}/", i);
        self.var_store
            .variables()
            .into_iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(_, v)| v)
            .collect()
    }
}

impl<A: AgentNet> ModelBase for MultiAgentModel<A> {
    fn get_var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.var_store
    }

    fn get_var_store(&self) -> &nn::VarStore {
        &self.var_store
    }

    fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.var_store.save(&path)?;
        info!("Save model to {:?}", path.as_ref());
        let vs = self.var_store.variables();
        for (name, _) in vs.iter() {
            trace!("Save variable {}", name);
        }
        Ok(())
    }

    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.var_store.load(&path)?;
        info!("Load model from {:?}", path.as_ref());
        Ok(())
    }
}
