//! Deterministic environment and algorithm used for tests.
use crate::{
    error::MarlError, record::Record, replay_buffer::TransitionStore, ActionSpace, Algorithm,
    Env, JointAct, JointObs, Step, Transition,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Configuration of [`StubEnv`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StubEnvConfig {
    /// Number of agents.
    pub n_agents: usize,

    /// Width of the observation of every agent.
    pub obs_dim: usize,

    /// Number of discrete actions of every agent.
    pub n_actions: usize,

    /// Reward of every agent at every step.
    pub reward: f32,

    /// Step at which every agent is done. Never done if `None`.
    pub done_at: Option<usize>,

    /// Step at which agent 0 is done, if earlier than the others.
    pub first_agent_done_at: Option<usize>,
}

impl Default for StubEnvConfig {
    fn default() -> Self {
        Self {
            n_agents: 3,
            obs_dim: 4,
            n_actions: 4,
            reward: 1.0,
            done_at: Some(10),
            first_agent_done_at: None,
        }
    }
}

impl StubEnvConfig {
    /// Sets the number of agents.
    pub fn n_agents(mut self, v: usize) -> Self {
        self.n_agents = v;
        self
    }

    /// Sets the width of observations.
    pub fn obs_dim(mut self, v: usize) -> Self {
        self.obs_dim = v;
        self
    }

    /// Sets the number of actions.
    pub fn n_actions(mut self, v: usize) -> Self {
        self.n_actions = v;
        self
    }

    /// Sets the reward per step.
    pub fn reward(mut self, v: f32) -> Self {
        self.reward = v;
        self
    }

    /// Sets the step at which every agent is done.
    pub fn done_at(mut self, v: Option<usize>) -> Self {
        self.done_at = v;
        self
    }

    /// Sets the step at which agent 0 is done.
    pub fn first_agent_done_at(mut self, v: Option<usize>) -> Self {
        self.first_agent_done_at = v;
        self
    }
}

/// An environment with fixed rewards and observations depending only on the step count.
///
/// Observation element `j` of agent `i` at step `t` is `0.1 * (t + i + j + 1)`.
pub struct StubEnv {
    config: StubEnvConfig,
    t: usize,
    closed: bool,
}

impl StubEnv {
    fn obs(&self) -> JointObs {
        JointObs(
            (0..self.config.n_agents)
                .map(|i| {
                    (0..self.config.obs_dim)
                        .map(|j| 0.1 * (self.t + i + j + 1) as f32)
                        .collect()
                })
                .collect(),
        )
    }

    fn is_done(&self, i: usize) -> bool {
        let done_at = match (i, self.config.first_agent_done_at) {
            (0, Some(t)) => Some(t),
            _ => self.config.done_at,
        };
        matches!(done_at, Some(t) if self.t >= t)
    }

    /// Returns `true` after [`Env::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Env for StubEnv {
    type Config = StubEnvConfig;

    fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            t: 0,
            closed: false,
        })
    }

    fn n_agents(&self) -> usize {
        self.config.n_agents
    }

    fn obs_dims(&self) -> Vec<usize> {
        vec![self.config.obs_dim; self.config.n_agents]
    }

    fn action_spaces(&self) -> Vec<ActionSpace> {
        vec![ActionSpace::Discrete(self.config.n_actions); self.config.n_agents]
    }

    fn reset(&mut self) -> Result<JointObs> {
        self.t = 0;
        Ok(self.obs())
    }

    fn step(&mut self, act: &JointAct) -> Result<(Step, Record)> {
        if act.n_agents() != self.config.n_agents {
            return Err(MarlError::AgentCountMismatch {
                expected: self.config.n_agents,
                actual: act.n_agents(),
            }
            .into());
        }
        self.t += 1;
        let is_done = (0..self.config.n_agents).map(|i| self.is_done(i)).collect();
        let step = Step::new(
            self.obs(),
            vec![self.config.reward; self.config.n_agents],
            is_done,
        );
        Ok((step, Record::empty()))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// A tensor-free algorithm counting its updates.
///
/// An update samples a batch and fails with no update while the store is underfull.
pub struct StubAlgorithm {
    n_agents: usize,
    n_actions: usize,
    batch_size: usize,
    n_updates: usize,
    train: bool,
    n_selections: usize,
}

impl StubAlgorithm {
    /// Constructs the algorithm.
    pub fn new(n_agents: usize, n_actions: usize, batch_size: usize) -> Self {
        Self {
            n_agents,
            n_actions,
            batch_size,
            n_updates: 0,
            train: false,
            n_selections: 0,
        }
    }
}

impl Algorithm for StubAlgorithm {
    fn n_agents(&self) -> usize {
        self.n_agents
    }

    fn select_action(&mut self, obs: &JointObs, explore: bool) -> Result<JointAct> {
        if obs.n_agents() != self.n_agents {
            return Err(MarlError::AgentCountMismatch {
                expected: self.n_agents,
                actual: obs.n_agents(),
            }
            .into());
        }
        let ix = match explore {
            true => self.n_selections % self.n_actions,
            false => 0,
        };
        self.n_selections += 1;
        let spaces = vec![ActionSpace::Discrete(self.n_actions); self.n_agents];
        Ok(JointAct::from_indices(&vec![ix; self.n_agents], &spaces))
    }

    fn update(
        &mut self,
        _transition: &Transition,
        store: &mut TransitionStore,
    ) -> Result<Option<Record>> {
        let batch = match store.sample(self.batch_size) {
            Ok(batch) => batch,
            Err(MarlError::InsufficientData { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let loss = batch.iter().map(|tr| tr.reward[0]).sum::<f32>() / batch.len() as f32;
        self.n_updates += 1;
        Ok(Some(Record::from_scalar("overall/loss", loss)))
    }

    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn n_updates(&self) -> usize {
        self.n_updates
    }

    fn set_n_updates(&mut self, n: usize) {
        self.n_updates = n;
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::write(path.join("stub_params.yaml"), b"n_params: 0\n")?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        fs::read(path.join("stub_params.yaml"))?;
        Ok(())
    }
}
