//! Environment.
use super::{JointAct, JointObs, Step};
use crate::record::Record;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Action space of an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSpace {
    /// A finite set of actions, represented as one-hot vectors.
    Discrete(usize),

    /// Real-valued actions of the given dimension.
    Continuous(usize),
}

impl ActionSpace {
    /// Width of the action vector.
    pub fn dim(&self) -> usize {
        match self {
            Self::Discrete(n) => *n,
            Self::Continuous(d) => *d,
        }
    }

    /// Returns `true` for a discrete action space.
    pub fn is_discrete(&self) -> bool {
        matches!(self, Self::Discrete(_))
    }
}

/// An environment shared by a fixed number of agents.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Number of agents.
    fn n_agents(&self) -> usize;

    /// Widths of the observations of the agents.
    fn obs_dims(&self) -> Vec<usize>;

    /// Action spaces of the agents.
    fn action_spaces(&self) -> Vec<ActionSpace>;

    /// Starts a new episode and returns the initial joint observation.
    fn reset(&mut self) -> Result<JointObs>;

    /// Performs an environment step with the joint action.
    fn step(&mut self, act: &JointAct) -> Result<(Step, Record)>;

    /// Renders the current state.
    fn render(&mut self) -> Result<()> {
        Ok(())
    }

    /// Releases resources held by the environment.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
