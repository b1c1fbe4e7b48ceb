//! Environment step.
use super::JointObs;

/// The outcome of an environment step, `(o_t+1, r_t, done_t)` for every agent.
#[derive(Clone, Debug)]
pub struct Step {
    /// Next joint observation.
    pub obs: JointObs,

    /// Reward of each agent.
    pub reward: Vec<f32>,

    /// Done flag of each agent.
    pub is_done: Vec<bool>,
}

impl Step {
    /// Constructs a [`Step`] object.
    pub fn new(obs: JointObs, reward: Vec<f32>, is_done: Vec<bool>) -> Self {
        Self {
            obs,
            reward,
            is_done,
        }
    }

    #[inline]
    /// Returns `true` if every agent is done.
    pub fn all_done(&self) -> bool {
        self.is_done.iter().all(|&d| d)
    }
}
