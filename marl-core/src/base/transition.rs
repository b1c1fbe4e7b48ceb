use super::{JointAct, JointObs};
use crate::error::MarlError;

/// A joint transition `(o_t, a_t, o_t+1, r_t, done_t)` of all agents.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Joint observation.
    pub obs: JointObs,

    /// Joint action taken on `obs`.
    pub act: JointAct,

    /// Joint observation after the action.
    pub next_obs: JointObs,

    /// Reward of each agent.
    pub reward: Vec<f32>,

    /// Done flag of each agent.
    pub is_done: Vec<bool>,
}

impl Transition {
    /// Creates a transition, checking that every component has one entry per agent.
    pub fn new(
        obs: JointObs,
        act: JointAct,
        next_obs: JointObs,
        reward: Vec<f32>,
        is_done: Vec<bool>,
    ) -> Result<Self, MarlError> {
        let n = obs.n_agents();
        for actual in [
            act.n_agents(),
            next_obs.n_agents(),
            reward.len(),
            is_done.len(),
        ] {
            if actual != n {
                return Err(MarlError::AgentCountMismatch { expected: n, actual });
            }
        }
        Ok(Self {
            obs,
            act,
            next_obs,
            reward,
            is_done,
        })
    }

    /// Number of agents.
    pub fn n_agents(&self) -> usize {
        self.obs.n_agents()
    }

    /// Returns `true` if every agent is done.
    pub fn all_done(&self) -> bool {
        self.is_done.iter().all(|&d| d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_count_mismatch() {
        let obs = JointObs(vec![vec![0.0], vec![1.0]]);
        let act = JointAct(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let res = Transition::new(
            obs.clone(),
            act,
            obs,
            vec![1.0, 1.0, 1.0],
            vec![false, false],
        );
        assert!(matches!(
            res,
            Err(MarlError::AgentCountMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }
}
