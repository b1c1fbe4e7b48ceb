//! Core functionalities.
mod algorithm;
mod env;
mod step;
mod transition;
pub use algorithm::Algorithm;
pub use env::{ActionSpace, Env};
pub use step::Step;
pub use transition::Transition;

use crate::error::MarlError;
use serde::{Deserialize, Serialize};

/// Observations of all agents at a timestep, ordered by agent index.
///
/// Observation widths may differ between agents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointObs(pub Vec<Vec<f32>>);

impl JointObs {
    /// Returns the number of agents.
    pub fn n_agents(&self) -> usize {
        self.0.len()
    }

    /// Returns the observation of agent `i`.
    pub fn agent(&self, i: usize) -> &[f32] {
        &self.0[i]
    }

    /// Checks the number of agents and the width of each observation.
    pub fn check_dims(&self, dims: &[usize]) -> Result<(), MarlError> {
        if self.0.len() != dims.len() {
            return Err(MarlError::AgentCountMismatch {
                expected: dims.len(),
                actual: self.0.len(),
            });
        }
        for (agent, (o, &expected)) in self.0.iter().zip(dims.iter()).enumerate() {
            if o.len() != expected {
                return Err(MarlError::ShapeMismatch {
                    agent,
                    expected,
                    actual: o.len(),
                });
            }
        }
        Ok(())
    }
}

/// Actions of all agents at a timestep, ordered by agent index.
///
/// The action of a discrete agent is a one-hot vector. That of a continuous
/// agent is the action vector itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointAct(pub Vec<Vec<f32>>);

impl JointAct {
    /// Creates one-hot actions from action indices.
    pub fn from_indices(ixs: &[usize], spaces: &[ActionSpace]) -> Self {
        Self(
            ixs.iter()
                .zip(spaces.iter())
                .map(|(&ix, space)| {
                    let mut v = vec![0f32; space.dim()];
                    v[ix] = 1.0;
                    v
                })
                .collect(),
        )
    }

    /// Returns the number of agents.
    pub fn n_agents(&self) -> usize {
        self.0.len()
    }

    /// Returns the action of agent `i`.
    pub fn agent(&self, i: usize) -> &[f32] {
        &self.0[i]
    }

    /// Returns the index of the largest element of agent `i`'s action.
    ///
    /// For a one-hot action this is the selected discrete action.
    pub fn index(&self, i: usize) -> usize {
        self.0[i]
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |(ix, max), (j, &v)| {
                if v > max {
                    (j, v)
                } else {
                    (ix, max)
                }
            })
            .0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_act_indices() {
        let spaces = vec![ActionSpace::Discrete(4), ActionSpace::Discrete(2)];
        let act = JointAct::from_indices(&[3, 0], &spaces);
        assert_eq!(act.agent(0), &[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(act.agent(1), &[1.0, 0.0]);
        assert_eq!(act.index(0), 3);
        assert_eq!(act.index(1), 0);
    }

    #[test]
    fn test_check_dims() {
        let obs = JointObs(vec![vec![0.0; 3], vec![0.0; 2]]);
        assert!(obs.check_dims(&[3, 2]).is_ok());
        assert!(matches!(
            obs.check_dims(&[3, 4]),
            Err(MarlError::ShapeMismatch {
                agent: 1,
                expected: 4,
                actual: 2
            })
        ));
        assert!(matches!(
            obs.check_dims(&[3, 2, 1]),
            Err(MarlError::AgentCountMismatch { .. })
        ));
    }
}
