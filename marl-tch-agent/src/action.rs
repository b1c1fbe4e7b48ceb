//! Conversion of policy outputs into environment actions.
use crate::util::{gumbel_softmax, onehot_from_logits, to_vec_f32};
use anyhow::Result;
use marl_core::{ActionSpace, JointAct};
use serde::{Deserialize, Serialize};
use tch::Tensor;

/// Selects actions from the outputs of the policies of the agents.
///
/// For a discrete agent, the output is the logits of the actions.
/// Exploration samples a Gumbel-softmax relaxation, taken as the one-hot
/// vector of its largest element if `hard` is `true`. Otherwise the action
/// of the largest logit is taken. The selected actions are meant for the
/// environment; losses needing the straight-through gradient of a hard
/// sample use [`gumbel_softmax`] directly.
///
/// For a continuous agent, the output is the action itself.
/// Exploration adds Gaussian noise clamped to `[-1, 1]`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ActionSelector {
    /// Temperature of the Gumbel-softmax.
    pub temperature: f64,

    /// Take one-hot samples in exploration.
    pub hard: bool,

    /// Standard deviation of the exploration noise of continuous actions.
    pub noise_std: f64,
}

impl Default for ActionSelector {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            hard: true,
            noise_std: 0.1,
        }
    }
}

impl ActionSelector {
    /// Sets the temperature.
    pub fn temperature(mut self, v: f64) -> Self {
        self.temperature = v;
        self
    }

    /// Sets the standard deviation of the exploration noise.
    pub fn noise_std(mut self, v: f64) -> Self {
        self.noise_std = v;
        self
    }

    /// Selects the action of an agent from the output of its policy.
    pub fn select(&self, out: &Tensor, space: &ActionSpace, explore: bool) -> Tensor {
        match (space, explore) {
            (ActionSpace::Discrete(_), true) => match self.hard {
                true => onehot_from_logits(&gumbel_softmax(out, self.temperature, false)),
                false => gumbel_softmax(out, self.temperature, false),
            },
            (ActionSpace::Discrete(_), false) => onehot_from_logits(out),
            (ActionSpace::Continuous(_), true) => {
                (out + out.randn_like() * self.noise_std).clamp(-1.0, 1.0)
            }
            (ActionSpace::Continuous(_), false) => out.shallow_clone(),
        }
    }

    /// Selects the actions of all agents.
    pub fn select_joint(
        &self,
        outs: &[Tensor],
        spaces: &[ActionSpace],
        explore: bool,
    ) -> Vec<Tensor> {
        outs.iter()
            .zip(spaces.iter())
            .map(|(out, space)| self.select(out, space, explore))
            .collect()
    }
}

/// Converts actions of shape `[1, dim]` into a [`JointAct`].
pub fn to_joint_act(acts: &[Tensor]) -> Result<JointAct> {
    Ok(JointAct(
        acts.iter().map(to_vec_f32).collect::<Result<Vec<_>>>()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_discrete() {
        let selector = ActionSelector::default();
        let space = ActionSpace::Discrete(4);
        let logits = Tensor::from_slice(&[0.0f32, 5.0, 1.0, -2.0]).view([1, 4]);

        let act = to_vec_f32(&selector.select(&logits, &space, false)).unwrap();
        assert_eq!(act, vec![0.0, 1.0, 0.0, 0.0]);

        for _ in 0..10 {
            let act = to_vec_f32(&selector.select(&logits, &space, true)).unwrap();
            assert_eq!(act.iter().filter(|&&v| v == 1.0).count(), 1);
            assert_eq!(act.iter().filter(|&&v| v == 0.0).count(), 3);
        }
    }

    #[test]
    fn test_select_continuous() {
        let selector = ActionSelector::default().noise_std(0.5);
        let space = ActionSpace::Continuous(2);
        let out = Tensor::from_slice(&[0.9f32, -0.2]).view([1, 2]);

        let act = to_vec_f32(&selector.select(&out, &space, false)).unwrap();
        assert_eq!(act, vec![0.9, -0.2]);

        let act = to_vec_f32(&selector.select(&out, &space, true)).unwrap();
        assert!(act.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_to_joint_act() {
        let acts = vec![
            Tensor::from_slice(&[0f32, 1.0]).view([1, 2]),
            Tensor::from_slice(&[1f32, 0.0, 0.0]).view([1, 3]),
        ];
        let act = to_joint_act(&acts).unwrap();
        assert_eq!(act.index(0), 1);
        assert_eq!(act.index(1), 0);
    }
}
