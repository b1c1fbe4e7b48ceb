//! Utilities.
use crate::model::ModelBase;
use anyhow::{anyhow, Result};
use log::trace;
use marl_core::ActionSpace;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use tch::{Kind, Reduction, Tensor};

const EPS: f64 = 1e-20;

/// Critic loss type.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum CriticLoss {
    /// Mean squared error.
    Mse,

    /// Smooth L1 loss.
    SmoothL1,
}

impl CriticLoss {
    /// Computes the loss averaged over the batch.
    pub fn loss(&self, pred: &Tensor, tgt: &Tensor) -> Tensor {
        match self {
            Self::Mse => pred.mse_loss(tgt, Reduction::Mean),
            Self::SmoothL1 => pred.smooth_l1_loss(tgt, Reduction::Mean, 1.0),
        }
    }
}

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track<M: ModelBase>(dest: &mut M, src: &M, tau: f64) {
    let src = &src.get_var_store().variables();
    let dest = &mut dest.get_var_store_mut().variables();
    debug_assert_eq!(src.len(), dest.len());

    tch::no_grad(|| {
        for (name, src) in src.iter() {
            if let Some(dest) = dest.get_mut(name) {
                dest.copy_(&(tau * src + (1.0 - tau) * &*dest));
            }
        }
    });
    trace!("soft update");
}

/// Returns one-hot vectors of the largest logits along the last axis.
pub fn onehot_from_logits(logits: &Tensor) -> Tensor {
    let n = logits.size().last().copied().unwrap_or(1);
    logits.argmax(-1, false).one_hot(n).to_kind(Kind::Float)
}

/// Samples from the Gumbel(0, 1) distribution.
pub fn sample_gumbel(like: &Tensor) -> Tensor {
    let u = like.rand_like();
    -((-((u + EPS).log())) + EPS).log()
}

/// Samples from the Gumbel-softmax distribution.
///
/// With `hard = true`, the sample is the one-hot vector of the largest
/// element, while the gradient is that of the relaxed sample
/// (straight-through estimator).
pub fn gumbel_softmax(logits: &Tensor, temperature: f64, hard: bool) -> Tensor {
    let y = ((logits + sample_gumbel(logits)) / temperature).softmax(-1, Kind::Float);
    match hard {
        true => {
            let y_hard = onehot_from_logits(&y);
            (y_hard - &y).detach() + y
        }
        false => y,
    }
}

/// Copies the elements of a tensor into a vector.
pub fn to_vec_f32(t: &Tensor) -> Result<Vec<f32>> {
    let t = t
        .detach()
        .to_device(tch::Device::Cpu)
        .to_kind(Kind::Float)
        .flatten(0, -1);
    Ok(Vec::<f32>::try_from(&t)?)
}

/// Returns a scalar value of a single-element tensor.
pub fn to_f32(t: &Tensor) -> f32 {
    t.double_value(&[]) as f32
}

/// Converts an observation into a tensor of shape `[1, obs_dim]`.
pub fn obs_to_tensor(obs: &[f32], device: tch::Device) -> Tensor {
    Tensor::from_slice(obs).unsqueeze(0).to_device(device)
}

/// Returns the number of actions of each agent, failing on a continuous action space.
pub fn discrete_actions(spaces: &[ActionSpace], algo: &str) -> Result<Vec<i64>> {
    spaces
        .iter()
        .map(|space| match space {
            ActionSpace::Discrete(n) => Ok(*n as i64),
            ActionSpace::Continuous(_) => {
                Err(anyhow!("{} supports discrete action spaces only", algo))
            }
        })
        .collect()
}
