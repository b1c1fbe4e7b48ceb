use crate::{
    mlp::{Mlp, MlpConfig},
    model::{AgentNet, SubModel},
};
use anyhow::Result;
use tch::{nn, Tensor};

/// Action-value network of an agent over its own observation.
pub struct QNet {
    q: Mlp,
}

impl QNet {
    /// Action values `[batch, n_actions]`.
    pub fn forward(&self, obs: &Tensor) -> Tensor {
        self.q.forward(obs)
    }
}

impl AgentNet for QNet {
    type Config = MlpConfig;

    fn build(p: &nn::Path, config: &Self::Config) -> Result<Self> {
        Ok(Self {
            q: Mlp::build(&(p / "q"), config.clone()),
        })
    }
}
