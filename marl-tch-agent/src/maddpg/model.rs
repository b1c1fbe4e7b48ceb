use crate::{
    mlp::{Mlp, MlpConfig},
    model::{AgentNet, SubModel},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Tensor};

/// Configuration of [`MaddpgNet`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MaddpgNetConfig {
    /// Actor over the observation of the agent.
    pub actor: MlpConfig,

    /// Width of the joint observation.
    pub joint_obs_dim: i64,

    /// Width of the joint action.
    pub joint_act_dim: i64,

    /// Width of the embedding of the joint observation.
    pub critic_units: i64,

    /// Squashes the actor output with tanh for continuous actions.
    pub continuous: bool,
}

/// Centralized critic `Q(joint_obs, joint_act)`.
///
/// The joint observation is embedded by a linear layer with ReLU and
/// concatenated after the joint action. The output layer starts at zero.
pub struct Critic {
    obs_x: nn::Linear,
    critic: nn::Linear,
}

impl Critic {
    fn build(p: &nn::Path, config: &MaddpgNetConfig) -> Self {
        let obs_x = nn::linear(
            p / "obs_x",
            config.joint_obs_dim,
            config.critic_units,
            Default::default(),
        );
        let critic = nn::linear(
            p / "critic",
            config.joint_act_dim + config.critic_units,
            1,
            nn::LinearConfig {
                ws_init: nn::Init::Const(0.),
                bs_init: Some(nn::Init::Const(0.)),
                bias: true,
            },
        );
        Self { obs_x, critic }
    }

    /// Values `[batch, 1]`.
    pub fn forward(&self, joint_obs: &Tensor, joint_act: &Tensor) -> Tensor {
        let x = self.obs_x.forward(joint_obs).relu();
        self.critic.forward(&Tensor::cat(&[joint_act, &x], 1))
    }
}

/// Actor and centralized critic of an agent.
pub struct MaddpgNet {
    actor: Mlp,
    critic: Critic,
    continuous: bool,
}

impl MaddpgNet {
    /// Output of the actor, `[batch, act_dim]`: logits of discrete actions
    /// or continuous actions in `[-1, 1]`.
    pub fn actor(&self, obs: &Tensor) -> Tensor {
        let out = self.actor.forward(obs);
        match self.continuous {
            true => out.tanh(),
            false => out,
        }
    }

    /// The centralized critic.
    pub fn critic(&self) -> &Critic {
        &self.critic
    }
}

impl AgentNet for MaddpgNet {
    type Config = MaddpgNetConfig;

    fn build(p: &nn::Path, config: &Self::Config) -> Result<Self> {
        let actor = Mlp::build(&(p / "actor"), config.actor.clone());
        let critic = Critic::build(&(p / "critic"), config);

        Ok(Self {
            actor,
            critic,
            continuous: config.continuous,
        })
    }
}
