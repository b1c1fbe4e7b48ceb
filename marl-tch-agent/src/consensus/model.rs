use crate::{
    mlp::{Mlp, MlpConfig},
    model::{AgentNet, SubModel},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Tensor};

/// Configuration of [`ConsensusNet`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ConsensusNetConfig {
    /// Width of the observation.
    pub obs_dim: i64,

    /// Hidden units of the encoder.
    pub units: Vec<i64>,

    /// Width of a thought.
    pub hidden_size: i64,

    /// Number of actions.
    pub n_actions: i64,
}

/// Action values as a shared baseline on the global thought plus a local advantage.
///
/// `Q(local, global) = critic(global) + tanh(advantage([local, global]))`
pub struct ConsensusNet {
    x_layer: Mlp,
    critic: nn::Linear,
    advantage: nn::Linear,
}

impl ConsensusNet {
    /// Thought of the agent, `[batch, hidden_size]`.
    pub fn thought(&self, obs: &Tensor) -> Tensor {
        self.x_layer.forward(obs)
    }

    /// Shared baseline, `[batch, 1]`.
    pub fn critic(&self, global_thought: &Tensor) -> Tensor {
        self.critic.forward(global_thought)
    }

    /// Action values, `[batch, n_actions]`.
    pub fn forward(&self, local_thought: &Tensor, global_thought: &Tensor) -> Tensor {
        let x = Tensor::cat(&[local_thought, global_thought], 1);
        self.critic(global_thought) + self.advantage.forward(&x).tanh()
    }
}

impl AgentNet for ConsensusNet {
    type Config = ConsensusNetConfig;

    fn build(p: &nn::Path, config: &Self::Config) -> Result<Self> {
        let x_config = MlpConfig::new(config.obs_dim, config.units.clone(), config.hidden_size)
            .activation_out(true);
        let x_layer = Mlp::build(&(p / "x_layer"), x_config);
        let critic = nn::linear(
            p / "critic",
            config.hidden_size,
            1,
            nn::LinearConfig {
                ws_init: nn::Init::Const(0.),
                bs_init: Some(nn::Init::Const(0.)),
                bias: true,
            },
        );
        let advantage = nn::linear(
            p / "advantage",
            2 * config.hidden_size,
            config.n_actions,
            Default::default(),
        );

        Ok(Self {
            x_layer,
            critic,
            advantage,
        })
    }
}
