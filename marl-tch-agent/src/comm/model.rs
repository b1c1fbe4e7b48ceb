use crate::{
    lstm::{Hidden, ThoughtEncoder, ThoughtEncoderConfig},
    model::{AgentNet, SubModel},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Kind, Tensor};

/// Configuration of [`CommNet`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CommNetConfig {
    /// Encoder of the observations of the agent.
    pub encoder: ThoughtEncoderConfig,

    /// Number of actions of the agent.
    pub n_actions: i64,

    /// Width of the input of the policy.
    pub policy_in: i64,

    /// Width of the input of the critic.
    pub critic_in: i64,

    /// If `true`, the critic returns the values of the actions of the agent
    /// as a state value plus a zero-mean advantage. Otherwise it returns a
    /// single value.
    pub dueling: bool,
}

fn zero_linear(p: nn::Path, in_dim: i64, out_dim: i64) -> nn::Linear {
    nn::linear(
        p,
        in_dim,
        out_dim,
        nn::LinearConfig {
            ws_init: nn::Init::Const(0.),
            bs_init: Some(nn::Init::Const(0.)),
            bias: true,
        },
    )
}

/// Recurrent encoder, policy and critic of a communicating agent.
pub struct CommNet {
    encoder: ThoughtEncoder,
    pi: nn::Linear,
    value: nn::Linear,
    advantage: Option<nn::Linear>,
}

impl CommNet {
    /// The recurrent encoder of observations.
    pub fn encoder(&self) -> &ThoughtEncoder {
        &self.encoder
    }

    /// Folds the observation into the hidden state.
    pub fn thought(&self, obs: &Tensor, hidden: &Hidden) -> Hidden {
        self.encoder.thought(obs, hidden)
    }

    /// Logits of the actions, `[batch, n_actions]`.
    pub fn policy(&self, x: &Tensor) -> Tensor {
        self.pi.forward(x)
    }

    /// Critic values, `[batch, 1]` or `[batch, n_actions]` if dueling.
    pub fn critic(&self, x: &Tensor) -> Tensor {
        let v = self.value.forward(x);
        match &self.advantage {
            Some(advantage) => {
                let a = advantage.forward(x).tanh();
                let a_mean = a.mean_dim([-1i64].as_slice(), true, Kind::Float);
                v + a - a_mean
            }
            None => v,
        }
    }
}

impl AgentNet for CommNet {
    type Config = CommNetConfig;

    fn build(p: &nn::Path, config: &Self::Config) -> Result<Self> {
        let encoder = ThoughtEncoder::build(&(p / "encoder"), config.encoder.clone());
        let pi = nn::linear(
            p / "pi",
            config.policy_in,
            config.n_actions,
            nn::LinearConfig {
                bias: false,
                ..Default::default()
            },
        );
        let value = zero_linear(p / "value", config.critic_in, 1);
        let advantage = match config.dueling {
            true => Some(zero_linear(
                p / "advantage",
                config.critic_in,
                config.n_actions,
            )),
            false => None,
        };

        Ok(Self {
            encoder,
            pi,
            value,
            advantage,
        })
    }
}
