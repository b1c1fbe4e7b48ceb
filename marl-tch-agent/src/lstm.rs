//! Recurrent encoder of observations into thought vectors.
use crate::{
    mlp::{Mlp, MlpConfig},
    model::SubModel,
};
use serde::{Deserialize, Serialize};
use tch::{
    nn::{self, LSTMState, RNN},
    Tensor,
};

/// Hidden state `(hx, cx)` of an LSTM cell.
///
/// The state is a plain value: [`ThoughtEncoder::thought`] takes the state
/// of the previous step and returns the next one.
pub struct Hidden {
    /// Hidden vector, used as the thought of the agent.
    pub hx: Tensor,

    /// Cell vector.
    pub cx: Tensor,
}

impl Hidden {
    /// Returns the state cut from the computation graph.
    pub fn detach(&self) -> Self {
        Self {
            hx: self.hx.detach(),
            cx: self.cx.detach(),
        }
    }

    /// Returns a state sharing storage with this one.
    pub fn shallow_clone(&self) -> Self {
        Self {
            hx: self.hx.shallow_clone(),
            cx: self.cx.shallow_clone(),
        }
    }
}

// LSTMState holds tensors of shape [num_layers, batch, hidden_size].
impl From<LSTMState> for Hidden {
    fn from(state: LSTMState) -> Self {
        Self {
            hx: state.h().squeeze_dim(0),
            cx: state.c().squeeze_dim(0),
        }
    }
}

impl From<&Hidden> for LSTMState {
    fn from(hidden: &Hidden) -> Self {
        LSTMState((hidden.hx.unsqueeze(0), hidden.cx.unsqueeze(0)))
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`ThoughtEncoder`].
pub struct ThoughtEncoderConfig {
    /// Width of the observation.
    pub obs_dim: i64,

    /// Hidden units of the MLP applied to the observation.
    pub units: Vec<i64>,

    /// Width of the input of the LSTM cell.
    pub x_dim: i64,

    /// Width of the hidden state, i.e., the thought.
    pub hidden_size: i64,
}

/// An MLP followed by an LSTM cell.
pub struct ThoughtEncoder {
    x_layer: Mlp,
    lstm: nn::LSTM,
    hidden_size: i64,
}

impl ThoughtEncoder {
    /// Width of the thought.
    pub fn hidden_size(&self) -> i64 {
        self.hidden_size
    }

    /// Returns the zero state of shape `[batch, hidden_size]`.
    pub fn init_hidden(&self, batch: i64) -> Hidden {
        self.lstm.zero_state(batch).into()
    }

    /// Folds an observation `[batch, obs_dim]` into the hidden state.
    ///
    /// The thought of the agent is `hx` of the returned state.
    pub fn thought(&self, obs: &Tensor, hidden: &Hidden) -> Hidden {
        let x = self.x_layer.forward(obs);
        self.lstm.step(&x, &LSTMState::from(hidden)).into()
    }
}

impl SubModel for ThoughtEncoder {
    type Config = ThoughtEncoderConfig;
    type Input = (Tensor, Hidden);
    type Output = Hidden;

    fn build(p: &nn::Path, config: Self::Config) -> Self {
        let x_config =
            MlpConfig::new(config.obs_dim, config.units.clone(), config.x_dim).activation_out(true);
        let x_layer = Mlp::build(&(p / "x_layer"), x_config);
        let lstm = nn::lstm(
            p / "lstm",
            config.x_dim,
            config.hidden_size,
            Default::default(),
        );
        Self {
            x_layer,
            lstm,
            hidden_size: config.hidden_size,
        }
    }

    fn forward(&self, input: &Self::Input) -> Self::Output {
        self.thought(&input.0, &input.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_hidden_reset_and_detach() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = ThoughtEncoderConfig {
            obs_dim: 4,
            units: vec![64],
            x_dim: 32,
            hidden_size: 32,
        };
        let encoder = ThoughtEncoder::build(&(vs.root() / "encoder"), config);

        let h0 = encoder.init_hidden(1);
        assert_eq!(h0.hx.size(), vec![1, 32]);
        assert_eq!(h0.hx.abs().sum(Kind::Float).double_value(&[]), 0.0);
        assert_eq!(h0.cx.abs().sum(Kind::Float).double_value(&[]), 0.0);

        let obs = Tensor::from_slice(&[0.5f32, -1.0, 2.0, 1.5]).view([1, 4]);
        let h1 = encoder.thought(&obs, &h0);
        assert!(h1.hx.abs().sum(Kind::Float).double_value(&[]) > 0.0);
        assert!(h1.hx.requires_grad());

        let h1_detached = h1.detach();
        assert!(!h1_detached.hx.requires_grad());
        assert!(!h1_detached.cx.requires_grad());
        assert_eq!(
            (&h1_detached.hx - &h1.hx).abs().sum(Kind::Float).double_value(&[]),
            0.0
        );
    }
}
