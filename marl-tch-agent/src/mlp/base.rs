use super::MlpConfig;
use crate::model::SubModel;
use tch::{nn, nn::Module, Tensor};

/// Multilayer perceptron with ReLU activation function.
pub struct Mlp {
    seq: nn::Sequential,
}

impl Mlp {
    fn create_net(p: &nn::Path, config: &MlpConfig) -> nn::Sequential {
        let mut seq = nn::seq();
        let mut in_dim = config.in_dim;

        for (i, &out_dim) in config.units.iter().enumerate() {
            seq = seq.add(nn::linear(
                p / format!("{}{}", "ln", i),
                in_dim,
                out_dim,
                Default::default(),
            ));
            seq = seq.add_fn(|x| x.relu());
            in_dim = out_dim;
        }

        let out_config = match (config.zero_init_out, config.zero_bias_out) {
            (true, _) => nn::LinearConfig {
                ws_init: nn::Init::Const(0.),
                bs_init: Some(nn::Init::Const(0.)),
                bias: true,
            },
            (false, true) => nn::LinearConfig {
                bs_init: Some(nn::Init::Const(0.)),
                ..Default::default()
            },
            (false, false) => Default::default(),
        };
        seq = seq.add(nn::linear(
            p / format!("{}{}", "ln", config.units.len()),
            in_dim,
            config.out_dim,
            out_config,
        ));

        if config.activation_out {
            seq = seq.add_fn(|x| x.relu());
        }

        seq
    }
}

impl SubModel for Mlp {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, x: &Self::Input) -> Tensor {
        self.seq.forward(x)
    }

    fn build(p: &nn::Path, config: Self::Config) -> Self {
        Self {
            seq: Self::create_net(p, &config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_zero_init_out() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = MlpConfig::new(3, vec![8], 2).zero_init_out(true);
        let mlp = Mlp::build(&(vs.root() / "q"), config);
        let x = Tensor::ones([5, 3], (Kind::Float, Device::Cpu));
        let y = mlp.forward(&x);
        assert_eq!(y.size(), vec![5, 2]);
        assert_eq!(y.abs().sum(Kind::Float).double_value(&[]), 0.0);
        assert_eq!(vs.variables().len(), 4);
    }
}
