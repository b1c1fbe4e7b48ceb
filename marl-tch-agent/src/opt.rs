//! Optimizers.
use anyhow::Result;
use log::trace;
use serde::{Deserialize, Serialize};
use tch::{
    nn::{self, OptimizerConfig as _},
    no_grad, Tensor,
};

/// Configures the optimizer shared by all agents of an algorithm.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },

    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,
        /// Coefficient of the first moment.
        beta1: f64,
        /// Coefficient of the second moment.
        beta2: f64,
        /// Weight decay.
        wd: f64,
        /// Term added to the denominator.
        eps: f64,
        /// Use the AMSGrad variant.
        amsgrad: bool,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam { lr: 0.001 }
    }
}

impl OptimizerConfig {
    /// Learning rate.
    pub fn lr(&self) -> f64 {
        match self {
            Self::Adam { lr } | Self::AdamW { lr, .. } => *lr,
        }
    }

    /// Sets the learning rate, keeping the other parameters.
    pub fn learning_rate(mut self, v: f64) -> Self {
        match &mut self {
            Self::Adam { lr } | Self::AdamW { lr, .. } => *lr = v,
        }
        self
    }

    /// Constructs an optimizer of all variables in `vs`.
    pub fn build(&self, vs: &nn::VarStore) -> Result<Optimizer> {
        let opt = match *self {
            Self::Adam { lr } => nn::Adam::default().build(vs, lr)?,
            Self::AdamW {
                lr,
                beta1,
                beta2,
                wd,
                eps,
                amsgrad,
            } => nn::AdamW {
                beta1,
                beta2,
                wd,
                eps,
                amsgrad,
            }
            .build(vs, lr)?,
        };
        Ok(Optimizer { opt, n_steps: 0 })
    }
}

/// Optimizer of the parameters of a [`MultiAgentModel`](crate::model::MultiAgentModel).
pub struct Optimizer {
    opt: nn::Optimizer,
    n_steps: usize,
}

impl Optimizer {
    /// Backpropagates `loss` and updates the parameters.
    ///
    /// The global norm of the gradients is clipped to `max_norm` if given.
    pub fn step(&mut self, loss: &Tensor, max_norm: Option<f64>) {
        match max_norm {
            Some(max_norm) => self.opt.backward_step_clip_norm(loss, max_norm),
            None => self.opt.backward_step(loss),
        }
        self.n_steps += 1;
        trace!("Optimizer step {}", self.n_steps);
    }

    /// Backpropagates `loss` and updates the parameters, clipping the
    /// gradients of each group of variables by its own norm.
    ///
    /// Gradients outside of the groups are left as they are.
    pub fn step_grouped(&mut self, loss: &Tensor, max_norm: f64, groups: &[Vec<Tensor>]) {
        self.opt.zero_grad();
        loss.backward();
        no_grad(|| {
            for group in groups.iter() {
                clip_grad_norm(group, max_norm);
            }
        });
        self.opt.step();
        self.n_steps += 1;
        trace!("Optimizer step {} over {} groups", self.n_steps, groups.len());
    }

    /// Number of steps taken.
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }
}

fn clip_grad_norm(vars: &[Tensor], max_norm: f64) {
    let mut grads: Vec<Tensor> = vars
        .iter()
        .map(|v| v.grad())
        .filter(|g| g.defined())
        .collect();
    if grads.is_empty() {
        return;
    }
    let norms: Vec<Tensor> = grads.iter().map(|g| g.norm()).collect();
    let total_norm = Tensor::stack(&norms, 0).norm().double_value(&[]);
    let clip_coef = max_norm / (total_norm + 1e-6);
    if clip_coef < 1.0 {
        for g in grads.iter_mut() {
            let _ = g.g_mul_scalar_(clip_coef);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learning_rate() {
        let config = OptimizerConfig::AdamW {
            lr: 0.1,
            beta1: 0.9,
            beta2: 0.999,
            wd: 0.01,
            eps: 1e-8,
            amsgrad: false,
        }
        .learning_rate(0.003);
        assert_eq!(config.lr(), 0.003);
        assert!(matches!(config, OptimizerConfig::AdamW { wd, .. } if wd == 0.01));
        assert_eq!(OptimizerConfig::default().learning_rate(0.5).lr(), 0.5);
    }

    #[test]
    fn test_step_with_clipping() -> Result<()> {
        let vs = nn::VarStore::new(tch::Device::Cpu);
        let w = vs.root().var("w", &[3], nn::Init::Const(1.0));
        let mut opt = OptimizerConfig::Adam { lr: 0.1 }.build(&vs)?;

        let loss = (&w * 100.0).sum(tch::Kind::Float);
        opt.step(&loss, Some(1.0));
        assert_eq!(opt.n_steps(), 1);

        // Adam moves every weight by about lr regardless of the gradient scale
        let w = Vec::<f32>::try_from(&w.detach())?;
        assert!(w.iter().all(|&v| (v - 0.9).abs() < 1e-3));
        Ok(())
    }

    #[test]
    fn test_step_grouped_clips_each_group() -> Result<()> {
        let vs = nn::VarStore::new(tch::Device::Cpu);
        let w1 = vs.root().var("w1", &[2], nn::Init::Const(0.0));
        let w2 = vs.root().var("w2", &[2], nn::Init::Const(0.0));
        let mut opt = OptimizerConfig::Adam { lr: 0.1 }.build(&vs)?;

        // The gradient of w1 is 1000 times larger than that of w2
        let loss = (&w1 * 1000.0).sum(tch::Kind::Float) + (&w2 * 0.001).sum(tch::Kind::Float);
        let groups = vec![vec![w1.shallow_clone()], vec![w2.shallow_clone()]];
        opt.step_grouped(&loss, 1.0, &groups);

        // w2 keeps its own small gradient
        let g2 = Vec::<f32>::try_from(&w2.grad())?;
        assert!(g2.iter().all(|&v| (v - 0.001).abs() < 1e-7));
        let g1 = w1.grad().norm().double_value(&[]);
        assert!((g1 - 1.0).abs() < 1e-4);
        assert_eq!(opt.n_steps(), 1);
        Ok(())
    }
}
