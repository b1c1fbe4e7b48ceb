//! MADDPG agents.
use super::{
    config::MaddpgConfig,
    model::{MaddpgNet, MaddpgNetConfig},
};
use crate::{
    action::to_joint_act,
    mlp::MlpConfig,
    model::{ModelBase, MultiAgentModel},
    util::{gumbel_softmax, onehot_from_logits, obs_to_tensor, to_f32, track},
    JointBatch,
};
use anyhow::Result;
use log::debug;
use marl_core::{
    record::{Record, RecordValue},
    replay_buffer::TransitionStore,
    ActionSpace, Algorithm, JointAct, JointObs, Transition,
};
use std::{fs, path::Path};
use tch::{no_grad, Device, Kind, Tensor};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Multi-agent deep deterministic policy gradient.
///
/// Each agent has an actor over its own observation and a critic over the
/// joint observation and the joint action.
///
/// ```mermaid
/// graph LR
///     O_i[obs_i] --> A_i[actor_i]
///     A_i --> X[joint action with a_i replaced]
///     B[batch actions] --> X
///     JO[joint obs] --> C_i[critic_i]
///     X --> C_i
///     C_i --> L[- Q_i]
/// ```
///
/// The losses of the critics and the actors of all agents are summed and
/// minimized in a single optimization step, followed by the soft update of
/// the target networks.
pub struct Maddpg {
    config: MaddpgConfig,
    model: MultiAgentModel<MaddpgNet>,
    model_tgt: MultiAgentModel<MaddpgNet>,
    obs_dims: Vec<usize>,
    action_spaces: Vec<ActionSpace>,
    device: Device,
    n_updates: usize,
    train: bool,
}

/// Returns the actions with the one of agent `i` replaced.
fn replace(acts: &[Tensor], i: usize, act_i: Tensor) -> Vec<Tensor> {
    let mut acts: Vec<Tensor> = acts.iter().map(|a| a.shallow_clone()).collect();
    acts[i] = act_i;
    acts
}

impl Maddpg {
    /// Constructs the agents for the given observation widths and action spaces.
    pub fn build(
        config: MaddpgConfig,
        obs_dims: &[usize],
        action_spaces: &[ActionSpace],
    ) -> Result<Self> {
        let device = config.device.resolve()?;
        let joint_obs_dim = obs_dims.iter().sum::<usize>() as i64;
        let joint_act_dim = action_spaces.iter().map(|s| s.dim()).sum::<usize>() as i64;
        let configs = obs_dims
            .iter()
            .zip(action_spaces.iter())
            .map(|(&obs_dim, space)| MaddpgNetConfig {
                actor: MlpConfig::new(
                    obs_dim as i64,
                    config.actor_units.clone(),
                    space.dim() as i64,
                )
                .zero_bias_out(true),
                joint_obs_dim,
                joint_act_dim,
                critic_units: config.critic_units,
                continuous: !space.is_discrete(),
            })
            .collect();
        let model = MultiAgentModel::build(configs, &config.opt_config, device)?;
        let model_tgt = model.target()?;

        Ok(Self {
            config,
            model,
            model_tgt,
            obs_dims: obs_dims.to_vec(),
            action_spaces: action_spaces.to_vec(),
            device,
            n_updates: 0,
            train: false,
        })
    }

    /// Deterministic actions of the target actors on the next observations.
    fn target_actions(&self, next_obs: &[Tensor]) -> Vec<Tensor> {
        next_obs
            .iter()
            .enumerate()
            .map(|(i, obs)| {
                let out = self.model_tgt.agent(i).actor(obs);
                match self.action_spaces[i] {
                    ActionSpace::Discrete(_) => onehot_from_logits(&out),
                    ActionSpace::Continuous(_) => out,
                }
            })
            .collect()
    }

    /// Targets of the critics of all agents, each of shape `[batch]`.
    ///
    /// The target value of a terminal transition is the reward; the mask
    /// is applied after the target critic is evaluated on the whole batch.
    pub fn critic_targets(&self, batch: &JointBatch) -> Vec<Tensor> {
        no_grad(|| {
            let joint_next_obs = batch.joint_next_obs();
            let target_acts = self.target_actions(&batch.next_obs);
            let joint_target_act = Tensor::cat(&target_acts, 1);

            (0..self.model.n_agents())
                .map(|i| {
                    let joint_act = match self.config.target_all_agents {
                        true => joint_target_act.shallow_clone(),
                        false => Tensor::cat(
                            &replace(&batch.act, i, target_acts[i].shallow_clone()),
                            1,
                        ),
                    };
                    let q_next = self
                        .model_tgt
                        .agent(i)
                        .critic()
                        .forward(&joint_next_obs, &joint_act)
                        .squeeze_dim(-1);
                    batch.reward(i) + self.config.discount_factor * q_next * batch.not_done(i)
                })
                .collect()
        })
    }

    /// Loss of the actor of agent `i`.
    ///
    /// The action of agent `i` in the batch is replaced by the output of its
    /// current policy, hard-sampled for discrete actions; the actions of the
    /// other agents are taken from the batch.
    pub fn actor_loss(&self, i: usize, batch: &JointBatch) -> Tensor {
        let out = self.model.agent(i).actor(&batch.obs[i]);
        let act_i = match self.action_spaces[i] {
            ActionSpace::Discrete(_) => {
                gumbel_softmax(&out, self.config.action_selector.temperature, true)
            }
            ActionSpace::Continuous(_) => out,
        };
        let joint_act = Tensor::cat(&replace(&batch.act, i, act_i), 1);
        -self
            .model
            .agent(i)
            .critic()
            .forward(&batch.joint_obs(), &joint_act)
            .mean(Kind::Float)
    }

    fn update_agents(&mut self, batch: &JointBatch) -> Result<Record> {
        let mut record = Record::empty();
        let joint_obs = batch.joint_obs();
        let joint_act = batch.joint_act();
        let tgt = self.critic_targets(batch);

        let mut critic_losses = vec![];
        let mut actor_losses = vec![];
        for i in 0..self.model.n_agents() {
            let pred = self
                .model
                .agent(i)
                .critic()
                .forward(&joint_obs, &joint_act)
                .squeeze_dim(-1);
            let critic_loss = self.config.critic_loss.loss(&pred, &tgt[i]);
            let actor_loss = self.actor_loss(i, batch);

            record.insert(
                format!("agent_{}/critic_loss", i),
                RecordValue::Scalar(to_f32(&critic_loss)),
            );
            record.insert(
                format!("agent_{}/actor_loss", i),
                RecordValue::Scalar(to_f32(&actor_loss)),
            );
            critic_losses.push(critic_loss);
            actor_losses.push(actor_loss);
        }

        let critic_loss = Tensor::stack(&critic_losses, 0).sum(Kind::Float);
        let actor_loss = Tensor::stack(&actor_losses, 0).sum(Kind::Float);
        let loss = &critic_loss + &actor_loss;

        self.model.step(&loss, self.config.clip_grad_norm)?;
        track(&mut self.model_tgt, &self.model, self.config.tau);
        self.n_updates += 1;

        let loss = to_f32(&loss);
        debug!("MADDPG update {}: loss {}", self.n_updates, loss);
        record.insert(
            "overall/critic_loss",
            RecordValue::Scalar(to_f32(&critic_loss)),
        );
        record.insert("overall/actor_loss", RecordValue::Scalar(to_f32(&actor_loss)));
        record.insert("overall/loss", RecordValue::Scalar(loss));

        Ok(record)
    }
}

impl Algorithm for Maddpg {
    fn n_agents(&self) -> usize {
        self.model.n_agents()
    }

    fn select_action(&mut self, obs: &JointObs, explore: bool) -> Result<JointAct> {
        obs.check_dims(&self.obs_dims)?;
        let acts: Vec<Tensor> = no_grad(|| {
            (0..self.model.n_agents())
                .map(|i| {
                    let out = self
                        .model
                        .agent(i)
                        .actor(&obs_to_tensor(obs.agent(i), self.device));
                    self.config
                        .action_selector
                        .select(&out, &self.action_spaces[i], explore)
                })
                .collect()
        });
        to_joint_act(&acts)
    }

    fn update(
        &mut self,
        _transition: &Transition,
        store: &mut TransitionStore,
    ) -> Result<Option<Record>> {
        if store.len() < self.config.min_transitions_warmup {
            return Ok(None);
        }
        match JointBatch::sample(store, self.config.batch_size, self.device)? {
            Some(batch) => Ok(Some(self.update_agents(&batch)?)),
            None => Ok(None),
        }
    }

    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn n_updates(&self) -> usize {
        self.n_updates
    }

    fn set_n_updates(&mut self, n: usize) {
        self.n_updates = n;
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.model.save(path.join("model.pt"))?;
        self.model_tgt.save(path.join("model_tgt.pt"))?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.model.load(path.join("model.pt"))?;
        self.model_tgt.load(path.join("model_tgt.pt"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Device as MarlDevice;

    const N: usize = 3;

    fn transition(v: f32) -> Transition {
        let obs = |v: f32| JointObs((0..N).map(|i| vec![v + i as f32; 2]).collect());
        Transition::new(
            obs(v),
            JointAct((0..N).map(|i| {
                let mut a = vec![0.0; 3];
                a[i % 3] = 1.0;
                a
            }).collect()),
            obs(v + 0.5),
            vec![1.0; N],
            vec![false; N],
        )
        .unwrap()
    }

    fn batch() -> JointBatch {
        let trs: Vec<Transition> = (0..4).map(|j| transition(j as f32 * 0.1)).collect();
        let refs: Vec<&Transition> = trs.iter().collect();
        JointBatch::from_transitions(&refs, tch::Device::Cpu).unwrap()
    }

    fn maddpg(target_all_agents: bool) -> Maddpg {
        let config = MaddpgConfig::default()
            .batch_size(4)
            .target_all_agents(target_all_agents)
            .device(MarlDevice::Cpu);
        let mut maddpg =
            Maddpg::build(config, &[2; N], &[ActionSpace::Discrete(3); N]).unwrap();

        // Non-zero output layers of the critics
        for model in [&mut maddpg.model, &mut maddpg.model_tgt] {
            let mut vs = model.get_var_store_mut().variables();
            no_grad(|| {
                for i in 0..N {
                    let w = vs.get_mut(&format!("agent_{}/critic/critic/weight", i)).unwrap();
                    w.copy_(&w.randn_like());
                }
            });
        }
        maddpg
    }

    fn actor_grad_norms(maddpg: &Maddpg) -> Vec<f64> {
        let vs = maddpg.model.get_var_store().variables();
        (0..N)
            .map(|i| {
                vs.iter()
                    .filter(|(k, _)| k.starts_with(&format!("agent_{}/actor/", i)))
                    .map(|(_, v)| {
                        let g = v.grad();
                        match g.defined() {
                            true => g.abs().sum(Kind::Float).double_value(&[]),
                            false => 0.0,
                        }
                    })
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_actor_loss_reaches_only_own_actor() {
        let maddpg = maddpg(false);
        let batch = batch();
        maddpg.actor_loss(1, &batch).backward();
        let norms = actor_grad_norms(&maddpg);
        assert_eq!(norms[0], 0.0);
        assert!(norms[1] > 0.0);
        assert_eq!(norms[2], 0.0);
    }

    #[test]
    fn test_critic_targets_use_only_own_target_actor() {
        let mut maddpg = maddpg(false);
        let batch = batch();
        let before = maddpg.critic_targets(&batch);

        // Perturb the target actor of agent 0
        let mut vs = maddpg.model_tgt.get_var_store_mut().variables();
        no_grad(|| {
            for (k, v) in vs.iter_mut() {
                if k.starts_with("agent_0/actor/") {
                    v.copy_(&v.randn_like());
                }
            }
        });
        let after = maddpg.critic_targets(&batch);

        for i in 1..N {
            let diff = (&after[i] - &before[i]).abs().max().double_value(&[]);
            assert_eq!(diff, 0.0);
        }
    }

    #[test]
    fn test_critic_targets_bootstrap() {
        let maddpg = maddpg(false);
        let batch = batch();
        let tgt = maddpg.critic_targets(&batch);
        let discount = maddpg.config.discount_factor;

        for i in 0..N {
            let act_i = onehot_from_logits(&maddpg.model_tgt.agent(i).actor(&batch.next_obs[i]));
            let acts: Vec<Tensor> = (0..N)
                .map(|j| match j == i {
                    true => act_i.shallow_clone(),
                    false => batch.act[j].shallow_clone(),
                })
                .collect();
            let q_next = maddpg
                .model_tgt
                .agent(i)
                .critic()
                .forward(&batch.joint_next_obs(), &Tensor::cat(&acts, 1))
                .squeeze_dim(-1);
            assert!(q_next.abs().min().double_value(&[]) > 0.0);

            // Rewards are 1 and no transition is terminal
            let expected = &q_next * discount + 1.0;
            let diff = (&tgt[i] - expected).abs().max().double_value(&[]);
            assert!(diff < 1e-5);
        }
    }

    #[test]
    fn test_update_records_losses() {
        let mut maddpg = maddpg(true);
        let mut store = TransitionStore::new(10, 0);
        let tr = transition(0.0);
        for _ in 0..3 {
            store.push(tr.clone());
        }
        assert!(maddpg.update(&tr, &mut store).unwrap().is_none());

        store.push(tr.clone());
        let record = maddpg.update(&tr, &mut store).unwrap().unwrap();
        for i in 0..N {
            assert!(record.get_scalar(&format!("agent_{}/critic_loss", i)).is_ok());
            assert!(record.get_scalar(&format!("agent_{}/actor_loss", i)).is_ok());
        }
        let loss = record.get_scalar("overall/loss").unwrap();
        let critic_loss = record.get_scalar("overall/critic_loss").unwrap();
        let actor_loss = record.get_scalar("overall/actor_loss").unwrap();
        assert!((loss - critic_loss - actor_loss).abs() < 1e-4);
        assert_eq!(maddpg.n_updates(), 1);
    }

    #[test]
    fn test_select_action_is_onehot() {
        let mut maddpg = maddpg(false);
        let obs = JointObs(vec![vec![0.1, 0.2]; N]);
        for explore in [true, false] {
            let act = maddpg.select_action(&obs, explore).unwrap();
            for i in 0..N {
                let a = act.agent(i);
                assert_eq!(a.len(), 3);
                assert_eq!(a.iter().sum::<f32>(), 1.0);
            }
        }
    }
}
