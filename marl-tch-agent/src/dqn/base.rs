//! Q-learning of multiple agents.
use super::{
    config::DqnConfig,
    explorer::{seeded, DqnExplorer},
    model::QNet,
};
use crate::{
    mlp::MlpConfig,
    model::{ModelBase, MultiAgentModel},
    util::{discrete_actions, obs_to_tensor, to_f32, track, CriticLoss},
    JointBatch,
};
use anyhow::Result;
use log::debug;
use marl_core::{
    record::{Record, RecordValue},
    replay_buffer::TransitionStore,
    ActionSpace, Algorithm, JointAct, JointObs, Transition,
};
use std::{fs, marker::PhantomData, path::Path};
use tch::{no_grad, Device, Kind, Tensor};

/// Combines per-agent action values and targets into a loss.
pub trait Mixer {
    /// Name used in log messages.
    const NAME: &'static str;

    /// If `true`, the gradients of each agent are clipped by their own norm,
    /// so that no agent's update depends on the losses of the others.
    const INDEPENDENT: bool;

    /// Returns the loss and its record.
    ///
    /// `pred[i]` and `tgt[i]` are the action values of agent `i` at the taken
    /// actions and their targets, both of shape `[batch]`.
    fn loss(pred: &[Tensor], tgt: &[Tensor], critic_loss: &CriticLoss) -> (Tensor, Record);
}

/// Each agent regresses its own action values on its own targets.
pub struct Independent;

impl Mixer for Independent {
    const NAME: &'static str = "IDQN";
    const INDEPENDENT: bool = true;

    fn loss(pred: &[Tensor], tgt: &[Tensor], critic_loss: &CriticLoss) -> (Tensor, Record) {
        let mut record = Record::empty();
        let losses: Vec<Tensor> = pred
            .iter()
            .zip(tgt.iter())
            .enumerate()
            .map(|(i, (pred, tgt))| {
                let loss = critic_loss.loss(pred, tgt);
                record.insert(format!("agent_{}/loss", i), RecordValue::Scalar(to_f32(&loss)));
                loss
            })
            .collect();
        let loss = Tensor::stack(&losses, 0).sum(Kind::Float);
        record.insert("overall/loss", RecordValue::Scalar(to_f32(&loss)));
        (loss, record)
    }
}

/// The sum of the action values of all agents regresses the sum of their targets.
pub struct ValueDecomposition;

impl Mixer for ValueDecomposition {
    const NAME: &'static str = "VDN";
    const INDEPENDENT: bool = false;

    fn loss(pred: &[Tensor], tgt: &[Tensor], critic_loss: &CriticLoss) -> (Tensor, Record) {
        let pred = Tensor::stack(pred, 0).sum_dim_intlist([0i64].as_slice(), false, Kind::Float);
        let tgt = Tensor::stack(tgt, 0).sum_dim_intlist([0i64].as_slice(), false, Kind::Float);
        let loss = critic_loss.loss(&pred, &tgt);
        let record = Record::from_scalar("overall/loss", to_f32(&loss));
        (loss, record)
    }
}

/// Q-learning agents, each with an action-value network over its own observation.
///
/// The target of agent `i` is `r_i + discount * max_a Q_tgt_i(o'_i, a) * (1 - done_i)`.
/// How the action values of the agents are combined into a loss is given by
/// the [`Mixer`].
pub struct Dqn<M: Mixer> {
    config: DqnConfig,
    qnet: MultiAgentModel<QNet>,
    qnet_tgt: MultiAgentModel<QNet>,
    explorers: Vec<DqnExplorer>,
    obs_dims: Vec<usize>,
    action_spaces: Vec<ActionSpace>,
    device: Device,
    n_updates: usize,
    train: bool,
    phantom: PhantomData<M>,
}

/// Independent Q-learning.
pub type Idqn = Dqn<Independent>;

/// Value-decomposition networks.
pub type Vdn = Dqn<ValueDecomposition>;

impl<M: Mixer> Dqn<M> {
    /// Constructs the agents for the given observation widths and action spaces.
    pub fn build(
        config: DqnConfig,
        obs_dims: &[usize],
        action_spaces: &[ActionSpace],
    ) -> Result<Self> {
        let device = config.device.resolve()?;
        let n_actions = discrete_actions(action_spaces, M::NAME)?;
        let configs = obs_dims
            .iter()
            .zip(n_actions.iter())
            .map(|(&obs_dim, &n)| {
                MlpConfig::new(obs_dim as i64, config.units.clone(), n).zero_init_out(true)
            })
            .collect();
        let qnet = MultiAgentModel::build(configs, &config.opt_config, device)?;
        let qnet_tgt = qnet.target()?;

        Ok(Self {
            explorers: seeded(&config.explorer, obs_dims.len(), config.seed),
            config,
            qnet,
            qnet_tgt,
            obs_dims: obs_dims.to_vec(),
            action_spaces: action_spaces.to_vec(),
            device,
            n_updates: 0,
            train: false,
            phantom: PhantomData,
        })
    }

    /// Action values of agent `i`, `[batch, n_actions]`.
    pub fn q_values(&self, i: usize, obs: &Tensor) -> Tensor {
        self.qnet.agent(i).forward(obs)
    }

    /// Action values of agent `i` by the target network, `[batch, n_actions]`.
    pub fn target_q_values(&self, i: usize, obs: &Tensor) -> Tensor {
        self.qnet_tgt.agent(i).forward(obs)
    }

    /// Targets of the action values of all agents, each of shape `[batch]`.
    pub fn targets(&self, batch: &JointBatch) -> Vec<Tensor> {
        no_grad(|| {
            (0..self.qnet.n_agents())
                .map(|i| {
                    let (q_next, _) = self
                        .target_q_values(i, &batch.next_obs[i])
                        .max_dim(-1, false);
                    batch.reward(i) + self.config.discount_factor * q_next * batch.not_done(i)
                })
                .collect()
        })
    }

    fn update_critic(&mut self, batch: &JointBatch) -> Result<Record> {
        let pred: Vec<Tensor> = (0..self.qnet.n_agents())
            .map(|i| {
                self.q_values(i, &batch.obs[i])
                    .gather(1, &batch.act_index(i), false)
                    .squeeze_dim(-1)
            })
            .collect();
        let tgt = self.targets(batch);
        let (loss, record) = M::loss(&pred, &tgt, &self.config.critic_loss);

        match M::INDEPENDENT {
            true => self.qnet.step_per_agent(&loss, self.config.clip_grad_norm)?,
            false => self.qnet.step(&loss, self.config.clip_grad_norm)?,
        }
        track(&mut self.qnet_tgt, &self.qnet, self.config.tau);
        self.n_updates += 1;
        debug!("{} update {}: loss {}", M::NAME, self.n_updates, to_f32(&loss));

        Ok(record)
    }
}

impl<M: Mixer> Algorithm for Dqn<M> {
    fn n_agents(&self) -> usize {
        self.qnet.n_agents()
    }

    fn select_action(&mut self, obs: &JointObs, explore: bool) -> Result<JointAct> {
        obs.check_dims(&self.obs_dims)?;
        let qs: Vec<Tensor> = no_grad(|| {
            (0..self.qnet.n_agents())
                .map(|i| self.q_values(i, &obs_to_tensor(obs.agent(i), self.device)))
                .collect()
        });
        let ixs: Vec<usize> = qs
            .iter()
            .zip(self.explorers.iter_mut())
            .map(|(q, explorer)| match explore {
                true => explorer.action(q) as usize,
                false => q.argmax(-1, false).int64_value(&[0]) as usize,
            })
            .collect();
        Ok(JointAct::from_indices(&ixs, &self.action_spaces))
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
            Some(batch) => Ok(Some(self.update_critic(&batch)?)),
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
        self.qnet.save(path.join("qnet.pt"))?;
        self.qnet_tgt.save(path.join("qnet_tgt.pt"))?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.qnet.load(path.join("qnet.pt"))?;
        self.qnet_tgt.load(path.join("qnet_tgt.pt"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Device as MarlDevice;
    use std::collections::HashMap;

    fn transition_with_reward(v: f32, done: bool, reward: Vec<f32>) -> Transition {
        Transition::new(
            JointObs(vec![vec![v; 3], vec![-v; 3]]),
            JointAct(vec![vec![0.0, 1.0], vec![1.0, 0.0]]),
            JointObs(vec![vec![v + 0.1; 3], vec![-v - 0.1; 3]]),
            reward,
            vec![done, done],
        )
        .unwrap()
    }

    fn transition(v: f32, done: bool) -> Transition {
        transition_with_reward(v, done, vec![1.0, 0.5])
    }

    fn store_with_reward(n: usize, reward_0: f32) -> TransitionStore {
        let mut store = TransitionStore::new(100, 0);
        for j in 0..n {
            let reward = vec![reward_0, 0.5];
            store.push(transition_with_reward(j as f32 * 0.1, j % 5 == 4, reward));
        }
        store
    }

    fn store(n: usize) -> TransitionStore {
        store_with_reward(n, 1.0)
    }

    fn config() -> DqnConfig {
        DqnConfig::default().batch_size(4).device(MarlDevice::Cpu)
    }

    #[test]
    fn test_continuous_action_space_is_rejected() {
        let res = Idqn::build(config(), &[3], &[ActionSpace::Continuous(2)]);
        assert!(res.is_err());
    }

    #[test]
    fn test_targets_of_zero_initialized_network() {
        let spaces = vec![ActionSpace::Discrete(2); 2];
        let vdn = Vdn::build(config(), &[3, 3], &spaces).unwrap();
        let trs = vec![transition(0.1, false), transition(0.2, true)];
        let refs: Vec<&Transition> = trs.iter().collect();
        let batch = JointBatch::from_transitions(&refs, tch::Device::Cpu).unwrap();

        // The output layers are zero, so the targets are the rewards
        let tgt = vdn.targets(&batch);
        assert_eq!(Vec::<f32>::try_from(&tgt[0]).unwrap(), vec![1.0, 1.0]);
        assert_eq!(Vec::<f32>::try_from(&tgt[1]).unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_update_skipped_while_underfull() {
        let spaces = vec![ActionSpace::Discrete(2); 2];
        let mut idqn = Idqn::build(config(), &[3, 3], &spaces).unwrap();
        let mut store = store(3);
        let tr = transition(0.0, false);
        assert!(idqn.update(&tr, &mut store).unwrap().is_none());
        assert_eq!(idqn.n_updates(), 0);

        store.push(tr.clone());
        let record = idqn.update(&tr, &mut store).unwrap().unwrap();
        assert!(record.get_scalar("agent_0/loss").is_ok());
        assert!(record.get_scalar("agent_1/loss").is_ok());
        assert!(record.get_scalar("overall/loss").is_ok());
        assert_eq!(idqn.n_updates(), 1);
    }

    #[test]
    fn test_vdn_update_changes_all_agents() {
        let spaces = vec![ActionSpace::Discrete(2); 2];
        let mut vdn = Vdn::build(config(), &[3, 3], &spaces).unwrap();
        let mut store = store(10);
        let before = vdn.qnet.target().unwrap();

        let tr = transition(0.0, false);
        let record = vdn.update(&tr, &mut store).unwrap().unwrap();
        assert!(record.get_scalar("overall/loss").unwrap() > 0.0);

        let vs = vdn.qnet.get_var_store().variables();
        let vs_before = before.get_var_store().variables();
        for i in 0..2 {
            let name = format!("agent_{}/q/ln1/weight", i);
            let diff = (&vs[&name] - &vs_before[&name]).abs().sum(Kind::Float);
            assert!(diff.double_value(&[]) > 0.0);
        }
    }

    #[test]
    fn test_select_action_checks_shapes() {
        let spaces = vec![ActionSpace::Discrete(2); 2];
        let mut idqn = Idqn::build(config(), &[3, 3], &spaces).unwrap();
        let act = idqn
            .select_action(&JointObs(vec![vec![0.0; 3], vec![1.0; 3]]), true)
            .unwrap();
        assert_eq!(act.n_agents(), 2);
        assert!(idqn
            .select_action(&JointObs(vec![vec![0.0; 3], vec![1.0; 4]]), false)
            .is_err());
    }

    #[test]
    fn test_idqn_agents_learn_independently() {
        let spaces = vec![ActionSpace::Discrete(2); 2];
        let idqn = Idqn::build(config(), &[3, 3], &spaces).unwrap();

        // Same initial parameters, rewards of agent 0 differ in scale
        let train = |reward_0: f32| -> HashMap<String, Tensor> {
            let mut algo = Idqn::build(config(), &[3, 3], &spaces).unwrap();
            algo.qnet.get_var_store_mut().copy(idqn.qnet.get_var_store()).unwrap();
            algo.qnet_tgt.get_var_store_mut().copy(idqn.qnet_tgt.get_var_store()).unwrap();
            let mut store = store_with_reward(10, reward_0);
            let tr = transition(0.0, false);
            for _ in 0..5 {
                algo.update(&tr, &mut store).unwrap().unwrap();
            }
            algo.qnet.get_var_store().variables()
        };
        let vs_small = train(1.0);
        let vs_large = train(1e4);

        let diff = |name: &str| -> f64 {
            (&vs_small[name] - &vs_large[name])
                .abs()
                .max()
                .double_value(&[])
        };
        assert!(diff("agent_0/q/ln0/weight") > 0.0);
        assert!(diff("agent_1/q/ln0/weight") < 1e-7);
        assert!(diff("agent_1/q/ln1/weight") < 1e-7);
    }

    #[test]
    fn test_vdn_agents_share_the_clipping() {
        let spaces = vec![ActionSpace::Discrete(2); 2];
        let vdn = Vdn::build(config(), &[3, 3], &spaces).unwrap();

        let train = |reward_0: f32| -> HashMap<String, Tensor> {
            let mut algo = Vdn::build(config(), &[3, 3], &spaces).unwrap();
            algo.qnet.get_var_store_mut().copy(vdn.qnet.get_var_store()).unwrap();
            algo.qnet_tgt.get_var_store_mut().copy(vdn.qnet_tgt.get_var_store()).unwrap();
            let mut store = store_with_reward(10, reward_0);
            let tr = transition(0.0, false);
            for _ in 0..5 {
                algo.update(&tr, &mut store).unwrap().unwrap();
            }
            algo.qnet.get_var_store().variables()
        };
        let vs_small = train(1.0);
        let vs_large = train(1e4);

        // The joint loss couples the agents
        let diff = (&vs_small["agent_1/q/ln1/weight"] - &vs_large["agent_1/q/ln1/weight"])
            .abs()
            .max()
            .double_value(&[]);
        assert!(diff > 0.0);
    }
}
