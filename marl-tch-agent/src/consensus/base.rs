//! Q-learning on a consensus thought.
use super::{
    config::ConsensusConfig,
    model::{ConsensusNet, ConsensusNetConfig},
};
use crate::{
    dqn::{seeded, DqnExplorer},
    model::{ModelBase, MultiAgentModel},
    util::{discrete_actions, obs_to_tensor, to_f32, track},
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

/// Q-learning agents sharing a consensus thought.
///
/// Each agent encodes its observation into a thought. The action values of
/// agent `i` are a baseline on the global thought plus an advantage on its
/// own thought and the global thought. With consensus, the global thought
/// is the mean of the thoughts of all agents; otherwise it is the thought
/// of the agent itself.
pub struct ConsensusDqn {
    config: ConsensusConfig,
    qnet: MultiAgentModel<ConsensusNet>,
    qnet_tgt: MultiAgentModel<ConsensusNet>,
    explorers: Vec<DqnExplorer>,
    obs_dims: Vec<usize>,
    action_spaces: Vec<ActionSpace>,
    device: Device,
    n_updates: usize,
    train: bool,
}

impl ConsensusDqn {
    /// Constructs the agents for the given observation widths and action spaces.
    pub fn build(
        config: ConsensusConfig,
        obs_dims: &[usize],
        action_spaces: &[ActionSpace],
    ) -> Result<Self> {
        let name = match config.consensus {
            true => "DQN_CONSENSUS",
            false => "DQN_SHARE_NOCONSENSUS",
        };
        let device = config.device.resolve()?;
        let n_actions = discrete_actions(action_spaces, name)?;
        let configs = obs_dims
            .iter()
            .zip(n_actions.iter())
            .map(|(&obs_dim, &n)| ConsensusNetConfig {
                obs_dim: obs_dim as i64,
                units: config.units.clone(),
                hidden_size: config.hidden_size,
                n_actions: n,
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
        })
    }

    /// Action values of all agents, `[batch, n_actions_i]` each.
    fn q_values(
        model: &MultiAgentModel<ConsensusNet>,
        consensus: bool,
        obs: &[Tensor],
    ) -> Vec<Tensor> {
        let thoughts: Vec<Tensor> = model
            .agents()
            .iter()
            .zip(obs.iter())
            .map(|(agent, obs)| agent.thought(obs))
            .collect();
        let global = match consensus {
            true => Some(Tensor::stack(&thoughts, 0).mean_dim(
                [0i64].as_slice(),
                false,
                Kind::Float,
            )),
            false => None,
        };
        model
            .agents()
            .iter()
            .zip(thoughts.iter())
            .map(|(agent, local)| agent.forward(local, global.as_ref().unwrap_or(local)))
            .collect()
    }

    /// Targets of the action values of all agents, each of shape `[batch]`.
    pub fn targets(&self, batch: &JointBatch) -> Vec<Tensor> {
        no_grad(|| {
            Self::q_values(&self.qnet_tgt, self.config.consensus, &batch.next_obs)
                .iter()
                .enumerate()
                .map(|(i, q)| {
                    let (q_next, _) = q.max_dim(-1, false);
                    batch.reward(i) + self.config.discount_factor * q_next * batch.not_done(i)
                })
                .collect()
        })
    }

    fn update_critic(&mut self, batch: &JointBatch) -> Result<Record> {
        let mut record = Record::empty();
        let tgt = self.targets(batch);
        let qs = Self::q_values(&self.qnet, self.config.consensus, &batch.obs);
        let losses: Vec<Tensor> = qs
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let pred = q.gather(1, &batch.act_index(i), false).squeeze_dim(-1);
                let loss = self.config.critic_loss.loss(&pred, &tgt[i]);
                record.insert(format!("agent_{}/loss", i), RecordValue::Scalar(to_f32(&loss)));
                loss
            })
            .collect();
        let loss = Tensor::stack(&losses, 0).sum(Kind::Float);

        self.qnet.step(&loss, self.config.clip_grad_norm)?;
        track(&mut self.qnet_tgt, &self.qnet, self.config.tau);
        self.n_updates += 1;

        let loss = to_f32(&loss);
        debug!("Consensus DQN update {}: loss {}", self.n_updates, loss);
        record.insert("overall/loss", RecordValue::Scalar(loss));
        Ok(record)
    }
}

impl Algorithm for ConsensusDqn {
    fn n_agents(&self) -> usize {
        self.qnet.n_agents()
    }

    fn select_action(&mut self, obs: &JointObs, explore: bool) -> Result<JointAct> {
        obs.check_dims(&self.obs_dims)?;
        let obs: Vec<Tensor> = (0..obs.n_agents())
            .map(|i| obs_to_tensor(obs.agent(i), self.device))
            .collect();
        let qs = no_grad(|| Self::q_values(&self.qnet, self.config.consensus, &obs));
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

    fn build(consensus: bool) -> ConsensusDqn {
        let config = ConsensusConfig::default()
            .consensus(consensus)
            .batch_size(2)
            .device(MarlDevice::Cpu);
        ConsensusDqn::build(config, &[3, 3], &[ActionSpace::Discrete(2); 2]).unwrap()
    }

    fn obs(v: f32) -> Vec<Tensor> {
        vec![
            Tensor::from_slice(&[v, 0.5, -v]).view([1, 3]),
            Tensor::from_slice(&[-v, 1.0, v]).view([1, 3]),
        ]
    }

    #[test]
    fn test_consensus_couples_agents() {
        // Changing the observation of agent 1 changes the action values of
        // agent 0 only with consensus
        for consensus in [true, false] {
            let dqn = build(consensus);
            let mut obs1 = obs(0.3);
            let q0 = ConsensusDqn::q_values(&dqn.qnet, consensus, &obs1);
            obs1[1] = Tensor::from_slice(&[2.0f32, -1.0, 3.0]).view([1, 3]);
            let q1 = ConsensusDqn::q_values(&dqn.qnet, consensus, &obs1);
            let diff = (&q1[0] - &q0[0]).abs().sum(Kind::Float).double_value(&[]);
            match consensus {
                true => assert!(diff > 0.0),
                false => assert_eq!(diff, 0.0),
            }
        }
    }

    #[test]
    fn test_update() {
        let mut dqn = build(true);
        let mut store = TransitionStore::new(10, 0);
        let tr = Transition::new(
            JointObs(vec![vec![0.1, 0.2, 0.3], vec![0.3, 0.2, 0.1]]),
            JointAct(vec![vec![1.0, 0.0], vec![0.0, 1.0]]),
            JointObs(vec![vec![0.2, 0.3, 0.4], vec![0.4, 0.3, 0.2]]),
            vec![1.0, 1.0],
            vec![false, false],
        )
        .unwrap();
        store.push(tr.clone());
        assert!(dqn.update(&tr, &mut store).unwrap().is_none());

        store.push(tr.clone());
        let record = dqn.update(&tr, &mut store).unwrap().unwrap();
        assert!(record.get_scalar("agent_0/loss").is_ok());
        assert!(record.get_scalar("overall/loss").unwrap() > 0.0);
        assert_eq!(dqn.n_updates(), 1);

        let act = dqn
            .select_action(&JointObs(vec![vec![0.0; 3], vec![1.0; 3]]), false)
            .unwrap();
        assert_eq!(act.agent(1).len(), 2);
    }
}
