use anyhow::Result;
use marl_core::{error::MarlError, replay_buffer::TransitionStore, Transition};
use tch::{Device, Kind, Tensor};

/// A batch of joint transitions as tensors.
///
/// Per-agent components are kept separately since observation and action
/// widths may differ between agents. Joint tensors concatenate them along
/// the feature axis in agent order.
pub struct JointBatch {
    /// Observation of each agent, `[batch, obs_dim_i]`.
    pub obs: Vec<Tensor>,

    /// Action of each agent, `[batch, act_dim_i]`.
    pub act: Vec<Tensor>,

    /// Next observation of each agent, `[batch, obs_dim_i]`.
    pub next_obs: Vec<Tensor>,

    /// Rewards, `[batch, n_agents]`.
    pub reward: Tensor,

    /// `1 - done`, `[batch, n_agents]`.
    pub not_done: Tensor,
}

fn rows<'a>(
    it: impl Iterator<Item = &'a [f32]>,
    agent: usize,
    width: usize,
    device: Device,
) -> Result<Tensor> {
    let mut flat = vec![];
    let mut n = 0i64;
    for row in it {
        if row.len() != width {
            return Err(MarlError::ShapeMismatch {
                agent,
                expected: width,
                actual: row.len(),
            }
            .into());
        }
        flat.extend_from_slice(row);
        n += 1;
    }
    Ok(Tensor::from_slice(&flat)
        .view([n, width as i64])
        .to_device(device))
}

impl JointBatch {
    /// Builds a batch from transitions.
    ///
    /// Widths are taken from the first transition.
    pub fn from_transitions(trs: &[&Transition], device: Device) -> Result<Self> {
        let first = trs
            .first()
            .ok_or_else(|| anyhow::anyhow!("Empty batch of transitions"))?;
        let n = first.n_agents();
        for tr in trs.iter() {
            if tr.n_agents() != n {
                return Err(MarlError::AgentCountMismatch {
                    expected: n,
                    actual: tr.n_agents(),
                }
                .into());
            }
        }

        let mut obs = Vec::with_capacity(n);
        let mut act = Vec::with_capacity(n);
        let mut next_obs = Vec::with_capacity(n);
        for i in 0..n {
            let obs_dim = first.obs.agent(i).len();
            let act_dim = first.act.agent(i).len();
            obs.push(rows(trs.iter().map(|tr| tr.obs.agent(i)), i, obs_dim, device)?);
            act.push(rows(trs.iter().map(|tr| tr.act.agent(i)), i, act_dim, device)?);
            next_obs.push(rows(
                trs.iter().map(|tr| tr.next_obs.agent(i)),
                i,
                obs_dim,
                device,
            )?);
        }

        let reward: Vec<f32> = trs.iter().flat_map(|tr| tr.reward.iter().copied()).collect();
        let not_done: Vec<f32> = trs
            .iter()
            .flat_map(|tr| tr.is_done.iter().map(|&d| if d { 0f32 } else { 1f32 }))
            .collect();
        let b = trs.len() as i64;

        Ok(Self {
            obs,
            act,
            next_obs,
            reward: Tensor::from_slice(&reward).view([b, n as i64]).to_device(device),
            not_done: Tensor::from_slice(&not_done)
                .view([b, n as i64])
                .to_device(device),
        })
    }

    /// Samples a batch from the store.
    ///
    /// Returns `None` if the store holds fewer than `batch_size` transitions.
    pub fn sample(
        store: &mut TransitionStore,
        batch_size: usize,
        device: Device,
    ) -> Result<Option<Self>> {
        match store.sample(batch_size) {
            Ok(trs) => Ok(Some(Self::from_transitions(&trs, device)?)),
            Err(MarlError::InsufficientData { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of transitions.
    pub fn batch_size(&self) -> i64 {
        self.reward.size()[0]
    }

    /// Number of agents.
    pub fn n_agents(&self) -> usize {
        self.obs.len()
    }

    /// Rewards of agent `i`, `[batch]`.
    pub fn reward(&self, i: usize) -> Tensor {
        self.reward.select(1, i as i64)
    }

    /// `1 - done` of agent `i`, `[batch]`.
    pub fn not_done(&self, i: usize) -> Tensor {
        self.not_done.select(1, i as i64)
    }

    /// Indices of the discrete actions of agent `i`, `[batch, 1]`.
    pub fn act_index(&self, i: usize) -> Tensor {
        self.act[i].argmax(-1, true).to_kind(Kind::Int64)
    }

    /// Observations of all agents, `[batch, sum_i obs_dim_i]`.
    pub fn joint_obs(&self) -> Tensor {
        Tensor::cat(&self.obs, 1)
    }

    /// Next observations of all agents, `[batch, sum_i obs_dim_i]`.
    pub fn joint_next_obs(&self) -> Tensor {
        Tensor::cat(&self.next_obs, 1)
    }

    /// Actions of all agents, `[batch, sum_i act_dim_i]`.
    pub fn joint_act(&self) -> Tensor {
        Tensor::cat(&self.act, 1)
    }
}
