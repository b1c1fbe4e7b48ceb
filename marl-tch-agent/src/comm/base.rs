//! Communicating recurrent agents.
use super::{
    config::{CommConfig, CommKind},
    model::{CommNet, CommNetConfig},
};
use crate::{
    action::to_joint_act,
    lstm::{Hidden, ThoughtEncoderConfig},
    model::{ModelBase, MultiAgentModel},
    util::{discrete_actions, obs_to_tensor, onehot_from_logits, to_f32, track},
};
use anyhow::Result;
use log::{debug, trace};
use marl_core::{
    record::{Record, RecordValue},
    replay_buffer::TransitionStore,
    ActionSpace, Algorithm, JointAct, JointObs, Transition,
};
use std::{fs, path::Path};
use tch::{no_grad, Device, Kind, Tensor};

/// Thoughts and logits of the last exploring step, kept with their graph
/// for the update on the transition of that step.
struct StepCache {
    thoughts: Vec<Tensor>,
    logits: Vec<Tensor>,
}

/// Own thought first, then the thoughts of the other agents in order.
fn all_thoughts(i: usize, thoughts: &[Tensor]) -> Vec<Tensor> {
    let mut xs = vec![thoughts[i].shallow_clone()];
    xs.extend(
        thoughts
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, t)| t.shallow_clone()),
    );
    xs
}

fn other_actions(i: usize, acts: &[Tensor]) -> Vec<Tensor> {
    acts.iter()
        .enumerate()
        .filter(|(j, _)| *j != i)
        .map(|(_, a)| a.shallow_clone())
        .collect()
}

/// Mean of the thoughts of all agents.
fn global_thought(thoughts: &[Tensor]) -> Tensor {
    Tensor::stack(thoughts, 0).mean_dim([0i64].as_slice(), false, Kind::Float)
}

fn policy_input(kind: CommKind, i: usize, thoughts: &[Tensor]) -> Tensor {
    match kind.uses_global_thought() {
        true => Tensor::cat(&[thoughts[i].shallow_clone(), global_thought(thoughts)], 1),
        false => Tensor::cat(&all_thoughts(i, thoughts), 1),
    }
}

fn critic_input(kind: CommKind, i: usize, thoughts: &[Tensor], acts: &[Tensor]) -> Tensor {
    let mut xs = match kind {
        CommKind::ThoughtShare => all_thoughts(i, thoughts),
        CommKind::CounterfactualThoughtShare => {
            let mut xs = all_thoughts(i, thoughts);
            xs.extend(acts.iter().map(|a| a.shallow_clone()));
            xs
        }
        CommKind::HybridShare => all_thoughts(i, thoughts),
        CommKind::GlobalThought => vec![thoughts[i].shallow_clone(), global_thought(thoughts)],
        CommKind::GlobalThoughtAdvantage => vec![global_thought(thoughts)],
    };
    if matches!(
        kind,
        CommKind::HybridShare | CommKind::GlobalThought | CommKind::GlobalThoughtAdvantage
    ) {
        xs.extend(other_actions(i, acts));
    }
    Tensor::cat(&xs, 1)
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Recurrent agents exchanging thoughts, trained online by one-step actor-critic.
///
/// Every agent folds its observation into an LSTM state whose hidden
/// vector is its thought. The policy and the critic of each agent consume
/// the thoughts of the agents as given by [`CommKind`].
///
/// ```mermaid
/// graph LR
///     O_i[obs_i] --> E_i[encoder_i]
///     H_i[hidden_i] --> E_i
///     E_i --> T_i[thought_i]
///     T_i --> P_i[pi_i]
///     T_j[thoughts of neighbors] --> P_i
///     T_i --> C_i[critic_i]
///     T_j --> C_i
///     A_j[actions] --> C_i
/// ```
///
/// [`Algorithm::select_action`] advances the hidden states of all agents.
/// During training, [`Algorithm::update`] learns from the just-taken
/// transition: the critic regresses `r_i + discount * V_tgt(next)` and the
/// policy follows `-log pi(a_i) * advantage`. The hidden states are
/// detached after every step, so gradients flow through a single step of
/// the recurrence.
pub struct Comm {
    config: CommConfig,
    model: MultiAgentModel<CommNet>,
    model_tgt: MultiAgentModel<CommNet>,
    hidden: Vec<Hidden>,
    cache: Option<StepCache>,
    obs_dims: Vec<usize>,
    action_spaces: Vec<ActionSpace>,
    n_actions: Vec<i64>,
    device: Device,
    n_updates: usize,
    train: bool,
}

impl Comm {
    /// Constructs the agents for the given observation widths and action spaces.
    pub fn build(
        config: CommConfig,
        obs_dims: &[usize],
        action_spaces: &[ActionSpace],
    ) -> Result<Self> {
        let kind = config.kind;
        let device = config.device.resolve()?;
        let n_actions = discrete_actions(action_spaces, kind.name())?;
        let n_agents = obs_dims.len() as i64;
        let h = config.hidden_size;
        let joint_act_dim: i64 = n_actions.iter().sum();

        let policy_in = match kind.uses_global_thought() {
            true => 2 * h,
            false => h * n_agents,
        };
        let configs = obs_dims
            .iter()
            .zip(n_actions.iter())
            .map(|(&obs_dim, &n)| {
                let others_act_dim = joint_act_dim - n;
                let critic_in = match kind {
                    CommKind::ThoughtShare => h * n_agents,
                    CommKind::CounterfactualThoughtShare => h * n_agents + joint_act_dim,
                    CommKind::HybridShare => h * n_agents + others_act_dim,
                    CommKind::GlobalThought => 2 * h + others_act_dim,
                    CommKind::GlobalThoughtAdvantage => h + others_act_dim,
                };
                CommNetConfig {
                    encoder: ThoughtEncoderConfig {
                        obs_dim: obs_dim as i64,
                        units: config.units.clone(),
                        x_dim: config.x_dim,
                        hidden_size: h,
                    },
                    n_actions: n,
                    policy_in,
                    critic_in,
                    dueling: kind == CommKind::GlobalThoughtAdvantage,
                }
            })
            .collect();
        let model = MultiAgentModel::build(configs, &config.opt_config, device)?;
        let model_tgt = model.target()?;

        let mut comm = Self {
            config,
            model,
            model_tgt,
            hidden: vec![],
            cache: None,
            obs_dims: obs_dims.to_vec(),
            action_spaces: action_spaces.to_vec(),
            n_actions,
            device,
            n_updates: 0,
            train: false,
        };
        comm.init_hidden();
        Ok(comm)
    }

    fn init_hidden(&mut self) {
        self.hidden = self
            .model
            .agents()
            .iter()
            .map(|agent| agent.encoder().init_hidden(1))
            .collect();
        self.cache = None;
    }

    fn hidden_detach(&mut self) {
        self.hidden = self.hidden.iter().map(|h| h.detach()).collect();
    }

    /// Hidden states of the agents.
    pub fn hidden(&self) -> &[Hidden] {
        &self.hidden
    }

    /// Advances the hidden states on the observations and returns them
    /// with the logits of the policies.
    fn forward(
        model: &MultiAgentModel<CommNet>,
        kind: CommKind,
        obs: &[Tensor],
        hidden: &[Hidden],
    ) -> (Vec<Hidden>, Vec<Tensor>) {
        let hidden: Vec<Hidden> = model
            .agents()
            .iter()
            .zip(obs.iter().zip(hidden.iter()))
            .map(|(agent, (obs, hidden))| agent.thought(obs, hidden))
            .collect();
        let thoughts: Vec<Tensor> = hidden.iter().map(|h| h.hx.shallow_clone()).collect();
        let logits = model
            .agents()
            .iter()
            .enumerate()
            .map(|(i, agent)| agent.policy(&policy_input(kind, i, &thoughts)))
            .collect();
        (hidden, logits)
    }

    /// Critic values of agent `i` at the given actions, `[batch]`.
    fn value_at(
        model: &MultiAgentModel<CommNet>,
        kind: CommKind,
        i: usize,
        thoughts: &[Tensor],
        acts: &[Tensor],
    ) -> Tensor {
        let v = model
            .agent(i)
            .critic(&critic_input(kind, i, thoughts, acts));
        match kind {
            CommKind::GlobalThoughtAdvantage => v
                .gather(1, &acts[i].argmax(-1, true), false)
                .squeeze_dim(-1),
            _ => v.squeeze_dim(-1),
        }
    }

    /// Values of all actions of agent `i` with the actions of the others fixed,
    /// `[batch, n_actions_i]`. Only for action-valued critics.
    fn action_values(&self, i: usize, thoughts: &[Tensor], acts: &[Tensor]) -> Tensor {
        let kind = self.config.kind;
        match kind {
            CommKind::CounterfactualThoughtShare => {
                let n = self.n_actions[i];
                let qs: Vec<Tensor> = (0..n)
                    .map(|b| {
                        let mut acts: Vec<Tensor> = acts.iter().map(|a| a.shallow_clone()).collect();
                        acts[i] = Tensor::full_like(&acts[i].argmax(-1, false), b)
                            .one_hot(n)
                            .to_kind(Kind::Float);
                        self.model
                            .agent(i)
                            .critic(&critic_input(kind, i, thoughts, &acts))
                    })
                    .collect();
                Tensor::cat(&qs, 1)
            }
            _ => self
                .model
                .agent(i)
                .critic(&critic_input(kind, i, thoughts, acts)),
        }
    }

    /// Values of the next state under the target networks, `[batch]` per agent.
    fn target_values(&self, next_obs: &[Tensor]) -> Vec<Tensor> {
        let kind = self.config.kind;
        no_grad(|| {
            let (hidden, logits) = Self::forward(&self.model_tgt, kind, next_obs, &self.hidden);
            let thoughts: Vec<Tensor> = hidden.iter().map(|h| h.hx.shallow_clone()).collect();
            let acts: Vec<Tensor> = logits.iter().map(onehot_from_logits).collect();
            (0..self.model.n_agents())
                .map(|i| match kind {
                    CommKind::GlobalThoughtAdvantage => {
                        let q = self
                            .model_tgt
                            .agent(i)
                            .critic(&critic_input(kind, i, &thoughts, &acts));
                        q.max_dim(-1, false).0
                    }
                    _ => Self::value_at(&self.model_tgt, kind, i, &thoughts, &acts),
                })
                .collect()
        })
    }

    fn update_agents(&mut self, tr: &Transition, cache: StepCache) -> Result<Record> {
        let kind = self.config.kind;
        let n_agents = self.model.n_agents();
        let acts: Vec<Tensor> = (0..n_agents)
            .map(|i| obs_to_tensor(tr.act.agent(i), self.device))
            .collect();
        let next_obs: Vec<Tensor> = (0..n_agents)
            .map(|i| obs_to_tensor(tr.next_obs.agent(i), self.device))
            .collect();
        let v_next = self.target_values(&next_obs);

        let mut record = Record::empty();
        let mut critic_losses = vec![];
        let mut actor_losses = vec![];
        for i in 0..n_agents {
            let not_done = if tr.is_done[i] { 0.0 } else { 1.0 };
            let tgt = (&v_next[i] * (self.config.discount_factor * not_done)
                + tr.reward[i] as f64)
                .detach();
            let pred = Self::value_at(&self.model, kind, i, &cache.thoughts, &acts);
            let critic_loss = self.config.critic_loss.loss(&pred, &tgt);

            let logits = &cache.logits[i];
            let act_ix = acts[i].argmax(-1, true);
            let advantage = no_grad(|| match kind.action_valued() {
                true => {
                    let q = self.action_values(i, &cache.thoughts, &acts);
                    let pi = logits.softmax(-1, Kind::Float);
                    let baseline = (&pi * &q).sum_dim_intlist([-1i64].as_slice(), false, Kind::Float);
                    q.gather(1, &act_ix, false).squeeze_dim(-1) - baseline
                }
                false => &tgt - &pred,
            })
            .detach();
            let log_prob = logits
                .log_softmax(-1, Kind::Float)
                .gather(1, &act_ix, false)
                .squeeze_dim(-1);
            let actor_loss = -(log_prob * advantage).mean(Kind::Float);

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
        debug!("{} update {}: loss {}", kind.name(), self.n_updates, loss);
        record.insert(
            "overall/critic_loss",
            RecordValue::Scalar(to_f32(&critic_loss)),
        );
        record.insert("overall/actor_loss", RecordValue::Scalar(to_f32(&actor_loss)));
        record.insert("overall/loss", RecordValue::Scalar(loss));

        Ok(record)
    }
}

impl Algorithm for Comm {
    fn n_agents(&self) -> usize {
        self.model.n_agents()
    }

    fn reset_episode(&mut self) -> Result<()> {
        self.init_hidden();
        trace!("Reset hidden states");
        Ok(())
    }

    fn select_action(&mut self, obs: &JointObs, explore: bool) -> Result<JointAct> {
        obs.check_dims(&self.obs_dims)?;
        let kind = self.config.kind;
        let learn = self.train && explore;
        let obs: Vec<Tensor> = (0..obs.n_agents())
            .map(|i| obs_to_tensor(obs.agent(i), self.device))
            .collect();
        let prev: Vec<Hidden> = self.hidden.iter().map(|h| h.detach()).collect();

        let (hidden, logits) = match learn {
            true => Self::forward(&self.model, kind, &obs, &prev),
            false => no_grad(|| Self::forward(&self.model, kind, &obs, &prev)),
        };
        let acts: Vec<Tensor> = no_grad(|| {
            self.config
                .action_selector
                .select_joint(&logits, &self.action_spaces, explore)
        });

        self.cache = match learn {
            true => Some(StepCache {
                thoughts: hidden.iter().map(|h| h.hx.shallow_clone()).collect(),
                logits,
            }),
            false => None,
        };
        self.hidden = hidden;
        to_joint_act(&acts)
    }

    fn update(
        &mut self,
        transition: &Transition,
        store: &mut TransitionStore,
    ) -> Result<Option<Record>> {
        let cache = self.cache.take();
        let record = match cache {
            Some(cache) if store.len() >= self.config.min_transitions_warmup => {
                Some(self.update_agents(transition, cache)?)
            }
            _ => None,
        };
        self.hidden_detach();
        Ok(record)
    }

    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
        self.cache = None;
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
