//! Exploration strategies of DQN agents.
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// Explorers for DQN agents.
///
/// An algorithm keeps one explorer per agent, so the schedule of
/// [`EpsilonGreedy`] advances per agent.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum DqnExplorer {
    /// Softmax action selection.
    Softmax(Softmax),

    /// Epsilon-greedy action selection.
    EpsilonGreedy(EpsilonGreedy),
}

impl Default for DqnExplorer {
    fn default() -> Self {
        Self::Softmax(Softmax::new())
    }
}

impl DqnExplorer {
    /// Seeds the random number generator of the explorer.
    ///
    /// [`Softmax`] samples with the generator of tch, seeded by [`tch::manual_seed`].
    pub fn seed(&mut self, seed: u64) {
        if let Self::EpsilonGreedy(egreedy) = self {
            egreedy.rng.seed(seed);
        }
    }

    /// Takes an action index given the action values `[1, n_actions]` of an agent.
    pub fn action(&mut self, q: &Tensor) -> i64 {
        match self {
            Self::Softmax(softmax) => softmax.action(q),
            Self::EpsilonGreedy(egreedy) => egreedy.action(q),
        }
    }
}

/// Clones `explorer` for `n` agents, seeding agent `i` with `seed + i`.
pub(crate) fn seeded(explorer: &DqnExplorer, n: usize, seed: u64) -> Vec<DqnExplorer> {
    (0..n)
        .map(|i| {
            let mut explorer = explorer.clone();
            explorer.seed(seed.wrapping_add(i as u64));
            explorer
        })
        .collect()
}

/// Softmax explorer for DQN.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Softmax {}

#[allow(clippy::new_without_default)]
impl Softmax {
    /// Constructs softmax explorer.
    pub fn new() -> Self {
        Self {}
    }

    /// Samples an action from the softmax of the action values.
    pub fn action(&mut self, q: &Tensor) -> i64 {
        q.softmax(-1, Kind::Float)
            .multinomial(1, true)
            .flatten(0, -1)
            .int64_value(&[0])
    }
}

/// Epsilon-greedy explorer for DQN.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EpsilonGreedy {
    /// Number of actions taken so far.
    pub n_opts: usize,

    /// Epsilon at the start.
    pub eps_start: f64,

    /// Epsilon after `final_step` actions.
    pub eps_final: f64,

    /// Number of actions over which epsilon decays linearly.
    pub final_step: usize,

    #[serde(skip)]
    rng: fastrand::Rng,
}

impl PartialEq for EpsilonGreedy {
    fn eq(&self, other: &Self) -> bool {
        self.n_opts == other.n_opts
            && self.eps_start == other.eps_start
            && self.eps_final == other.eps_final
            && self.final_step == other.final_step
    }
}

#[allow(clippy::new_without_default)]
impl EpsilonGreedy {
    /// Constructs epsilon-greedy explorer.
    pub fn new() -> Self {
        Self {
            n_opts: 0,
            eps_start: 1.0,
            eps_final: 0.02,
            final_step: 100_000,
            rng: fastrand::Rng::new(),
        }
    }

    /// Constructs epsilon-greedy explorer with the given decay period.
    pub fn with_final_step(final_step: usize) -> DqnExplorer {
        DqnExplorer::EpsilonGreedy(Self {
            final_step,
            ..Self::new()
        })
    }

    /// Current epsilon.
    pub fn eps(&self) -> f64 {
        let d = (self.eps_start - self.eps_final) / (self.final_step.max(1) as f64);
        (self.eps_start - d * self.n_opts as f64).max(self.eps_final)
    }

    /// Takes a random action with probability epsilon, the greedy action otherwise.
    pub fn action(&mut self, q: &Tensor) -> i64 {
        let is_random = self.rng.f64() < self.eps();
        self.n_opts += 1;

        if is_random {
            let n_actions = q.size().last().copied().unwrap_or(1);
            self.rng.i64(..n_actions)
        } else {
            q.argmax(-1, false).flatten(0, -1).int64_value(&[0])
        }
    }

    /// Set the epsilon value at the final step.
    pub fn eps_final(mut self, v: f64) -> Self {
        self.eps_final = v;
        self
    }

    /// Set the epsilon value at the start.
    pub fn eps_start(mut self, v: f64) -> Self {
        self.eps_start = v;
        self
    }
}
