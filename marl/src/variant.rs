//! Training algorithms selectable from the command line.
use clap::ValueEnum;
use marl_tch_agent::comm::CommKind;
use serde::{Deserialize, Serialize};

/// Training algorithm.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Variant {
    /// Centralized critics with decentralized actors.
    Maddpg,

    /// Value decomposition networks.
    Vdn,

    /// Independent Q-learning.
    Idqn,

    /// Thought sharing with a counterfactual critic on all actions.
    Sic,

    /// Thought sharing with a state-value critic.
    Acc,

    /// Sharing both thoughts and actions.
    Achac,

    /// Global thought.
    Siha,

    /// Global thought with an advantage-decomposed critic.
    Sihca,

    /// Q-learning with a baseline on the consensus thought.
    DqnConsensus,

    /// Q-learning with a baseline on the thought of each agent.
    DqnShareNoconsensus,
}

impl Variant {
    /// Name of the algorithm in the run directory.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Maddpg => "MADDPG",
            Self::Vdn => "VDN",
            Self::Idqn => "IDQN",
            Self::Sic => "SIC",
            Self::Acc => "ACC",
            Self::Achac => "ACHAC",
            Self::Siha => "SIHA",
            Self::Sihca => "SIHCA",
            Self::DqnConsensus => "DQN_CONSENSUS",
            Self::DqnShareNoconsensus => "DQN_SHARE_NOCONSENSUS",
        }
    }

    /// The kind of a communicating variant.
    pub fn comm_kind(&self) -> Option<CommKind> {
        match self {
            Self::Sic => Some(CommKind::CounterfactualThoughtShare),
            Self::Acc => Some(CommKind::ThoughtShare),
            Self::Achac => Some(CommKind::HybridShare),
            Self::Siha => Some(CommKind::GlobalThought),
            Self::Sihca => Some(CommKind::GlobalThoughtAdvantage),
            _ => None,
        }
    }

    /// Default capacity of the transition store.
    pub fn default_capacity(&self) -> usize {
        match self {
            Self::Maddpg => 50000,
            _ => 10000,
        }
    }
}
