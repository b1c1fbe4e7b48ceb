#![warn(missing_docs)]
//! Core components for training multiple interacting agents in a shared environment.
//!
//! This crate is independent of any tensor backend. It defines
//!
//! * the multi-agent environment interface ([`Env`]),
//! * the experience replay store ([`TransitionStore`]) of joint [`Transition`]s,
//! * the contract every learning algorithm fulfils ([`Algorithm`]),
//! * the train/test/checkpoint lifecycle driving both ([`Trainer`]),
//! * records and recorders used for logging metrics ([`record`]).
//!
//! Concrete algorithms live in `marl-tch-agent`.
pub mod checkpoint;
pub mod dummy;
pub mod error;
pub mod record;
pub mod replay_buffer;

mod base;
pub use base::{
    ActionSpace, Algorithm, Env, JointAct, JointObs, Step, Transition,
};

mod trainer;
pub use trainer::{EpisodeStats, Phase, Trainer, TrainerConfig, TrainerState};
