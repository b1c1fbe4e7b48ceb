//! Training multiple interacting agents from the command line.
//!
//! The workspace consists of the following crates:
//!
//! * [marl-core](../marl_core/index.html) defines the environment and
//!   algorithm traits, the transition store, records and the [`Trainer`]
//!   driving the train/test/checkpoint lifecycle. It does not depend on a
//!   tensor backend.
//! * [marl-tch-agent](../marl_tch_agent/index.html) implements the
//!   algorithms on [tch](https://crates.io/crates/tch): independent and
//!   value-decomposition Q-learning, MADDPG, recurrent communicating agents
//!   and consensus Q-learning.
//! * [marl-tensorboard](../marl_tensorboard/index.html) writes records as
//!   Tensorboard scalars.
//! * This crate wires them with a [`SwitchEnv`] into the `marl` binary.
//!
//! ```bash
//! marl --env Switch2-v0 --algo vdn --train --test
//! ```
//!
//! Parameters, Tensorboard logs and the configuration of a run are saved in
//! `<result_dir>/<env>/<ALGO>/runs/run_<i>_<suffix>`.
//!
//! [`Trainer`]: marl_core::Trainer
pub mod config;
pub mod env;
pub mod run;
pub mod variant;
pub use config::RunConfig;
pub use env::{SwitchEnv, SwitchEnvConfig};
pub use run::{run, RunOptions, RunSummary};
pub use variant::Variant;
