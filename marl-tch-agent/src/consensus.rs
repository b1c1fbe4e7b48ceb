//! Q-learning with a baseline shared through a consensus thought.
mod base;
mod config;
mod model;
pub use base::ConsensusDqn;
pub use config::ConsensusConfig;
pub use model::{ConsensusNet, ConsensusNetConfig};
