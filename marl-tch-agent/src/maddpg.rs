//! Multi-agent deep deterministic policy gradient.
mod base;
mod config;
mod model;
pub use base::Maddpg;
pub use config::MaddpgConfig;
pub use model::{Critic, MaddpgNet, MaddpgNetConfig};
