//! Independent and value-decomposition Q-learning.
mod base;
mod config;
mod explorer;
mod model;
pub use base::{Dqn, Idqn, Independent, Mixer, ValueDecomposition, Vdn};
pub use config::DqnConfig;
pub(crate) use explorer::seeded;
pub use explorer::{DqnExplorer, EpsilonGreedy, Softmax};
pub use model::QNet;
