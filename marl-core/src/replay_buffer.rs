//! Experience replay of joint transitions.
mod base;
mod config;
pub use base::TransitionStore;
pub use config::TransitionStoreConfig;
