//! Recurrent agents exchanging thoughts.
mod base;
mod config;
mod model;
pub use base::Comm;
pub use config::{CommConfig, CommKind};
pub use model::{CommNet, CommNetConfig};
