//! Records and recorders of training metrics.
//!
//! An algorithm returns a [`Record`] from each update step and the
//! [`Trainer`](crate::Trainer) adds episode and evaluation statistics.
//! Records are handed to an [`AggregateRecorder`], which stores them and
//! writes aggregated values when flushed.
//!
//! ```rust
//! use marl_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("agent_0/critic_loss", 0.25);
//! record.insert("overall/episode_reward", RecordValue::Scalar(-3.0));
//! assert_eq!(record.get_scalar("agent_0/critic_loss").unwrap(), 0.25);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::{AggregateRecorder, Recorder};
pub use storage::RecordStorage;
