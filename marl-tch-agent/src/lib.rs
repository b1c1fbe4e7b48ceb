//! Multi-agent RL algorithms implemented with [tch](https://crates.io/crates/tch).
//!
//! Every algorithm implements [`marl_core::Algorithm`] and owns a
//! [`MultiAgentModel`](model::MultiAgentModel) holding the parameters of
//! all agents, plus a target copy when it bootstraps.
//!
//! * [`dqn::Idqn`] and [`dqn::Vdn`]: independent and value-decomposition Q-learning.
//! * [`maddpg::Maddpg`]: centralized critics with decentralized actors.
//! * [`comm::Comm`]: recurrent agents exchanging thought vectors.
//! * [`consensus::ConsensusDqn`]: Q-learning on a consensus thought.
pub mod action;
pub mod comm;
pub mod consensus;
pub mod dqn;
pub mod lstm;
pub mod maddpg;
pub mod mlp;
pub mod model;
pub mod opt;
mod tensor_batch;
pub mod util;
use marl_core::error::MarlError;
use serde::{Deserialize, Serialize};
pub use tensor_batch::JointBatch;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq, Eq)]
/// Device for using tch.
///
/// This enum is added because [`tch::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The CUDA device of the given index.
    Cuda(usize),

    /// The first CUDA device if available, CPU otherwise.
    CudaIfAvailable,
}

impl Default for Device {
    fn default() -> Self {
        Self::CudaIfAvailable
    }
}

impl Device {
    /// Resolves into [`tch::Device`].
    ///
    /// Fails with [`MarlError::DeviceUnavailable`] if the requested CUDA
    /// device is not present.
    pub fn resolve(&self) -> Result<tch::Device, MarlError> {
        match self {
            Self::Cpu => Ok(tch::Device::Cpu),
            Self::CudaIfAvailable => Ok(tch::Device::cuda_if_available()),
            Self::Cuda(n) => {
                let count = tch::Cuda::device_count() as usize;
                if *n < count {
                    Ok(tch::Device::Cuda(*n))
                } else {
                    Err(MarlError::DeviceUnavailable(format!(
                        "cuda:{} requested, {} device(s) present",
                        n, count
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_device() {
        assert_eq!(Device::Cpu.resolve().unwrap(), tch::Device::Cpu);
        if !tch::Cuda::is_available() {
            assert!(matches!(
                Device::Cuda(0).resolve(),
                Err(MarlError::DeviceUnavailable(_))
            ));
        }
        assert!(matches!(
            Device::Cuda(usize::MAX).resolve(),
            Err(MarlError::DeviceUnavailable(_))
        ));
    }
}
