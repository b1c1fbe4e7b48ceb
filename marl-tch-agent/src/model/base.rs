//! Interfaces of neural networks.
use anyhow::Result;
use std::path::Path;
use tch::nn;

/// Base interface of a model owning a [`nn::VarStore`].
pub trait ModelBase {
    /// Returns `var_store` as mutable reference.
    fn get_var_store_mut(&mut self) -> &mut nn::VarStore;

    /// Returns `var_store`.
    fn get_var_store(&self) -> &nn::VarStore;

    /// Save parameters of the neural network.
    fn save<T: AsRef<Path>>(&self, path: T) -> Result<()>;

    /// Load parameters of the neural network.
    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()>;
}

/// A network built on a sub-path of a [`nn::VarStore`] shared with other networks.
///
/// All networks of the agents of an algorithm live in a single
/// [`nn::VarStore`], each under its own path like `agent_0/critic`.
pub trait SubModel {
    /// Configuration from which [`SubModel`] is constructed.
    type Config;

    /// Input of the [`SubModel`].
    type Input;

    /// Output of the [`SubModel`].
    type Output;

    /// Builds [`SubModel`] under the given path.
    fn build(p: &nn::Path, config: Self::Config) -> Self;

    /// A generalized forward function.
    fn forward(&self, input: &Self::Input) -> Self::Output;
}

/// The networks of a single agent.
///
/// [`MultiAgentModel`](super::MultiAgentModel) builds one of them per agent.
pub trait AgentNet: Sized {
    /// Configuration of the networks of an agent.
    type Config: Clone;

    /// Builds the networks under the given path.
    fn build(p: &nn::Path, config: &Self::Config) -> Result<Self>;
}
