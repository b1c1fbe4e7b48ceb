//! Algorithm.
use super::{JointAct, JointObs, Transition};
use crate::{record::Record, replay_buffer::TransitionStore};
use anyhow::Result;
use std::path::Path;

/// A multi-agent learning algorithm.
///
/// The algorithm owns the parameters of all agents (and their target copies
/// if it bootstraps). The [`Trainer`](crate::Trainer) calls
/// [`Algorithm::update`] once per environment step with the transition
/// just taken, after it was pushed to the store.
pub trait Algorithm {
    /// Number of agents.
    fn n_agents(&self) -> usize;

    /// Clears per-episode state such as recurrent hidden states.
    fn reset_episode(&mut self) -> Result<()> {
        Ok(())
    }

    /// Selects the joint action for a joint observation.
    ///
    /// `explore` is `true` in training rollouts and `false` in evaluation.
    fn select_action(&mut self, obs: &JointObs, explore: bool) -> Result<JointAct>;

    /// Performs a parameter-update step.
    ///
    /// Returns `Ok(None)` when no update was done, e.g., while the store holds
    /// fewer transitions than the batch size.
    fn update(
        &mut self,
        transition: &Transition,
        store: &mut TransitionStore,
    ) -> Result<Option<Record>>;

    /// Set the algorithm to training mode.
    fn train(&mut self);

    /// Set the algorithm to evaluation mode.
    fn eval(&mut self);

    /// Return if it is in training mode.
    fn is_train(&self) -> bool;

    /// The number of parameter updates done so far.
    fn n_updates(&self) -> usize;

    /// Overwrites the update counter, used when resuming.
    fn set_n_updates(&mut self, n: usize);

    /// Save the parameters of the agents in the given directory.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Load the parameters of the agents from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
