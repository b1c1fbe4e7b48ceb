//! Ring buffer of transitions.
use super::TransitionStoreConfig;
use crate::{error::MarlError, Transition};
use rand::{rngs::StdRng, seq::index, SeedableRng};

/// A fixed-capacity store of [`Transition`]s.
///
/// Once full, a push overwrites the oldest transition.
pub struct TransitionStore {
    capacity: usize,

    /// Index at which the next transition is written.
    i: usize,

    data: Vec<Transition>,

    rng: StdRng,
}

impl TransitionStore {
    /// Builds a store from the configuration.
    pub fn build(config: &TransitionStoreConfig) -> Self {
        Self::new(config.capacity, config.seed)
    }

    /// Creates an empty store with the given capacity.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, seed: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            i: 0,
            data: Vec::with_capacity(capacity.min(1 << 16)),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Pushes a transition.
    pub fn push(&mut self, tr: Transition) {
        if self.data.len() < self.capacity {
            self.data.push(tr);
        } else {
            self.data[self.i] = tr;
        }
        self.i = (self.i + 1) % self.capacity;
    }

    /// Samples `k` distinct transitions uniformly at random.
    ///
    /// Fails with [`MarlError::InsufficientData`] if fewer than `k`
    /// transitions are stored.
    pub fn sample(&mut self, k: usize) -> Result<Vec<&Transition>, MarlError> {
        if self.data.len() < k {
            return Err(MarlError::InsufficientData {
                requested: k,
                available: self.data.len(),
            });
        }
        let ixs = index::sample(&mut self.rng, self.data.len(), k);
        Ok(ixs.into_iter().map(|ix| &self.data[ix]).collect())
    }

    /// Number of stored transitions.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Maximum number of stored transitions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if no transition is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Removes every transition.
    pub fn clear(&mut self) {
        self.data.clear();
        self.i = 0;
    }

    /// Iterates over the stored transitions from the oldest to the newest.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        let (newer, older) = if self.data.len() < self.capacity {
            (&self.data[..], &self.data[..0])
        } else {
            self.data.split_at(self.i)
        };
        older.iter().chain(newer.iter())
    }
}
