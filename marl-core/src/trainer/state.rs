use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Counters saved together with the parameters, so that training can resume.
#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerState {
    /// Number of parameter updates.
    pub n_updates: usize,

    /// Number of finished training episodes.
    pub episodes: usize,
}

impl TrainerState {
    /// File name of the state in a checkpoint directory.
    pub const FILE_NAME: &'static str = "trainer_state.yaml";

    /// Loads the state from a checkpoint directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(dir.as_ref().join(Self::FILE_NAME))?;
        Ok(serde_yaml::from_reader(BufReader::new(file))?)
    }

    /// Saves the state in a checkpoint directory.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(dir.as_ref().join(Self::FILE_NAME))?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
