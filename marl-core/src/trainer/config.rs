//! Configuration of [`Trainer`](super::Trainer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`](super::Trainer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// Number of training episodes.
    pub train_episodes: usize,

    /// Number of training episodes between evaluations.
    pub test_interval: usize,

    /// Number of episodes in each evaluation.
    pub test_episodes: usize,

    /// Upper bound of the number of steps in an episode.
    pub episode_max_steps: usize,

    /// Directory where parameters are saved. Nothing is saved if `None`.
    pub model_dir: Option<String>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            train_episodes: 2000,
            test_interval: 50,
            test_episodes: 10,
            episode_max_steps: 5000,
            model_dir: None,
        }
    }
}

impl TrainerConfig {
    /// Sets the number of training episodes.
    pub fn train_episodes(mut self, v: usize) -> Self {
        self.train_episodes = v;
        self
    }

    /// Sets the number of training episodes between evaluations.
    pub fn test_interval(mut self, v: usize) -> Self {
        self.test_interval = v;
        self
    }

    /// Sets the number of episodes in each evaluation.
    pub fn test_episodes(mut self, v: usize) -> Self {
        self.test_episodes = v;
        self
    }

    /// Sets the upper bound of the number of steps in an episode.
    pub fn episode_max_steps(mut self, v: usize) -> Self {
        self.episode_max_steps = v;
        self
    }

    /// Sets the directory where parameters are saved.
    pub fn model_dir(mut self, v: impl Into<String>) -> Self {
        self.model_dir = Some(v.into());
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_trainer_config() -> Result<()> {
        let config = TrainerConfig::default()
            .train_episodes(100)
            .test_interval(10)
            .episode_max_steps(200)
            .model_dir("some/directory");

        let dir = TempDir::new("trainer_config")?;
        let path = dir.path().join("trainer_config.yaml");
        config.save(&path)?;
        let config_ = TrainerConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
