//! Run directories holding checkpoints.
use crate::error::MarlError;
use anyhow::Result;
use log::info;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Returns the run directory `<result_dir>/<env>/<ALGO>/runs/run_<i>_<suffix>`.
pub fn run_dir(
    result_dir: impl AsRef<Path>,
    env_name: &str,
    algo_name: &str,
    run_i: usize,
    suffix: &str,
) -> PathBuf {
    result_dir
        .as_ref()
        .join(env_name)
        .join(algo_name.to_uppercase())
        .join("runs")
        .join(format!("run_{}_{}", run_i, suffix))
}

/// Prepares a run directory for training.
///
/// A non-empty directory is a [`MarlError::CheckpointConflict`] unless
/// `force` is `true`, in which case it is wiped and recreated.
pub fn prepare_run_dir(path: impl AsRef<Path>, force: bool) -> Result<()> {
    let path = path.as_ref();
    if is_non_empty_dir(path)? {
        if !force {
            return Err(MarlError::CheckpointConflict(path.to_path_buf()).into());
        }
        info!("Remove {:?}", path);
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}

fn is_non_empty_dir(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    Ok(fs::read_dir(path)?.next().is_some())
}
