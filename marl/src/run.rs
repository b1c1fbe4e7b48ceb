//! Wiring of an environment, an algorithm and a trainer.
use crate::{config::RunConfig, env::SwitchEnv, variant::Variant};
use anyhow::Result;
use log::info;
use marl_core::{
    checkpoint::{prepare_run_dir, run_dir},
    record::{AggregateRecorder, NullRecorder},
    Algorithm, Env, Trainer,
};
use marl_tch_agent::{
    comm::Comm,
    consensus::ConsensusDqn,
    dqn::{Idqn, Vdn},
    maddpg::Maddpg,
};
use marl_tensorboard::TensorboardRecorder;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, Arc},
};

/// Options of a run other than hyperparameters.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Training algorithm.
    pub variant: Variant,

    /// Name of the environment.
    pub env_name: String,

    /// Root directory of results.
    pub result_dir: PathBuf,

    /// Index of the run.
    pub run_i: usize,

    /// Suffix of the run directory.
    pub log_suffix: String,

    /// Trains the agents.
    pub train: bool,

    /// Evaluates the agents saved in the run directory.
    pub test: bool,

    /// Overwrites a non-empty run directory.
    pub force: bool,

    /// Renders the environment in evaluation.
    pub render: bool,

    /// Random seed.
    pub seed: i64,

    /// Stops the run when set, e.g., by a signal handler.
    pub interrupt: Arc<AtomicBool>,
}

impl RunOptions {
    /// Directory where parameters and logs of the run are saved.
    pub fn run_dir(&self) -> PathBuf {
        run_dir(
            &self.result_dir,
            &self.env_name,
            self.variant.name(),
            self.run_i,
            &self.log_suffix,
        )
    }
}

/// Summary of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Sum of the rewards of all agents in each training episode.
    pub train_rewards: Vec<f32>,

    /// Rewards of each agent in each evaluation episode.
    pub test_rewards: Vec<Vec<f32>>,
}

/// Trains and/or evaluates the selected algorithm.
///
/// The seed is applied to tch, the transition store, the explorers and the
/// environment. The run directory is prepared only after the algorithm is
/// built, so a failing build leaves a previous run intact.
pub fn run(opts: &RunOptions, config: RunConfig) -> Result<RunSummary> {
    let path = opts.run_dir();
    tch::manual_seed(opts.seed);
    let config = config.seed(opts.seed as u64);

    let env = SwitchEnv::build(&config.env, opts.seed)?;
    let obs_dims = env.obs_dims();
    let spaces = env.action_spaces();
    info!(
        "{} on {} with {} agents in {:?}",
        opts.variant.name(),
        opts.env_name,
        env.n_agents(),
        path
    );

    match opts.variant {
        Variant::Maddpg => {
            let algo = Maddpg::build(config.maddpg.clone(), &obs_dims, &spaces)?;
            run_algo(opts, &config, &path, env, algo)
        }
        Variant::Vdn => {
            let algo = Vdn::build(config.dqn.clone(), &obs_dims, &spaces)?;
            run_algo(opts, &config, &path, env, algo)
        }
        Variant::Idqn => {
            let algo = Idqn::build(config.dqn.clone(), &obs_dims, &spaces)?;
            run_algo(opts, &config, &path, env, algo)
        }
        Variant::DqnConsensus | Variant::DqnShareNoconsensus => {
            let consensus = opts.variant == Variant::DqnConsensus;
            let algo_config = config.consensus.clone().consensus(consensus);
            let algo = ConsensusDqn::build(algo_config, &obs_dims, &spaces)?;
            run_algo(opts, &config, &path, env, algo)
        }
        Variant::Sic | Variant::Acc | Variant::Achac | Variant::Siha | Variant::Sihca => {
            let mut algo_config = config.comm.clone();
            if let Some(kind) = opts.variant.comm_kind() {
                algo_config = algo_config.kind(kind);
            }
            let algo = Comm::build(algo_config, &obs_dims, &spaces)?;
            run_algo(opts, &config, &path, env, algo)
        }
    }
}

fn create_recorder(opts: &RunOptions, path: &Path) -> Box<dyn AggregateRecorder> {
    match opts.train {
        true => Box::new(TensorboardRecorder::new(path)),
        false => Box::new(NullRecorder::new()),
    }
}

fn run_algo<A: Algorithm>(
    opts: &RunOptions,
    config: &RunConfig,
    path: &Path,
    env: SwitchEnv,
    algo: A,
) -> Result<RunSummary> {
    match opts.train {
        true => prepare_run_dir(path, opts.force)?,
        false => fs::create_dir_all(path)?,
    }
    if opts.train {
        config.save(path.join("config.yaml"))?;
    }

    let trainer_config = config.trainer.clone().model_dir(path.to_string_lossy());
    let recorder = create_recorder(opts, path);
    let mut trainer = Trainer::build(trainer_config, env, algo, &config.store, recorder)?;
    trainer.set_interrupt_flag(Arc::clone(&opts.interrupt));

    trainer.run_guarded(|trainer| {
        let mut summary = RunSummary::default();
        if opts.train {
            let stats = trainer.train(config.trainer.train_episodes, config.trainer.test_interval)?;
            summary.train_rewards = stats.iter().map(|s| s.rewards.iter().sum::<f32>()).collect();
        }
        if opts.test {
            trainer.restore()?;
            summary.test_rewards = trainer.test(config.trainer.test_episodes, opts.render)?;
            info!("Test rewards: {:?}", summary.test_rewards);
        }
        Ok(summary)
    })
}
