use anyhow::Result;
use clap::Parser;
use log::warn;
use marl::{run, RunConfig, RunOptions, SwitchEnvConfig, Variant};
use marl_core::error::MarlError;
use marl_tch_agent::Device;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Multi-agent reinforcement learning
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Name of the environment
    #[arg(long, default_value = "Switch2-v0")]
    env: String,

    /// Directory to store results
    #[arg(long, default_value = "results")]
    result_dir: PathBuf,

    /// Do not use CUDA
    #[arg(long, default_value_t = false)]
    no_cuda: bool,

    /// Training algorithm
    #[arg(long, value_enum)]
    algo: Variant,

    /// Train the agents
    #[arg(long, default_value_t = false)]
    train: bool,

    /// Evaluate the agents saved in the run directory
    #[arg(long, default_value_t = false)]
    test: bool,

    /// Learning rate [default: 0.001]
    #[arg(long)]
    lr: Option<f64>,

    /// Discount factor [default: 0.95]
    #[arg(long)]
    discount: Option<f64>,

    /// Number of training episodes [default: 2000]
    #[arg(long)]
    train_episodes: Option<usize>,

    /// Number of evaluation episodes [default: 10]
    #[arg(long)]
    test_episodes: Option<usize>,

    /// Batch size [default: 128]
    #[arg(long)]
    batch_size: Option<usize>,

    /// Capacity of the transition store [default: 10000, 50000 for maddpg]
    #[arg(long)]
    mem_len: Option<usize>,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    seed: i64,

    /// Number of training episodes between evaluations [default: 50]
    #[arg(long)]
    test_interval: Option<usize>,

    /// Index of the run
    #[arg(long, default_value_t = 1)]
    run_i: usize,

    /// Suffix of the run directory
    #[arg(long, default_value = "")]
    log_suffix: String,

    /// Overwrite a non-empty run directory
    #[arg(long, default_value_t = false)]
    force: bool,

    /// YAML file of the run configuration. Flags given explicitly override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn run_config(args: &Args) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => {
            let mut config = RunConfig {
                env: SwitchEnvConfig::from_name(&args.env)?,
                ..Default::default()
            };
            config.store = config.store.capacity(args.algo.default_capacity());
            config
        }
    };

    if let Some(v) = args.lr {
        config = config.learning_rate(v);
    }
    if let Some(v) = args.discount {
        config = config.discount_factor(v);
    }
    if let Some(v) = args.batch_size {
        config = config.batch_size(v);
    }
    if let Some(v) = args.mem_len {
        config.store = config.store.capacity(v);
    }
    if let Some(v) = args.train_episodes {
        config.trainer = config.trainer.train_episodes(v);
    }
    if let Some(v) = args.test_episodes {
        config.trainer = config.trainer.test_episodes(v);
    }
    if let Some(v) = args.test_interval {
        config.trainer = config.trainer.test_interval(v);
    }
    if args.no_cuda {
        config = config.device(Device::Cpu);
    }
    Ok(config)
}

/// Sets the returned flag on Ctrl-C, so that the trainer is closed before exit.
///
/// A second Ctrl-C exits immediately.
fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::Relaxed) {
            std::process::exit(130);
        }
    })?;
    Ok(flag)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = run_config(&args)?;
    let opts = RunOptions {
        variant: args.algo,
        env_name: args.env.clone(),
        result_dir: args.result_dir.clone(),
        run_i: args.run_i,
        log_suffix: args.log_suffix.clone(),
        train: args.train,
        test: args.test,
        force: args.force,
        render: true,
        seed: args.seed,
        interrupt: interrupt_flag()?,
    };
    match run(&opts, config) {
        Ok(_) => Ok(()),
        Err(e) if matches!(e.downcast_ref::<MarlError>(), Some(MarlError::Interrupted)) => {
            warn!("Stopped by Ctrl-C, results are in {:?}", opts.run_dir());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marl_core::replay_buffer::TransitionStoreConfig;

    #[test]
    fn test_args() -> Result<()> {
        let args = Args::try_parse_from([
            "marl",
            "--algo",
            "dqn_share_noconsensus",
            "--train",
            "--lr",
            "0.01",
            "--no-cuda",
        ])?;
        assert_eq!(args.algo, Variant::DqnShareNoconsensus);
        assert!(args.train && !args.test);

        let config = run_config(&args)?;
        assert_eq!(config.consensus.device, Device::Cpu);
        assert_eq!(config.store, TransitionStoreConfig::default().capacity(10000));
        assert_eq!(config.trainer.train_episodes, 2000);
        Ok(())
    }

    #[test]
    fn test_maddpg_capacity() -> Result<()> {
        let args = Args::try_parse_from(["marl", "--algo", "maddpg", "--test"])?;
        let store = TransitionStoreConfig::default();
        assert_eq!(run_config(&args)?.store, store.clone().capacity(50000));

        let args = Args::try_parse_from(["marl", "--algo", "maddpg", "--mem-len", "100"])?;
        assert_eq!(run_config(&args)?.store, store.capacity(100));
        Ok(())
    }

    #[test]
    fn test_unknown_algo() {
        assert!(Args::try_parse_from(["marl", "--algo", "qmix"]).is_err());
    }
}
