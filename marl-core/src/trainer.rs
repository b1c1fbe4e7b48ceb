//! Train and evaluate an [`Algorithm`].
mod config;
mod state;
use crate::{
    error::MarlError,
    record::{AggregateRecorder, Record, RecordValue::Scalar},
    replay_buffer::{TransitionStore, TransitionStoreConfig},
    Algorithm, Env, Transition,
};
use anyhow::Result;
pub use config::TrainerConfig;
use log::{debug, info, trace, warn};
pub use state::TrainerState;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Lifecycle phase of a [`Trainer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Built, no episode run yet.
    Constructed,

    /// Running training episodes.
    Training,

    /// Running evaluation episodes.
    Evaluating,

    /// Resources released. No further operation is allowed.
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Statistics of a training episode.
#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeStats {
    /// Sum of rewards of each agent.
    pub rewards: Vec<f32>,

    /// Number of environment steps.
    pub steps: usize,

    /// Sum of `overall/loss` over the updates in the episode.
    pub loss: f32,

    /// Number of updates done in the episode.
    pub n_updates: usize,
}

/// Manages the train/test/checkpoint lifecycle of an [`Algorithm`].
///
/// # Training loop
///
/// [`Trainer::train()`] runs `train_episodes` episodes in chunks of
/// `test_interval` episodes. In each training episode:
///
/// 1. Reset [`Env`] and per-episode state of the algorithm.
/// 2. Select exploring actions for all agents from the joint observation.
/// 3. Step [`Env`], form a [`Transition`] and push it to the [`TransitionStore`].
/// 4. Call [`Algorithm::update`] with the transition. The algorithm may skip
///    the update, e.g., while the store holds fewer transitions than a batch.
/// 5. Back to 2 until every agent is done or the number of steps reaches
///    `episode_max_steps`.
///
/// After every chunk, the algorithm is evaluated on `test_episodes`
/// episodes, records are flushed and the parameters are saved in
/// `model_dir`. Parameters with the best evaluation reward are also saved
/// in `(model_dir)/best`.
///
/// # Phases
///
/// ```mermaid
/// stateDiagram-v2
///     [*] --> Constructed
///     Constructed --> Training: train
///     Constructed --> Evaluating: test
///     Training --> Evaluating: test
///     Evaluating --> Training: train
///     Training --> Closed: close
///     Evaluating --> Closed: close
///     Constructed --> Closed: close
/// ```
///
/// [`Trainer::close()`] is called on drop if it has not been called. Use
/// [`Trainer::run_guarded()`] to get errors of closing as well.
///
/// # Interruption
///
/// The trainer checks its interrupt flag before every environment step and
/// fails with [`MarlError::Interrupted`] once it is set, e.g., from a
/// signal handler. Inside [`Trainer::run_guarded()`] the trainer is then
/// closed before the error is returned.
#[cfg_attr(doc, aquamarine::aquamarine)]
pub struct Trainer<E, A>
where
    E: Env,
    A: Algorithm,
{
    config: TrainerConfig,
    env: E,
    algo: A,
    store: TransitionStore,
    recorder: Box<dyn AggregateRecorder>,
    phase: Phase,
    episodes: usize,
    max_eval_reward: f32,
    interrupt: Arc<AtomicBool>,
}

impl<E, A> Trainer<E, A>
where
    E: Env,
    A: Algorithm,
{
    /// Constructs a trainer.
    pub fn build(
        config: TrainerConfig,
        env: E,
        algo: A,
        store_config: &TransitionStoreConfig,
        recorder: Box<dyn AggregateRecorder>,
    ) -> Result<Self> {
        if env.n_agents() != algo.n_agents() {
            return Err(MarlError::AgentCountMismatch {
                expected: algo.n_agents(),
                actual: env.n_agents(),
            }
            .into());
        }
        Ok(Self {
            config,
            env,
            algo,
            store: TransitionStore::build(store_config),
            recorder,
            phase: Phase::Constructed,
            episodes: 0,
            max_eval_reward: f32::MIN,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of finished training episodes.
    pub fn episodes(&self) -> usize {
        self.episodes
    }

    /// Reference to the algorithm.
    pub fn algo(&self) -> &A {
        &self.algo
    }

    /// Mutable reference to the algorithm.
    pub fn algo_mut(&mut self) -> &mut A {
        &mut self.algo
    }

    /// Reference to the environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Reference to the transition store.
    pub fn store(&self) -> &TransitionStore {
        &self.store
    }

    /// The interrupt flag.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Replaces the interrupt flag, e.g., with one shared with a signal handler.
    pub fn set_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = flag;
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.load(Ordering::Relaxed) {
            warn!("Interrupted after {} training episodes", self.episodes);
            return Err(MarlError::Interrupted.into());
        }
        Ok(())
    }

    fn ensure_open(&self, op: &str) -> Result<()> {
        if self.phase == Phase::Closed {
            return Err(MarlError::InvalidPhase {
                op: op.to_string(),
                phase: self.phase.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn enter_training(&mut self) {
        if self.phase != Phase::Training {
            self.phase = Phase::Training;
            self.algo.train();
        }
    }

    /// Runs `episodes` training episodes, evaluating every `test_interval` episodes.
    ///
    /// Returns the statistics of the training episodes.
    pub fn train(&mut self, episodes: usize, test_interval: usize) -> Result<Vec<EpisodeStats>> {
        self.ensure_open("train")?;
        info!("Start training for {} episodes", episodes);
        let test_interval = test_interval.max(1);
        let mut stats = Vec::with_capacity(episodes);

        while stats.len() < episodes {
            let chunk = test_interval.min(episodes - stats.len());
            let mut chunk_loss = 0f32;
            for _ in 0..chunk {
                let s = self.train_episode()?;
                chunk_loss += s.loss;
                stats.push(s);
            }

            let rewards = self.test(self.config.test_episodes, false)?;
            let eval_reward = mean_overall_reward(&rewards);
            self.recorder.store(eval_record(&rewards));
            self.recorder.flush(self.algo.n_updates() as _);
            info!(
                "Episode {}, loss: {}, eval reward: {}",
                self.episodes, chunk_loss, eval_reward
            );

            if let Some(model_dir) = self.config.model_dir.clone() {
                self.save_to(&model_dir)?;
                if eval_reward > self.max_eval_reward {
                    self.max_eval_reward = eval_reward;
                    self.save_to(Path::new(&model_dir).join("best"))?;
                }
            }
        }

        Ok(stats)
    }

    /// Runs a training episode.
    pub fn train_episode(&mut self) -> Result<EpisodeStats> {
        self.ensure_open("train_episode")?;
        self.enter_training();

        let n = self.algo.n_agents();
        let mut obs = self.env.reset()?;
        self.algo.reset_episode()?;
        let mut stats = EpisodeStats {
            rewards: vec![0f32; n],
            steps: 0,
            loss: 0f32,
            n_updates: 0,
        };

        loop {
            self.check_interrupt()?;
            let act = self.algo.select_action(&obs, true)?;
            let (step, env_record) = self.env.step(&act)?;
            stats.steps += 1;

            let tr = Transition::new(
                obs,
                act,
                step.obs.clone(),
                step.reward.clone(),
                step.is_done.clone(),
            )?;
            self.store.push(tr.clone());

            if let Some(record) = self.algo.update(&tr, &mut self.store)? {
                if let Ok(loss) = record.get_scalar("overall/loss") {
                    debug!("Update {}: loss {}", self.algo.n_updates(), loss);
                    stats.loss += loss;
                }
                stats.n_updates += 1;
                self.recorder.store(record);
            }
            if !env_record.is_empty() {
                self.recorder.store(env_record);
            }

            for (acc, r) in stats.rewards.iter_mut().zip(step.reward.iter()) {
                *acc += r;
            }

            if step.all_done() || stats.steps >= self.config.episode_max_steps {
                break;
            }
            obs = step.obs;
        }

        self.episodes += 1;
        self.recorder.store(reward_record("train_reward", &stats.rewards));
        Ok(stats)
    }

    /// Runs evaluation episodes without exploration and learning.
    ///
    /// Returns the sum of rewards of each agent for each episode.
    pub fn test(&mut self, episodes: usize, render: bool) -> Result<Vec<Vec<f32>>> {
        self.ensure_open("test")?;
        let prev = self.phase;
        self.phase = Phase::Evaluating;
        self.algo.eval();

        let n = self.algo.n_agents();
        let mut rewards = Vec::with_capacity(episodes);
        for _ in 0..episodes {
            let mut obs = self.env.reset()?;
            self.algo.reset_episode()?;
            let mut episode_reward = vec![0f32; n];
            let mut steps = 0;
            loop {
                self.check_interrupt()?;
                if render {
                    self.env.render()?;
                }
                let act = self.algo.select_action(&obs, false)?;
                let (step, _) = self.env.step(&act)?;
                steps += 1;
                for (acc, r) in episode_reward.iter_mut().zip(step.reward.iter()) {
                    *acc += r;
                }
                if step.all_done() || steps >= self.config.episode_max_steps {
                    break;
                }
                obs = step.obs;
            }
            rewards.push(episode_reward);
        }

        if prev == Phase::Training {
            self.enter_training();
        }
        Ok(rewards)
    }

    /// Saves the parameters and counters in `model_dir`.
    pub fn save(&mut self) -> Result<()> {
        let model_dir = self.model_dir("save")?;
        self.save_to(model_dir)
    }

    /// Restores the parameters and counters from `model_dir`.
    pub fn restore(&mut self) -> Result<()> {
        let model_dir = self.model_dir("restore")?;
        self.restore_from(model_dir)
    }

    fn model_dir(&self, op: &str) -> Result<PathBuf> {
        match &self.config.model_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Err(anyhow::anyhow!("{}: model_dir is not given", op)),
        }
    }

    /// Saves the parameters and counters in the given directory.
    pub fn save_to(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_open("save")?;
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        self.algo.save_params(path)?;
        let state = TrainerState {
            n_updates: self.algo.n_updates(),
            episodes: self.episodes,
        };
        state.save(path)?;
        info!("Saved the model in {:?}", path);
        Ok(())
    }

    /// Restores the parameters and counters from the given directory.
    pub fn restore_from(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_open("restore")?;
        let path = path.as_ref();
        self.algo.load_params(path)?;
        let state = TrainerState::load(path)?;
        self.algo.set_n_updates(state.n_updates);
        self.episodes = state.episodes;
        info!("Restored the model from {:?} ({:?})", path, state);
        Ok(())
    }

    /// Releases the environment and flushes the recorder.
    ///
    /// Calling this method more than once is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.phase == Phase::Closed {
            return Ok(());
        }
        self.phase = Phase::Closed;
        self.recorder.flush(self.algo.n_updates() as _);
        self.env.close()?;
        trace!("Closed the trainer");
        Ok(())
    }

    /// Runs `f` and closes the trainer regardless of its result.
    ///
    /// An error of `f` takes precedence over an error of closing.
    pub fn run_guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let res = f(self);
        let closed = self.close();
        match (res, closed) {
            (Ok(v), Ok(())) => Ok(v),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(e_close)) => {
                warn!("Failed to close the trainer: {}", e_close);
                Err(e)
            }
        }
    }
}

impl<E, A> Drop for Trainer<E, A>
where
    E: Env,
    A: Algorithm,
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close the trainer: {}", e);
        }
    }
}

fn reward_record(name: &str, rewards: &[f32]) -> Record {
    let mut record = Record::empty();
    for (i, r) in rewards.iter().enumerate() {
        record.insert(format!("agent_{}/{}", i, name), Scalar(*r));
    }
    record.insert(format!("overall/{}", name), Scalar(rewards.iter().sum()));
    record
}

fn eval_record(rewards: &[Vec<f32>]) -> Record {
    let n = rewards.first().map(|r| r.len()).unwrap_or(0);
    let mut mean = vec![0f32; n];
    for r in rewards.iter() {
        for (m, v) in mean.iter_mut().zip(r.iter()) {
            *m += v / rewards.len() as f32;
        }
    }
    reward_record("eval_reward", &mean)
}

fn mean_overall_reward(rewards: &[Vec<f32>]) -> f32 {
    if rewards.is_empty() {
        return 0f32;
    }
    rewards.iter().map(|r| r.iter().sum::<f32>()).sum::<f32>() / rewards.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dummy::{StubAlgorithm, StubEnv, StubEnvConfig},
        record::{BufferedRecorder, NullRecorder},
    };
    use std::{cell::RefCell, rc::Rc};
    use tempdir::TempDir;

    fn trainer(
        env_config: StubEnvConfig,
        config: TrainerConfig,
    ) -> Trainer<StubEnv, StubAlgorithm> {
        let env = StubEnv::build(&env_config, 0).unwrap();
        let algo = StubAlgorithm::new(env_config.n_agents, env_config.n_actions, 4);
        let store_config = TransitionStoreConfig::default().capacity(100);
        Trainer::build(config, env, algo, &store_config, Box::new(NullRecorder::new())).unwrap()
    }

    #[test]
    fn test_episode_ends_at_max_steps() {
        let env_config = StubEnvConfig::default().n_agents(3).done_at(None);
        let config = TrainerConfig::default().episode_max_steps(7);
        let mut trainer = trainer(env_config, config);

        let stats = trainer.train_episode().unwrap();
        assert_eq!(stats.steps, 7);
        assert_eq!(trainer.store().len(), 7);
        assert_eq!(stats.rewards, vec![7.0; 3]);
    }

    #[test]
    fn test_episode_ends_when_all_done() {
        // Agent 0 is done at step 3, the others at step 5.
        let env_config = StubEnvConfig::default()
            .n_agents(3)
            .done_at(Some(5))
            .first_agent_done_at(Some(3));
        let config = TrainerConfig::default().episode_max_steps(100);
        let mut trainer = trainer(env_config, config);

        let stats = trainer.train_episode().unwrap();
        assert_eq!(stats.steps, 5);
        let last = trainer.store().iter().last().unwrap();
        assert!(last.all_done());
        let first_done = trainer
            .store()
            .iter()
            .position(|tr| tr.is_done[0])
            .unwrap();
        assert_eq!(first_done, 2);
    }

    #[test]
    fn test_update_skipped_while_store_underfull() {
        let env_config = StubEnvConfig::default().n_agents(2).done_at(None);
        let config = TrainerConfig::default().episode_max_steps(6);
        let mut trainer = trainer(env_config, config);

        // Batch size of the stub algorithm is 4
        let stats = trainer.train_episode().unwrap();
        assert_eq!(stats.n_updates, 3);
        assert_eq!(trainer.algo().n_updates(), 3);
    }

    #[test]
    fn test_test_does_not_touch_store() {
        let env_config = StubEnvConfig::default().n_agents(2).done_at(Some(4));
        let mut trainer = trainer(env_config, TrainerConfig::default());

        trainer.train_episode().unwrap();
        let n_updates = trainer.algo().n_updates();
        let len = trainer.store().len();
        let rewards = trainer.test(3, false).unwrap();

        assert_eq!(rewards, vec![vec![4.0, 4.0]; 3]);
        assert_eq!(trainer.store().len(), len);
        assert_eq!(trainer.algo().n_updates(), n_updates);
        assert_eq!(trainer.phase(), Phase::Training);
        assert!(trainer.algo().is_train());
    }

    #[test]
    fn test_train_with_evaluation_and_checkpoints() -> Result<()> {
        let tmp = TempDir::new("trainer")?;
        let model_dir = tmp.path().join("run");
        let env_config = StubEnvConfig::default().n_agents(2).done_at(Some(5));
        let config = TrainerConfig::default()
            .test_episodes(2)
            .model_dir(model_dir.to_string_lossy());

        let env = StubEnv::build(&env_config, 0)?;
        let algo = StubAlgorithm::new(2, 4, 4);
        let recorder = Rc::new(RefCell::new(BufferedRecorder::new()));
        let mut trainer = Trainer::build(
            config,
            env,
            algo,
            &TransitionStoreConfig::default(),
            Box::new(SharedRecorder(recorder.clone())),
        )?;

        let stats = trainer.train(5, 2)?;
        assert_eq!(stats.len(), 5);
        assert_eq!(trainer.episodes(), 5);
        assert!(model_dir.join(TrainerState::FILE_NAME).exists());
        assert!(model_dir.join("best").join(TrainerState::FILE_NAME).exists());

        // Three evaluations for chunks of 2, 2 and 1 episodes
        let n_evals = recorder
            .borrow()
            .iter()
            .filter(|(_, r)| r.get_scalar("overall/eval_reward").is_ok())
            .count();
        assert_eq!(n_evals, 3);
        Ok(())
    }

    #[test]
    fn test_save_restore_counters() -> Result<()> {
        let tmp = TempDir::new("trainer")?;
        let env_config = StubEnvConfig::default().n_agents(2).done_at(Some(10));
        let config = TrainerConfig::default().model_dir(tmp.path().to_string_lossy());
        let mut trainer1 = trainer(env_config.clone(), config.clone());
        trainer1.train_episode()?;
        trainer1.save()?;
        let n_updates = trainer1.algo().n_updates();
        assert!(n_updates > 0);

        let mut trainer2 = trainer(env_config, config);
        trainer2.restore()?;
        assert_eq!(trainer2.algo().n_updates(), n_updates);
        assert_eq!(trainer2.episodes(), 1);
        Ok(())
    }

    #[test]
    fn test_close_on_error_and_invalid_phase() {
        let env_config = StubEnvConfig::default().n_agents(2).done_at(Some(3));
        let mut trainer = trainer(env_config, TrainerConfig::default());

        let res: Result<()> = trainer.run_guarded(|t| {
            t.train_episode()?;
            Err(anyhow::anyhow!("failure in training"))
        });
        assert!(res.is_err());
        assert_eq!(trainer.phase(), Phase::Closed);
        assert!(trainer.env().is_closed());

        let err = trainer.train_episode().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MarlError>(),
            Some(MarlError::InvalidPhase { .. })
        ));
    }

    #[test]
    fn test_interrupt_closes_trainer() {
        let env_config = StubEnvConfig::default().n_agents(2).done_at(Some(3));
        let mut trainer = trainer(env_config, TrainerConfig::default());
        trainer.train_episode().unwrap();

        let flag = Arc::new(AtomicBool::new(false));
        trainer.set_interrupt_flag(Arc::clone(&flag));
        flag.store(true, Ordering::Relaxed);
        let res = trainer.run_guarded(|t| t.train(5, 1));

        assert!(matches!(
            res.unwrap_err().downcast_ref::<MarlError>(),
            Some(MarlError::Interrupted)
        ));
        assert_eq!(trainer.episodes(), 1);
        assert_eq!(trainer.phase(), Phase::Closed);
        assert!(trainer.env().is_closed());
    }

    #[test]
    fn test_interrupt_stops_evaluation() {
        let env_config = StubEnvConfig::default().n_agents(2).done_at(None);
        let mut trainer = trainer(env_config, TrainerConfig::default());
        trainer.interrupt_flag().store(true, Ordering::Relaxed);
        assert!(trainer.test(1, false).is_err());
        assert!(trainer.store().is_empty());
    }

    #[test]
    fn test_agent_count_mismatch() {
        let env = StubEnv::build(&StubEnvConfig::default().n_agents(3), 0).unwrap();
        let algo = StubAlgorithm::new(2, 4, 4);
        let res = Trainer::build(
            TrainerConfig::default(),
            env,
            algo,
            &TransitionStoreConfig::default(),
            Box::new(NullRecorder::new()),
        );
        assert!(res.is_err());
    }

    struct SharedRecorder(Rc<RefCell<BufferedRecorder>>);

    impl AggregateRecorder for SharedRecorder {
        fn store(&mut self, record: Record) {
            self.0.borrow_mut().store(record);
        }

        fn flush(&mut self, step: i64) {
            self.0.borrow_mut().flush(step);
        }
    }
}
