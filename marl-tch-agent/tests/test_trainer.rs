use anyhow::Result;
use marl_core::{
    dummy::{StubEnv, StubEnvConfig},
    record::NullRecorder,
    replay_buffer::TransitionStoreConfig,
    ActionSpace, Algorithm, Env, JointObs, Trainer, TrainerConfig,
};
use marl_tch_agent::{
    comm::{Comm, CommConfig, CommKind},
    consensus::{ConsensusConfig, ConsensusDqn},
    dqn::{DqnConfig, Idqn, Vdn},
    maddpg::{Maddpg, MaddpgConfig},
    Device, JointBatch,
};
use tch::{Kind, Tensor};
use tempdir::TempDir;

const N_AGENTS: usize = 3;
const N_ACTIONS: usize = 4;
const OBS_DIM: usize = 4;
const BATCH_SIZE: usize = 8;
const CAPACITY: usize = 100;
const EPISODE_STEPS: usize = 20;

fn env_config() -> StubEnvConfig {
    StubEnvConfig::default()
        .n_agents(N_AGENTS)
        .obs_dim(OBS_DIM)
        .n_actions(N_ACTIONS)
        .reward(1.0)
        .done_at(Some(EPISODE_STEPS))
}

fn trainer<A: Algorithm>(
    algo: A,
    model_dir: Option<&TempDir>,
) -> Result<Trainer<StubEnv, A>> {
    let env = StubEnv::build(&env_config(), 0)?;
    let mut config = TrainerConfig::default()
        .episode_max_steps(50)
        .test_interval(1)
        .test_episodes(1);
    if let Some(dir) = model_dir {
        config = config.model_dir(dir.path().to_string_lossy());
    }
    let store_config = TransitionStoreConfig::default().capacity(CAPACITY).seed(0);
    Trainer::build(config, env, algo, &store_config, Box::new(NullRecorder::new()))
}

fn spaces() -> Vec<ActionSpace> {
    vec![ActionSpace::Discrete(N_ACTIONS); N_AGENTS]
}

fn initial_obs() -> Result<JointObs> {
    StubEnv::build(&env_config(), 0)?.reset()
}

fn dqn_config() -> DqnConfig {
    DqnConfig::default()
        .batch_size(BATCH_SIZE)
        .device(Device::Cpu)
}

fn obs_tensor(obs: &JointObs, i: usize) -> Tensor {
    Tensor::from_slice(obs.agent(i)).view([1, -1])
}

#[test]
fn test_idqn_on_stub_env() -> Result<()> {
    let algo = Idqn::build(dqn_config(), &[OBS_DIM; N_AGENTS], &spaces())?;
    let mut trainer = trainer(algo, None)?;

    let stats = trainer.train_episode()?;
    assert_eq!(stats.steps, EPISODE_STEPS);
    assert_eq!(stats.rewards, vec![EPISODE_STEPS as f32; N_AGENTS]);
    assert_eq!(trainer.store().len(), EPISODE_STEPS);

    // Updates start when the store holds a batch
    let n_updates = EPISODE_STEPS - BATCH_SIZE + 1;
    assert_eq!(stats.n_updates, n_updates);
    assert_eq!(trainer.algo().n_updates(), n_updates);

    // Terminal transitions do not bootstrap
    let terminal: Vec<_> = trainer.store().iter().filter(|tr| tr.all_done()).collect();
    assert_eq!(terminal.len(), 1);
    let batch = JointBatch::from_transitions(&terminal, tch::Device::Cpu)?;
    for tgt in trainer.algo().targets(&batch) {
        assert_eq!(Vec::<f32>::try_from(&tgt)?, vec![1.0]);
    }

    // Others do
    let first: Vec<_> = trainer.store().iter().take(BATCH_SIZE).collect();
    let batch = JointBatch::from_transitions(&first, tch::Device::Cpu)?;
    assert_eq!(batch.batch_size(), BATCH_SIZE as i64);
    let not_done = batch.not_done.sum(Kind::Float).double_value(&[]);
    assert_eq!(not_done, (BATCH_SIZE * N_AGENTS) as f64);

    let discount = dqn_config().discount_factor;
    let targets = trainer.algo().targets(&batch);
    for (i, tgt) in targets.iter().enumerate() {
        let (q_next, _) = trainer
            .algo()
            .target_q_values(i, &batch.next_obs[i])
            .max_dim(-1, false);
        let q_next = Vec::<f32>::try_from(&q_next)?;
        let tgt = Vec::<f32>::try_from(tgt)?;
        for (t, q) in tgt.iter().zip(q_next.iter()) {
            assert!(*q != 0.0);
            assert!((t - (1.0 + discount as f32 * q)).abs() < 1e-6);
        }
    }
    Ok(())
}

#[test]
fn test_save_and_restore() -> Result<()> {
    let dir = TempDir::new("marl_tch_agent")?;
    let algo = Vdn::build(dqn_config(), &[OBS_DIM; N_AGENTS], &spaces())?;
    let mut trainer1 = trainer(algo, Some(&dir))?;
    trainer1.train_episode()?;
    trainer1.save()?;
    assert!(dir.path().join("qnet.pt").is_file());
    assert!(dir.path().join("qnet_tgt.pt").is_file());

    let algo = Vdn::build(dqn_config(), &[OBS_DIM; N_AGENTS], &spaces())?;
    let mut trainer2 = trainer(algo, Some(&dir))?;
    trainer2.restore()?;
    assert_eq!(trainer2.algo().n_updates(), trainer1.algo().n_updates());
    assert_eq!(trainer2.episodes(), 1);

    let obs = initial_obs()?;
    for i in 0..N_AGENTS {
        let q1 = trainer1.algo().q_values(i, &obs_tensor(&obs, i));
        let q2 = trainer2.algo().q_values(i, &obs_tensor(&obs, i));
        assert!(q1.allclose(&q2, 1e-6, 1e-6, false));
    }

    trainer1.close()?;
    trainer2.close()?;
    Ok(())
}

#[test]
fn test_comm_hidden_through_trainer() -> Result<()> {
    let config = CommConfig::default()
        .kind(CommKind::GlobalThought)
        .device(Device::Cpu);
    let algo = Comm::build(config, &[OBS_DIM; N_AGENTS], &spaces())?;
    let mut trainer = trainer(algo, None)?;

    let stats = trainer.train_episode()?;
    assert_eq!(stats.n_updates, EPISODE_STEPS);
    let norm = |trainer: &Trainer<StubEnv, Comm>| -> f64 {
        trainer
            .algo()
            .hidden()
            .iter()
            .map(|h| h.hx.abs().sum(Kind::Float).double_value(&[]))
            .sum()
    };
    assert!(norm(&trainer) > 0.0);

    trainer.algo_mut().reset_episode()?;
    assert_eq!(norm(&trainer), 0.0);

    // Evaluation does not learn
    let n_updates = trainer.algo().n_updates();
    let rewards = trainer.test(2, false)?;
    assert_eq!(rewards.len(), 2);
    assert_eq!(trainer.algo().n_updates(), n_updates);
    Ok(())
}

#[test]
fn test_train_with_evaluation() -> Result<()> {
    let dir = TempDir::new("marl_tch_agent")?;
    let config = MaddpgConfig::default()
        .batch_size(BATCH_SIZE)
        .device(Device::Cpu);
    let algo = Maddpg::build(config, &[OBS_DIM; N_AGENTS], &spaces())?;
    let mut trainer = trainer(algo, Some(&dir))?;

    let stats = trainer.run_guarded(|trainer| trainer.train(2, 1))?;
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().all(|s| s.steps == EPISODE_STEPS));
    assert!(dir.path().join("model.pt").is_file());
    assert!(dir.path().join("best").join("model.pt").is_file());
    Ok(())
}

#[test]
fn test_consensus_variants_train() -> Result<()> {
    for consensus in [true, false] {
        let config = ConsensusConfig::default()
            .consensus(consensus)
            .batch_size(BATCH_SIZE)
            .device(Device::Cpu);
        let algo = ConsensusDqn::build(config, &[OBS_DIM; N_AGENTS], &spaces())?;
        let mut trainer = trainer(algo, None)?;
        let stats = trainer.train_episode()?;
        assert_eq!(stats.n_updates, EPISODE_STEPS - BATCH_SIZE + 1);
        assert!(stats.loss.is_finite());
    }
    Ok(())
}

#[test]
fn test_comm_kinds_train() -> Result<()> {
    for kind in [
        CommKind::ThoughtShare,
        CommKind::CounterfactualThoughtShare,
        CommKind::HybridShare,
        CommKind::GlobalThoughtAdvantage,
    ] {
        let config = CommConfig::default()
            .kind(kind)
            .min_transitions_warmup(5)
            .device(Device::Cpu);
        let algo = Comm::build(config, &[OBS_DIM; N_AGENTS], &spaces())?;
        let mut trainer = trainer(algo, None)?;
        let stats = trainer.train_episode()?;
        assert_eq!(stats.n_updates, EPISODE_STEPS - 5 + 1);
        assert!(stats.loss.is_finite());
    }
    Ok(())
}
