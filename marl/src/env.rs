//! A switch environment on a small grid.
//!
//! Two rooms are connected by a corridor of one cell width. Every agent
//! starts in one room and has to reach its goal in the other room, so the
//! agents have to take turns in the corridor.
//!
//! ```text
//! 0 . # # # . 1
//! . . . . . . .
//! . . # # # . .
//! ```
use anyhow::{bail, Result};
use log::trace;
use marl_core::{error::MarlError, record::Record, ActionSpace, Env, JointAct, JointObs, Step};
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Number of actions: down, left, up, right and no-op.
pub const N_ACTIONS: usize = 5;

const MOVES: [(i64, i64); N_ACTIONS] = [(1, 0), (0, -1), (-1, 0), (0, 1), (0, 0)];

/// Configuration of [`SwitchEnv`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct SwitchEnvConfig {
    /// Number of agents, 2 or 4.
    pub n_agents: usize,

    /// Number of rows.
    pub height: usize,

    /// Number of columns.
    pub width: usize,

    /// Number of columns of each room.
    pub room_width: usize,

    /// Reward of an agent for every step before it reaches its goal.
    pub step_cost: f32,

    /// Reward of an agent reaching its goal.
    pub goal_reward: f32,

    /// Steps after which every agent is done.
    pub max_steps: usize,

    /// If `true`, agents start at random cells of their rooms.
    pub random_start: bool,
}

impl Default for SwitchEnvConfig {
    fn default() -> Self {
        Self {
            n_agents: 2,
            height: 3,
            width: 7,
            room_width: 2,
            step_cost: -0.1,
            goal_reward: 5.0,
            max_steps: 50,
            random_start: false,
        }
    }
}

impl SwitchEnvConfig {
    /// Configuration of a registered environment name, `Switch2-v0` or `Switch4-v0`.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "Switch2-v0" => Ok(Self::default()),
            "Switch4-v0" => Ok(Self::default().n_agents(4)),
            _ => bail!("Unknown environment: {}", name),
        }
    }

    /// Sets the number of agents.
    pub fn n_agents(mut self, v: usize) -> Self {
        self.n_agents = v;
        self
    }

    /// Sets the maximum number of steps.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    /// Sets whether agents start at random cells.
    pub fn random_start(mut self, v: bool) -> Self {
        self.random_start = v;
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

type Cell = (usize, usize);

/// Agents swapping rooms through a corridor.
///
/// Even agents start in the left room, odd agents in the right room. The
/// goal of an agent is the corner of the other room on the row it starts
/// from. An agent is done on arrival and stays there. Moves into a wall,
/// off the grid or into a cell occupied by another agent are ignored.
///
/// The observation of an agent is its row and column scaled into `[0, 1]`
/// and the elapsed fraction of the episode.
pub struct SwitchEnv {
    config: SwitchEnvConfig,
    rng: fastrand::Rng,
    pos: Vec<Cell>,
    goals: Vec<Cell>,
    done: Vec<bool>,
    t: usize,
}

impl SwitchEnv {
    fn corridor_row(&self) -> usize {
        self.config.height / 2
    }

    fn is_wall(&self, (r, c): Cell) -> bool {
        let w = &self.config;
        c >= w.room_width && c < w.width - w.room_width && r != self.corridor_row()
    }

    fn is_left(i: usize) -> bool {
        i % 2 == 0
    }

    fn start_row(&self, i: usize) -> usize {
        match (i / 2) % 2 {
            0 => 0,
            _ => self.config.height - 1,
        }
    }

    fn start_cells(&mut self) -> Vec<Cell> {
        let (w, rw) = (self.config.width, self.config.room_width);
        let mut cells: Vec<Cell> = Vec::with_capacity(self.config.n_agents);
        for i in 0..self.config.n_agents {
            let cell = match self.config.random_start {
                false => {
                    let c = if Self::is_left(i) { 0 } else { w - 1 };
                    (self.start_row(i), c)
                }
                true => loop {
                    let r = self.rng.usize(0..self.config.height);
                    let c = self.rng.usize(0..rw);
                    let c = if Self::is_left(i) { c } else { w - 1 - c };
                    if !cells.contains(&(r, c)) {
                        break (r, c);
                    }
                },
            };
            cells.push(cell);
        }
        cells
    }

    fn goal_cells(&self) -> Vec<Cell> {
        (0..self.config.n_agents)
            .map(|i| {
                let c = if Self::is_left(i) { self.config.width - 1 } else { 0 };
                (self.start_row(i), c)
            })
            .collect()
    }

    fn obs(&self) -> JointObs {
        let h = (self.config.height - 1).max(1) as f32;
        let w = (self.config.width - 1).max(1) as f32;
        let t = self.t as f32 / self.config.max_steps.max(1) as f32;
        JointObs(
            self.pos
                .iter()
                .map(|&(r, c)| vec![r as f32 / h, c as f32 / w, t])
                .collect(),
        )
    }

    fn target(&self, (r, c): Cell, a: usize) -> Option<Cell> {
        let (dr, dc) = MOVES[a];
        let r = r as i64 + dr;
        let c = c as i64 + dc;
        if r < 0 || c < 0 || r >= self.config.height as i64 || c >= self.config.width as i64 {
            return None;
        }
        let cell = (r as usize, c as usize);
        match self.is_wall(cell) {
            true => None,
            false => Some(cell),
        }
    }

    /// Positions of the agents as `(row, column)`.
    pub fn positions(&self) -> &[Cell] {
        &self.pos
    }
}

impl Env for SwitchEnv {
    type Config = SwitchEnvConfig;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        if config.n_agents == 0 || config.n_agents > 4 {
            bail!("SwitchEnv supports 1 to 4 agents, got {}", config.n_agents);
        }
        if 2 * config.room_width >= config.width || config.height < 2 {
            bail!("Grid of {}x{} has no room for the corridor", config.height, config.width);
        }
        let mut env = Self {
            config: config.clone(),
            rng: fastrand::Rng::with_seed(seed as u64),
            pos: vec![],
            goals: vec![],
            done: vec![false; config.n_agents],
            t: 0,
        };
        env.goals = env.goal_cells();
        env.pos = env.start_cells();
        Ok(env)
    }

    fn n_agents(&self) -> usize {
        self.config.n_agents
    }

    fn obs_dims(&self) -> Vec<usize> {
        vec![3; self.config.n_agents]
    }

    fn action_spaces(&self) -> Vec<ActionSpace> {
        vec![ActionSpace::Discrete(N_ACTIONS); self.config.n_agents]
    }

    fn reset(&mut self) -> Result<JointObs> {
        self.t = 0;
        self.pos = self.start_cells();
        self.done = vec![false; self.config.n_agents];
        Ok(self.obs())
    }

    fn step(&mut self, act: &JointAct) -> Result<(Step, Record)> {
        let n = self.config.n_agents;
        if act.n_agents() != n {
            return Err(MarlError::AgentCountMismatch {
                expected: n,
                actual: act.n_agents(),
            }
            .into());
        }

        self.t += 1;
        let mut reward = vec![0f32; n];
        for i in 0..n {
            if self.done[i] {
                continue;
            }
            reward[i] = self.config.step_cost;
            let a = act.index(i).min(N_ACTIONS - 1);
            if let Some(cell) = self.target(self.pos[i], a) {
                if !self.pos.contains(&cell) {
                    self.pos[i] = cell;
                }
            }
            if self.pos[i] == self.goals[i] {
                self.done[i] = true;
                reward[i] = self.config.goal_reward;
            }
        }
        if self.t >= self.config.max_steps {
            self.done = vec![true; n];
        }
        trace!("t = {}, positions = {:?}", self.t, self.pos);

        let step = Step::new(self.obs(), reward, self.done.clone());
        Ok((step, Record::empty()))
    }

    fn render(&mut self) -> Result<()> {
        let mut lines = Vec::with_capacity(self.config.height);
        for r in 0..self.config.height {
            let line: Vec<String> = (0..self.config.width)
                .map(|c| match self.pos.iter().position(|&p| p == (r, c)) {
                    Some(i) => i.to_string(),
                    None if self.is_wall((r, c)) => "#".to_string(),
                    None => ".".to_string(),
                })
                .collect();
            lines.push(line.join(" "));
        }
        println!("t = {}\n{}\n", self.t, lines.join("\n"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn act(ixs: &[usize]) -> JointAct {
        JointAct::from_indices(ixs, &vec![ActionSpace::Discrete(N_ACTIONS); ixs.len()])
    }

    #[test]
    fn test_from_name() {
        assert_eq!(SwitchEnvConfig::from_name("Switch4-v0").unwrap().n_agents, 4);
        assert!(SwitchEnvConfig::from_name("Pong-v0").is_err());
    }

    #[test]
    fn test_walls_block_moves() {
        let mut env = SwitchEnv::build(&SwitchEnvConfig::default(), 0).unwrap();
        let obs = env.reset().unwrap();
        assert_eq!(env.positions(), &[(0, 0), (0, 6)]);
        assert_eq!(obs.agent(1), &[0.0, 1.0, 0.0]);

        // Agent 0 moves right into (0, 1), then into the wall at (0, 2)
        env.step(&act(&[3, 4])).unwrap();
        let (step, _) = env.step(&act(&[3, 4])).unwrap();
        assert_eq!(env.positions()[0], (0, 1));
        assert_eq!(step.reward, vec![-0.1, -0.1]);
        assert!(!step.all_done());
    }

    #[test]
    fn test_reach_goal() {
        let config = SwitchEnvConfig::default();
        let mut env = SwitchEnv::build(&config, 0).unwrap();
        env.reset().unwrap();

        // Agent 0 goes down to the corridor, then right to the other room,
        // while agent 1 stays
        let mut path = vec![0];
        path.extend(vec![3; 6]);
        path.push(2);
        let mut last = None;
        for a in path {
            last = Some(env.step(&act(&[a, 4])).unwrap().0);
        }
        // Agent 1 blocks (0, 6), so agent 0 ends below it
        assert_eq!(env.positions()[0], (1, 6));
        assert!(!last.unwrap().is_done[0]);

        // Agent 1 moves left, agent 0 takes the goal
        env.step(&act(&[4, 1])).unwrap();
        let (step, _) = env.step(&act(&[2, 4])).unwrap();
        assert_eq!(env.positions()[0], (0, 6));
        assert_eq!(step.reward[0], config.goal_reward);
        assert!(step.is_done[0]);
        assert!(!step.is_done[1]);

        // Done agents receive no reward
        let (step, _) = env.step(&act(&[1, 4])).unwrap();
        assert_eq!(step.reward[0], 0.0);
        assert_eq!(env.positions()[0], (0, 6));
    }

    #[test]
    fn test_max_steps() {
        let config = SwitchEnvConfig::default().max_steps(3);
        let mut env = SwitchEnv::build(&config, 0).unwrap();
        env.reset().unwrap();
        for t in 1..=3 {
            let (step, _) = env.step(&act(&[4, 4])).unwrap();
            assert_eq!(step.all_done(), t == 3);
        }
    }

    #[test]
    fn test_random_start_is_seeded() {
        let config = SwitchEnvConfig::default().n_agents(4).random_start(true);
        let mut env1 = SwitchEnv::build(&config, 7).unwrap();
        let mut env2 = SwitchEnv::build(&config, 7).unwrap();
        for _ in 0..5 {
            assert_eq!(env1.reset().unwrap(), env2.reset().unwrap());
            let pos = env1.positions().to_vec();
            for (i, &(_, c)) in pos.iter().enumerate() {
                match i % 2 {
                    0 => assert!(c < config.room_width),
                    _ => assert!(c >= config.width - config.room_width),
                }
            }
        }
    }

    #[test]
    fn test_agent_count_mismatch() {
        let mut env = SwitchEnv::build(&SwitchEnvConfig::default(), 0).unwrap();
        env.reset().unwrap();
        assert!(env.step(&act(&[0])).is_err());
    }
}
