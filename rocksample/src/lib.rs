use fixedbitset::FixedBitSet;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use pomdp::{
  utils::{Coord, Grid},
  History, Simulator, StepOutcome,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub const OBS_NONE: usize = 0;
pub const OBS_GOOD: usize = 1;
pub const OBS_BAD: usize = 2;

pub const A_SAMPLE: usize = 4;
/// check(i) is encoded as `A_CHECK + i`
pub const A_CHECK: usize = 5;

#[repr(usize)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, FromPrimitive)]
pub enum Move {
  North,
  South,
  East,
  West,
}

#[derive(Clone, Debug)]
pub struct RockEntry {
  pub valuable: bool,
  pub collected: bool,
  /// good minus bad measurements; drives the preferred-action heuristic
  pub count: i32,
  pub measured: u32,
  pub likelihood_valuable: f32,
  pub likelihood_worthless: f32,
  pub prob_valuable: f32,
}

impl RockEntry {
  fn new(valuable: bool) -> Self {
    RockEntry {
      valuable,
      collected: false,
      count: 0,
      measured: 0,
      likelihood_valuable: 1.0,
      likelihood_worthless: 1.0,
      prob_valuable: 0.5,
    }
  }
}

#[derive(Clone, Debug)]
pub struct State {
  pub agent_pos: Coord,
  pub rocks: Vec<RockEntry>,
  pub exited: bool,
}

/// Grid navigation with hidden rock values: walk, sample the rock under the
/// agent, or run the long-range sensor on any rock. Leaving over the east
/// edge ends the episode with a bonus. Rock positions are public; only the
/// values are hidden.
pub struct RockSample {
  grid: Grid<i32>,
  rock_pos: Vec<Coord>,
  start_pos: Coord,
  half_efficiency_distance: f32,
  entropy_limit: f32,
}

impl RockSample {
  pub fn new(size: usize, num_rocks: usize) -> Self {
    let start_pos = Coord::new(0, size as i32 / 2);
    let mut grid = Grid::new(size, size, -1);
    let mut rock_pos = Vec::with_capacity(num_rocks);
    // layout is part of the problem definition, so derive it from the
    // parameters rather than the caller's rng
    let mut layout_rng = StdRng::seed_from_u64((size * 1021 + num_rocks) as u64);
    while rock_pos.len() < num_rocks {
      let coord = Coord::new(
        layout_rng.gen_range(0..size as i32),
        layout_rng.gen_range(0..size as i32),
      );
      if coord != start_pos && grid[coord] < 0 {
        grid[coord] = rock_pos.len() as i32;
        rock_pos.push(coord);
      }
    }
    RockSample {
      grid,
      rock_pos,
      start_pos,
      half_efficiency_distance: 20.0,
      entropy_limit: 0.5,
    }
  }

  /// The 1x5 corridor: agent in the middle, one rock by the east exit, a
  /// sensor that never errs.
  pub fn line(length: usize) -> Self {
    let mut grid = Grid::new(length, 1, -1);
    let rock = Coord::new(length as i32 - 1, 0);
    grid[rock] = 0;
    RockSample {
      grid,
      rock_pos: vec![rock],
      start_pos: Coord::new(length as i32 / 2, 0),
      half_efficiency_distance: 1.0e6,
      entropy_limit: 0.5,
    }
  }

  pub fn num_rocks(&self) -> usize {
    self.rock_pos.len()
  }

  fn efficiency(&self, distance: f32) -> f32 {
    (1.0 + 2f32.powf(-distance / self.half_efficiency_distance)) * 0.5
  }

  fn rock_at(&self, coord: Coord) -> Option<usize> {
    if self.grid.inside(coord) && self.grid[coord] >= 0 {
      Some(self.grid[coord] as usize)
    } else {
      None
    }
  }

  fn sample_observation(&self, rng: &mut StdRng, state: &State, rock: usize) -> usize {
    let distance = state.agent_pos.euclidean_distance(&self.rock_pos[rock]);
    let correct = rng.gen::<f32>() < self.efficiency(distance);
    let truth = state.rocks[rock].valuable;
    if truth == correct {
      OBS_GOOD
    } else {
      OBS_BAD
    }
  }
}

fn binary_entropy(p: f32) -> f32 {
  if p <= 0.0 || p >= 1.0 {
    0.0
  } else {
    -p * p.log2() - (1.0 - p) * (1.0 - p).log2()
  }
}

impl Simulator for RockSample {
  type State = State;

  fn num_actions(&self) -> usize {
    A_CHECK + self.rock_pos.len()
  }

  fn num_observations(&self) -> usize {
    3
  }

  fn discount(&self) -> f32 {
    0.95
  }

  fn reward_range(&self) -> f32 {
    20.0
  }

  fn create_start_state(&self, rng: &mut StdRng) -> Self::State {
    State {
      agent_pos: self.start_pos,
      rocks: (0..self.rock_pos.len())
        .map(|_| RockEntry::new(rng.gen::<f32>() < 0.5))
        .collect(),
      exited: false,
    }
  }

  fn step(&self, rng: &mut StdRng, state: &mut Self::State, action: usize) -> StepOutcome {
    if state.exited {
      return StepOutcome {
        observation: OBS_NONE,
        reward: 0.0,
        terminal: true,
      };
    }
    let mut observation = OBS_NONE;
    let mut reward = 0.0;
    let mut terminal = false;
    if action < A_SAMPLE {
      let direction = Move::from_usize(action).unwrap();
      let next = state.agent_pos + Coord::compass(action);
      if self.grid.inside(next) {
        state.agent_pos = next;
      } else if direction == Move::East {
        // the east edge is the exit
        reward = 10.0;
        state.exited = true;
        terminal = true;
      } else {
        reward = -100.0;
      }
    } else if action == A_SAMPLE {
      match self.rock_at(state.agent_pos) {
        Some(rock) if !state.rocks[rock].collected => {
          let entry = &mut state.rocks[rock];
          entry.collected = true;
          reward = if entry.valuable { 10.0 } else { -10.0 };
        }
        _ => reward = -100.0,
      }
    } else {
      let rock = action - A_CHECK;
      if rock >= state.rocks.len() {
        reward = -100.0;
      } else {
        observation = self.sample_observation(rng, state, rock);
        let eff =
          self.efficiency(state.agent_pos.euclidean_distance(&self.rock_pos[rock]));
        let entry = &mut state.rocks[rock];
        entry.measured += 1;
        if observation == OBS_GOOD {
          entry.count += 1;
          entry.likelihood_valuable *= eff;
          entry.likelihood_worthless *= 1.0 - eff;
        } else {
          entry.count -= 1;
          entry.likelihood_worthless *= eff;
          entry.likelihood_valuable *= 1.0 - eff;
        }
        let denom = 0.5 * entry.likelihood_valuable + 0.5 * entry.likelihood_worthless;
        entry.prob_valuable = if denom > 0.0 {
          0.5 * entry.likelihood_valuable / denom
        } else {
          0.5
        };
      }
    }
    StepOutcome {
      observation,
      reward,
      terminal,
    }
  }

  fn validate(&self, state: &Self::State) -> bool {
    state.rocks.len() == self.rock_pos.len()
      && (state.exited || self.grid.inside(state.agent_pos))
  }

  fn generate_legal(&self, state: &Self::State, _history: &History) -> FixedBitSet {
    let mut mask = FixedBitSet::with_capacity(self.num_actions());
    if state.exited {
      return mask;
    }
    let pos = state.agent_pos;
    if self.grid.inside(pos + Coord::NORTH) {
      mask.insert(Move::North as usize);
    }
    if self.grid.inside(pos + Coord::SOUTH) {
      mask.insert(Move::South as usize);
    }
    // east always: either a move or the exit
    mask.insert(Move::East as usize);
    if self.grid.inside(pos + Coord::WEST) {
      mask.insert(Move::West as usize);
    }
    if let Some(rock) = self.rock_at(pos) {
      if !state.rocks[rock].collected {
        mask.insert(A_SAMPLE);
      }
    }
    for (rock, entry) in state.rocks.iter().enumerate() {
      if !entry.collected {
        mask.insert(A_CHECK + rock);
      }
    }
    mask
  }

  /// Sample a rock that has measured more good than bad, walk toward rocks
  /// still worth investigating, head for the exit once everything looks
  /// bad.
  fn generate_preferred(&self, state: &Self::State, _history: &History) -> FixedBitSet {
    let mut mask = FixedBitSet::with_capacity(self.num_actions());
    if state.exited {
      return mask;
    }
    if let Some(rock) = self.rock_at(state.agent_pos) {
      let entry = &state.rocks[rock];
      if !entry.collected && entry.count > 0 {
        mask.insert(A_SAMPLE);
        return mask;
      }
    }
    let mut any_interest = false;
    let mut interest = [false; 4];
    for (rock, entry) in state.rocks.iter().enumerate() {
      if entry.collected || entry.count < 0 {
        continue;
      }
      any_interest = true;
      let pos = self.rock_pos[rock];
      if pos.y > state.agent_pos.y {
        interest[Move::North as usize] = true;
      }
      if pos.y < state.agent_pos.y {
        interest[Move::South as usize] = true;
      }
      if pos.x > state.agent_pos.x {
        interest[Move::East as usize] = true;
      }
      if pos.x < state.agent_pos.x {
        interest[Move::West as usize] = true;
      }
    }
    if !any_interest {
      mask.insert(Move::East as usize);
      return mask;
    }
    for direction in 0..4 {
      if interest[direction]
        && (direction == Move::East as usize
          || self.grid.inside(state.agent_pos + Coord::compass(direction)))
      {
        mask.insert(direction);
      }
    }
    mask
  }

  /// Flip one rock's hidden value, then insist the proposal reproduces the
  /// observation the agent actually saw on its last sensor reading.
  fn local_move(
    &self,
    rng: &mut StdRng,
    state: &mut Self::State,
    history: &History,
    last_observation: usize,
  ) -> bool {
    if state.rocks.is_empty() {
      return false;
    }
    let rock = rng.gen_range(0..state.rocks.len());
    state.rocks[rock].valuable = rng.gen::<f32>() < 0.5;
    if let Some(entry) = history.back() {
      if entry.action >= A_CHECK {
        let checked = entry.action - A_CHECK;
        if checked < state.rocks.len() {
          return self.sample_observation(rng, state, checked) == last_observation;
        }
      }
    }
    true
  }

  fn potential(&self, state: &Self::State) -> f32 {
    let mut value = 0.0;
    for entry in &state.rocks {
      if entry.collected {
        value += if entry.valuable { 1.0 } else { -1.0 };
      } else if binary_entropy(entry.prob_valuable) > self.entropy_limit {
        // unidentified rocks hold the score down until someone checks them
        value -= 0.5;
      }
    }
    value
  }

  fn pgs_legal(&self, state: &Self::State, history: &History) -> FixedBitSet {
    let mut mask = self.generate_legal(state, history);
    for (rock, entry) in state.rocks.iter().enumerate() {
      if entry.collected {
        continue;
      }
      let confident = binary_entropy(entry.prob_valuable) < self.entropy_limit;
      if confident {
        // re-checking a settled rock is wasted sensing
        mask.set(A_CHECK + rock, false);
        if entry.prob_valuable < 0.5 && self.rock_at(state.agent_pos) == Some(rock) {
          mask.set(A_SAMPLE, false);
        }
      }
    }
    mask
  }

  fn action_name(&self, action: usize) -> String {
    match action {
      0 => "north".to_string(),
      1 => "south".to_string(),
      2 => "east".to_string(),
      3 => "west".to_string(),
      A_SAMPLE => "sample".to_string(),
      _ => format!("check-{}", action - A_CHECK),
    }
  }

  fn observation_name(&self, observation: usize) -> String {
    match observation {
      OBS_GOOD => "good".to_string(),
      OBS_BAD => "bad".to_string(),
      _ => "none".to_string(),
    }
  }

  fn display_state(&self, state: &Self::State) -> String {
    let mut out = String::new();
    for y in (0..self.grid.height() as i32).rev() {
      for x in 0..self.grid.width() as i32 {
        let coord = Coord::new(x, y);
        if coord == state.agent_pos && !state.exited {
          out.push('A');
        } else if let Some(rock) = self.rock_at(coord) {
          let entry = &state.rocks[rock];
          out.push(if entry.collected {
            'x'
          } else if entry.valuable {
            '$'
          } else {
            'o'
          });
        } else {
          out.push('.');
        }
      }
      out.push('\n');
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use pomcp::{Params, Pomcp};

  use super::*;

  #[test]
  fn corridor_checks_before_moving() {
    // with the sink by the exit and nothing known about it, the sensor is
    // the only action that separates the sample-then-leave plan from the
    // plain exit
    let problem = RockSample::line(5);
    let params = Params {
      num_simulations: 1 << 14,
      max_depth: 30,
      num_start_states: 200,
      exploration_constant: 20.0,
      smart_tree_count: 0.0,
      ..Params::default()
    };
    let mut engine = Pomcp::new(&problem, params, StdRng::seed_from_u64(11));
    assert_eq!(engine.select_action(), A_CHECK);
  }

  #[test]
  fn impossible_observation_repairs_the_belief() {
    let problem = RockSample::line(5);
    let params = Params {
      num_simulations: 64,
      num_start_states: 100,
      ..Params::default()
    };
    let mut engine = Pomcp::new(&problem, params, StdRng::seed_from_u64(2));
    engine.select_action();
    // a move never emits a sensor reading, so this transition is
    // inconsistent with every particle
    engine.update(Move::East as usize, OBS_GOOD, 0.0);
    assert_eq!(engine.tree().node(engine.root()).belief().len(), 100);
  }

  #[test]
  fn legal_mask_fits_the_map() {
    let problem = RockSample::line(5);
    let mut rng = StdRng::seed_from_u64(4);
    let state = problem.create_start_state(&mut rng);
    let legal = problem.generate_legal(&state, &History::new());
    assert!(legal.contains(Move::East as usize));
    assert!(legal.contains(Move::West as usize));
    assert!(!legal.contains(Move::North as usize));
    assert!(!legal.contains(Move::South as usize));
    assert!(!legal.contains(A_SAMPLE));
    assert!(legal.contains(A_CHECK));
  }

  #[test]
  fn perfect_sensor_settles_the_posterior() {
    let problem = RockSample::line(5);
    let mut rng = StdRng::seed_from_u64(6);
    let mut state = problem.create_start_state(&mut rng);
    let valuable = state.rocks[0].valuable;
    let outcome = problem.step(&mut rng, &mut state, A_CHECK);
    assert_eq!(
      outcome.observation,
      if valuable { OBS_GOOD } else { OBS_BAD }
    );
    if valuable {
      assert!(state.rocks[0].prob_valuable > 0.99);
    } else {
      assert!(state.rocks[0].prob_valuable < 0.01);
    }
  }

  #[test]
  fn local_move_respects_the_last_reading() {
    let problem = RockSample::line(5);
    let mut rng = StdRng::seed_from_u64(8);
    let mut state = problem.create_start_state(&mut rng);
    state.rocks[0].valuable = true;
    let mut history = History::new();
    history.add(A_CHECK, OBS_GOOD);
    // proposals that flip the rock to worthless cannot reproduce GOOD
    // through a perfect sensor
    let mut accepted_worthless = 0;
    for _ in 0..64 {
      let mut proposal = state.clone();
      if problem.local_move(&mut rng, &mut proposal, &history, OBS_GOOD)
        && !proposal.rocks[0].valuable
      {
        accepted_worthless += 1;
      }
    }
    assert_eq!(accepted_worthless, 0);
  }

  #[test]
  fn rave_matches_plain_search_on_the_corridor() {
    let problem = RockSample::line(5);
    let mut returns = [vec![], vec![]];
    for (ix, use_rave) in [false, true].into_iter().enumerate() {
      for seed in 0..30u64 {
        let params = Params {
          num_simulations: 256,
          max_depth: 30,
          num_start_states: 100,
          exploration_constant: 20.0,
          use_rave,
          rave_constant: 0.01,
          ..Params::default()
        };
        let mut engine = Pomcp::new(&problem, params, StdRng::seed_from_u64(seed));
        let mut world = StdRng::seed_from_u64(seed + 1000);
        let mut state = problem.create_start_state(&mut world);
        let mut total = 0.0;
        let mut discount = 1.0;
        for _ in 0..12 {
          let action = engine.select_action();
          let outcome = problem.step(&mut world, &mut state, action);
          total += discount * outcome.reward;
          discount *= problem.discount();
          engine.update(action, outcome.observation, outcome.reward);
          if outcome.terminal {
            break;
          }
        }
        returns[ix].push(total);
      }
    }
    let mean = |xs: &Vec<f32>| xs.iter().sum::<f32>() / xs.len() as f32;
    let stderr = |xs: &Vec<f32>| {
      let m = mean(xs);
      (xs.iter().map(|x| (x - m) * (x - m)).sum::<f32>() / (xs.len() as f32 - 1.0)).sqrt()
        / (xs.len() as f32).sqrt()
    };
    let plain = mean(&returns[0]);
    let rave = mean(&returns[1]);
    let slack = 2.0 * (stderr(&returns[0]) + stderr(&returns[1]));
    assert!(
      rave >= plain - slack,
      "rave {rave} fell below plain {plain} by more than {slack}"
    );
  }
}
