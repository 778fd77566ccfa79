use fixedbitset::FixedBitSet;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use pomdp::{
  utils::{Coord, Grid},
  History, Simulator, StepOutcome,
};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const OBS_NONE: usize = 0;
pub const OBS_GOOD: usize = 1;
pub const OBS_BAD: usize = 2;
pub const OBS_SHELF: usize = 3;
pub const OBS_CRATE: usize = 4;

pub const A_SAMPLE: usize = 4;

#[repr(usize)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, FromPrimitive)]
pub enum Move {
  North,
  South,
  East,
  West,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ObjectKind {
  Crate,
  Shelf,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct CellarParams {
  pub size: usize,
  pub bottles: usize,
  pub crates: usize,
  pub shelves: usize,
}

#[derive(Clone, Debug)]
pub struct BottleEntry {
  pub valuable: bool,
  pub collected: bool,
  pub count: i32,
  pub measured: u32,
  pub likelihood_valuable: f32,
  pub likelihood_worthless: f32,
  pub prob_valuable: f32,
}

impl BottleEntry {
  fn new(valuable: bool) -> Self {
    BottleEntry {
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
pub struct ObjectEntry {
  pub pos: Coord,
  pub kind: ObjectKind,
  pub count: i32,
  pub measured: u32,
  pub likelihood_crate: f32,
  pub likelihood_shelf: f32,
  pub prob_crate: f32,
  /// committed guess once the posterior clears the activation threshold
  pub assumed: Option<ObjectKind>,
}

impl ObjectEntry {
  fn new(pos: Coord, kind: ObjectKind) -> Self {
    ObjectEntry {
      pos,
      kind,
      count: 0,
      measured: 0,
      likelihood_crate: 1.0,
      likelihood_shelf: 1.0,
      prob_crate: 0.5,
      assumed: None,
    }
  }
}

#[derive(Clone, Debug)]
pub struct State {
  pub agent_pos: Coord,
  pub bottles: Vec<BottleEntry>,
  pub objects: Vec<ObjectEntry>,
  pub collected_bottles: u32,
  pub exited: bool,
}

/// Bottle collection among obstacles. Bottle and object locations are
/// public; which bottles are worth taking and which objects are pushable
/// crates (as opposed to immovable shelves) is hidden. The agent must leave
/// over the east edge carrying at least one bottle, paying for every step
/// and for every push against something that turns out not to move.
pub struct Cellar {
  params: CellarParams,
  bottle_map: Grid<i32>,
  bottle_pos: Vec<Coord>,
  object_start: Vec<Coord>,
  start_pos: Coord,
  half_efficiency_distance: f32,
  entropy_limit: f32,
  activation_threshold: f32,
}

impl Cellar {
  pub fn new(params: CellarParams) -> Self {
    let size = params.size as i32;
    let start_pos = Coord::new(0, size / 2);
    let mut bottle_map = Grid::new(params.size, params.size, -1);
    let mut taken = vec![start_pos];
    let mut layout_rng = StdRng::seed_from_u64(
      (params.size * 7919 + params.bottles * 389 + params.crates * 53 + params.shelves) as u64,
    );
    let place = |taken: &mut Vec<Coord>, rng: &mut StdRng| loop {
      let coord = Coord::new(rng.gen_range(0..size), rng.gen_range(0..size));
      // keep the start column clear so the exit is always reachable
      if coord.x == 0 || taken.contains(&coord) {
        continue;
      }
      taken.push(coord);
      return coord;
    };
    let mut bottle_pos = Vec::with_capacity(params.bottles);
    for ix in 0..params.bottles {
      let coord = place(&mut taken, &mut layout_rng);
      bottle_map[coord] = ix as i32;
      bottle_pos.push(coord);
    }
    let mut object_start = Vec::with_capacity(params.crates + params.shelves);
    for _ in 0..params.crates + params.shelves {
      object_start.push(place(&mut taken, &mut layout_rng));
    }
    Cellar {
      params,
      bottle_map,
      bottle_pos,
      object_start,
      start_pos,
      half_efficiency_distance: 20.0,
      entropy_limit: 0.5,
      activation_threshold: 0.9,
    }
  }

  pub fn five_one() -> Self {
    Cellar::new(CellarParams {
      size: 5,
      bottles: 1,
      crates: 0,
      shelves: 4,
    })
  }

  pub fn five_two() -> Self {
    Cellar::new(CellarParams {
      size: 5,
      bottles: 2,
      crates: 6,
      shelves: 4,
    })
  }

  pub fn seven_eight() -> Self {
    Cellar::new(CellarParams {
      size: 7,
      bottles: 8,
      crates: 7,
      shelves: 8,
    })
  }

  pub fn eleven_eleven() -> Self {
    Cellar::new(CellarParams {
      size: 11,
      bottles: 11,
      crates: 15,
      shelves: 15,
    })
  }

  pub fn params(&self) -> CellarParams {
    self.params
  }

  fn num_objects(&self) -> usize {
    self.object_start.len()
  }

  // action layout: moves, sample, bottle checks, object checks, then one
  // push block per compass direction
  fn a_bottle_check(&self) -> usize {
    A_SAMPLE + 1
  }

  fn a_object_check(&self) -> usize {
    self.a_bottle_check() + self.params.bottles
  }

  fn a_push(&self) -> usize {
    self.a_object_check() + self.num_objects()
  }

  pub fn push_action(&self, object: usize, direction: usize) -> usize {
    self.a_push() + direction * self.num_objects() + object
  }

  pub fn object_check_action(&self, object: usize) -> usize {
    self.a_object_check() + object
  }

  pub fn bottle_check_action(&self, bottle: usize) -> usize {
    self.a_bottle_check() + bottle
  }

  fn efficiency(&self, distance: f32) -> f32 {
    (1.0 + 2f32.powf(-distance / self.half_efficiency_distance)) * 0.5
  }

  fn bottle_at(&self, coord: Coord) -> Option<usize> {
    if self.bottle_map.inside(coord) && self.bottle_map[coord] >= 0 {
      Some(self.bottle_map[coord] as usize)
    } else {
      None
    }
  }

  fn object_at(state: &State, coord: Coord) -> Option<usize> {
    state.objects.iter().position(|o| o.pos == coord)
  }

  fn free_tile(&self, state: &State, coord: Coord) -> bool {
    self.bottle_map.inside(coord)
      && Cellar::object_at(state, coord).is_none()
      && self.bottle_at(coord).is_none()
      && coord != state.agent_pos
  }

  fn sample_bottle_observation(&self, rng: &mut StdRng, state: &State, bottle: usize) -> usize {
    let distance = state.agent_pos.euclidean_distance(&self.bottle_pos[bottle]);
    let correct = rng.gen::<f32>() < self.efficiency(distance);
    if state.bottles[bottle].valuable == correct {
      OBS_GOOD
    } else {
      OBS_BAD
    }
  }

  fn sample_object_observation(&self, rng: &mut StdRng, state: &State, object: usize) -> usize {
    let distance = state
      .agent_pos
      .euclidean_distance(&state.objects[object].pos);
    let correct = rng.gen::<f32>() < self.efficiency(distance);
    let is_crate = state.objects[object].kind == ObjectKind::Crate;
    if is_crate == correct {
      OBS_CRATE
    } else {
      OBS_SHELF
    }
  }

  fn select_target(&self, state: &State) -> Option<usize> {
    // nearest bottle still worth walking to
    let mut best: Option<(i32, usize)> = None;
    for (ix, bottle) in state.bottles.iter().enumerate() {
      if bottle.collected || bottle.prob_valuable < 0.5 {
        continue;
      }
      let d = state.agent_pos.manhattan_distance(&self.bottle_pos[ix]);
      if best.map(|(bd, _)| d < bd).unwrap_or(true) {
        best = Some((d, ix));
      }
    }
    best.map(|(_, ix)| ix)
  }
}

fn binary_entropy(p: f32) -> f32 {
  if p <= 0.0 || p >= 1.0 {
    0.0
  } else {
    -p * p.log2() - (1.0 - p) * (1.0 - p).log2()
  }
}

impl Simulator for Cellar {
  type State = State;

  fn num_actions(&self) -> usize {
    self.a_push() + 4 * self.num_objects()
  }

  fn num_observations(&self) -> usize {
    5
  }

  fn discount(&self) -> f32 {
    0.95
  }

  fn reward_range(&self) -> f32 {
    20.0
  }

  fn create_start_state(&self, rng: &mut StdRng) -> Self::State {
    let mut kinds: Vec<ObjectKind> = std::iter::repeat(ObjectKind::Crate)
      .take(self.params.crates)
      .chain(std::iter::repeat(ObjectKind::Shelf).take(self.params.shelves))
      .collect();
    kinds.shuffle(rng);
    State {
      agent_pos: self.start_pos,
      bottles: (0..self.params.bottles)
        .map(|_| BottleEntry::new(rng.gen::<f32>() < 0.5))
        .collect(),
      objects: self
        .object_start
        .iter()
        .zip(kinds)
        .map(|(pos, kind)| ObjectEntry::new(*pos, kind))
        .collect(),
      collected_bottles: 0,
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
    // every step costs
    let mut reward = -1.0;
    let mut observation = OBS_NONE;
    let mut terminal = false;
    if action < A_SAMPLE {
      let direction = Move::from_usize(action).unwrap();
      let next = state.agent_pos + Coord::compass(action);
      if self.bottle_map.inside(next) {
        if Cellar::object_at(state, next).is_none() {
          state.agent_pos = next;
        }
        // walking into an obstacle wastes the step
      } else if direction == Move::East {
        if state.collected_bottles >= 1 {
          reward += 10.0;
          state.exited = true;
          terminal = true;
        } else {
          // nothing to show for the trip yet
          reward += -10.0;
        }
      } else {
        reward += -10.0;
      }
    } else if action == A_SAMPLE {
      match self.bottle_at(state.agent_pos) {
        Some(bottle) if !state.bottles[bottle].collected => {
          let entry = &mut state.bottles[bottle];
          entry.collected = true;
          reward += if entry.valuable { 10.0 } else { -10.0 };
          state.collected_bottles += 1;
        }
        _ => reward += -10.0,
      }
    } else if action < self.a_object_check() {
      let bottle = action - self.a_bottle_check();
      if bottle < state.bottles.len() && !state.bottles[bottle].collected {
        observation = self.sample_bottle_observation(rng, state, bottle);
        let eff = self.efficiency(
          state
            .agent_pos
            .euclidean_distance(&self.bottle_pos[bottle]),
        );
        let entry = &mut state.bottles[bottle];
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
      } else {
        reward += -10.0;
      }
    } else if action < self.a_push() {
      let object = action - self.a_object_check();
      if object < state.objects.len() {
        observation = self.sample_object_observation(rng, state, object);
        let eff = self.efficiency(
          state
            .agent_pos
            .euclidean_distance(&state.objects[object].pos),
        );
        let entry = &mut state.objects[object];
        entry.measured += 1;
        if observation == OBS_CRATE {
          entry.count += 1;
          entry.likelihood_crate *= eff;
          entry.likelihood_shelf *= 1.0 - eff;
        } else {
          entry.count -= 1;
          entry.likelihood_shelf *= eff;
          entry.likelihood_crate *= 1.0 - eff;
        }
        let denom = 0.5 * entry.likelihood_crate + 0.5 * entry.likelihood_shelf;
        entry.prob_crate = if denom > 0.0 {
          0.5 * entry.likelihood_crate / denom
        } else {
          0.5
        };
        if entry.prob_crate > self.activation_threshold {
          entry.assumed = Some(ObjectKind::Crate);
        } else if entry.prob_crate < 1.0 - self.activation_threshold {
          entry.assumed = Some(ObjectKind::Shelf);
        }
      } else {
        reward += -10.0;
      }
    } else {
      let offset = action - self.a_push();
      let direction = offset / self.num_objects();
      let object = offset % self.num_objects();
      let delta = Coord::compass(direction);
      let obj_pos = state.objects[object].pos;
      let pushable = state.agent_pos == obj_pos + Coord::new(-delta.x, -delta.y)
        && state.objects[object].kind == ObjectKind::Crate
        && self.free_tile(state, obj_pos + delta);
      if pushable {
        state.objects[object].pos = obj_pos + delta;
      } else {
        // shoving a shelf, or pushing from the wrong side
        reward += -10.0;
      }
    }
    StepOutcome {
      observation,
      reward,
      terminal,
    }
  }

  fn validate(&self, state: &Self::State) -> bool {
    state.bottles.len() == self.params.bottles
      && state.objects.len() == self.num_objects()
      && (state.exited || self.bottle_map.inside(state.agent_pos))
  }

  fn generate_legal(&self, state: &Self::State, _history: &History) -> FixedBitSet {
    let mut mask = FixedBitSet::with_capacity(self.num_actions());
    if state.exited {
      return mask;
    }
    let pos = state.agent_pos;
    for direction in 0..4 {
      let next = pos + Coord::compass(direction);
      if self.bottle_map.inside(next) {
        if Cellar::object_at(state, next).is_none() {
          mask.insert(direction);
        }
      } else if direction == Move::East as usize && state.collected_bottles >= 1 {
        mask.insert(direction);
      }
    }
    if let Some(bottle) = self.bottle_at(pos) {
      if !state.bottles[bottle].collected {
        mask.insert(A_SAMPLE);
      }
    }
    for (bottle, entry) in state.bottles.iter().enumerate() {
      if !entry.collected {
        mask.insert(self.a_bottle_check() + bottle);
      }
    }
    for object in 0..state.objects.len() {
      mask.insert(self.a_object_check() + object);
    }
    for (object, entry) in state.objects.iter().enumerate() {
      for direction in 0..4 {
        let delta = Coord::compass(direction);
        let behind = entry.pos + Coord::new(-delta.x, -delta.y);
        if pos == behind && self.bottle_map.inside(entry.pos + delta) {
          mask.insert(self.push_action(object, direction));
        }
      }
    }
    mask
  }

  fn generate_preferred(&self, state: &Self::State, _history: &History) -> FixedBitSet {
    let mut mask = FixedBitSet::with_capacity(self.num_actions());
    if state.exited {
      return mask;
    }
    if let Some(bottle) = self.bottle_at(state.agent_pos) {
      let entry = &state.bottles[bottle];
      if !entry.collected && entry.count > 0 {
        mask.insert(A_SAMPLE);
        return mask;
      }
    }
    let mut any_interest = false;
    let mut interest = [false; 4];
    for (bottle, entry) in state.bottles.iter().enumerate() {
      if entry.collected || entry.count < 0 {
        continue;
      }
      any_interest = true;
      let pos = self.bottle_pos[bottle];
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
      if state.collected_bottles >= 1 {
        mask.insert(Move::East as usize);
      }
      return mask;
    }
    for direction in 0..4 {
      let next = state.agent_pos + Coord::compass(direction);
      if interest[direction]
        && self.bottle_map.inside(next)
        && Cellar::object_at(state, next).is_none()
      {
        mask.insert(direction);
      }
    }
    mask
  }

  /// Re-roll one hidden fact (a bottle's value or an object's kind) and
  /// keep the proposal only if it reproduces the last sensor reading.
  fn local_move(
    &self,
    rng: &mut StdRng,
    state: &mut Self::State,
    history: &History,
    last_observation: usize,
  ) -> bool {
    let flip_bottle = !state.bottles.is_empty() && (state.objects.is_empty() || rng.gen());
    if flip_bottle {
      let bottle = rng.gen_range(0..state.bottles.len());
      state.bottles[bottle].valuable = rng.gen::<f32>() < 0.5;
    } else if !state.objects.is_empty() {
      let object = rng.gen_range(0..state.objects.len());
      let entry = &mut state.objects[object];
      entry.kind = if entry.kind == ObjectKind::Crate {
        ObjectKind::Shelf
      } else {
        ObjectKind::Crate
      };
    } else {
      return false;
    }
    if let Some(entry) = history.back() {
      if entry.action >= self.a_object_check() && entry.action < self.a_push() {
        let object = entry.action - self.a_object_check();
        return self.sample_object_observation(rng, state, object) == last_observation;
      }
      if entry.action >= self.a_bottle_check() && entry.action < self.a_object_check() {
        let bottle = entry.action - self.a_bottle_check();
        if !state.bottles[bottle].collected {
          return self.sample_bottle_observation(rng, state, bottle) == last_observation;
        }
      }
    }
    true
  }

  /// Progress potential: bottles banked, uncertainty still open, and
  /// unidentified obstacles sitting on the corridor toward the current
  /// target bottle.
  fn potential(&self, state: &Self::State) -> f32 {
    let mut value = 0.0;
    for entry in &state.bottles {
      if entry.collected {
        value += if entry.valuable { 1.0 } else { -1.0 };
      } else if binary_entropy(entry.prob_valuable) > self.entropy_limit {
        value -= 0.5;
      }
    }
    if let Some(target) = self.select_target(state) {
      let goal = self.bottle_pos[target];
      let lo_x = state.agent_pos.x.min(goal.x) - 1;
      let hi_x = state.agent_pos.x.max(goal.x) + 1;
      let lo_y = state.agent_pos.y.min(goal.y) - 1;
      let hi_y = state.agent_pos.y.max(goal.y) + 1;
      for entry in &state.objects {
        let near = entry.pos.x >= lo_x
          && entry.pos.x <= hi_x
          && entry.pos.y >= lo_y
          && entry.pos.y <= hi_y;
        if near && entry.assumed.is_none() && binary_entropy(entry.prob_crate) > self.entropy_limit
        {
          value -= 0.5;
        }
      }
    }
    value
  }

  fn pgs_legal(&self, state: &Self::State, history: &History) -> FixedBitSet {
    let mut mask = self.generate_legal(state, history);
    for (bottle, entry) in state.bottles.iter().enumerate() {
      if entry.collected {
        continue;
      }
      if binary_entropy(entry.prob_valuable) < self.entropy_limit {
        mask.set(self.a_bottle_check() + bottle, false);
        if entry.prob_valuable < 0.5 && self.bottle_at(state.agent_pos) == Some(bottle) {
          mask.set(A_SAMPLE, false);
        }
      }
    }
    for (object, entry) in state.objects.iter().enumerate() {
      if entry.assumed.is_some() || binary_entropy(entry.prob_crate) < self.entropy_limit {
        mask.set(self.a_object_check() + object, false);
      }
      if entry.assumed == Some(ObjectKind::Shelf) {
        for direction in 0..4 {
          mask.set(self.push_action(object, direction), false);
        }
      }
    }
    mask
  }

  fn action_name(&self, action: usize) -> String {
    if action < A_SAMPLE {
      ["north", "south", "east", "west"][action].to_string()
    } else if action == A_SAMPLE {
      "sample".to_string()
    } else if action < self.a_object_check() {
      format!("check-bottle-{}", action - self.a_bottle_check())
    } else if action < self.a_push() {
      format!("check-object-{}", action - self.a_object_check())
    } else {
      let offset = action - self.a_push();
      let direction = ["north", "south", "east", "west"][offset / self.num_objects()];
      format!("push-{}-{}", offset % self.num_objects(), direction)
    }
  }

  fn observation_name(&self, observation: usize) -> String {
    ["none", "good", "bad", "shelf", "crate"][observation].to_string()
  }

  fn display_state(&self, state: &Self::State) -> String {
    let mut out = String::new();
    for y in (0..self.bottle_map.height() as i32).rev() {
      for x in 0..self.bottle_map.width() as i32 {
        let coord = Coord::new(x, y);
        if coord == state.agent_pos && !state.exited {
          out.push('A');
        } else if let Some(object) = Cellar::object_at(state, coord) {
          out.push(match state.objects[object].kind {
            ObjectKind::Crate => 'c',
            ObjectKind::Shelf => 's',
          });
        } else if let Some(bottle) = self.bottle_at(coord) {
          let entry = &state.bottles[bottle];
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

  fn fixed_state(problem: &Cellar) -> State {
    let mut rng = StdRng::seed_from_u64(0);
    problem.create_start_state(&mut rng)
  }

  #[test]
  fn action_space_layout_is_dense() {
    let problem = Cellar::five_two();
    // 4 moves, sample, 2 bottle checks, 10 object checks, 40 pushes
    assert_eq!(problem.num_actions(), 5 + 2 + 10 + 40);
    assert_eq!(problem.push_action(0, 0), 17);
    assert_eq!(problem.push_action(9, 3), problem.num_actions() - 1);
  }

  #[test]
  fn exit_needs_a_bottle() {
    let problem = Cellar::new(CellarParams {
      size: 3,
      bottles: 1,
      crates: 0,
      shelves: 0,
    });
    let mut rng = StdRng::seed_from_u64(1);
    let mut state = fixed_state(&problem);
    // walk to the east edge
    state.agent_pos = Coord::new(2, 1);
    let legal = problem.generate_legal(&state, &History::new());
    assert!(!legal.contains(Move::East as usize));
    let outcome = problem.step(&mut rng, &mut state, Move::East as usize);
    assert!(!outcome.terminal);
    assert!(outcome.reward < -1.0);

    state.collected_bottles = 1;
    let legal = problem.generate_legal(&state, &History::new());
    assert!(legal.contains(Move::East as usize));
    let outcome = problem.step(&mut rng, &mut state, Move::East as usize);
    assert!(outcome.terminal);
    assert!(outcome.reward > 0.0);
  }

  #[test]
  fn pushing_a_shelf_is_punished() {
    let problem = Cellar::five_two();
    let mut rng = StdRng::seed_from_u64(2);
    let mut state = fixed_state(&problem);
    let object = state
      .objects
      .iter()
      .position(|o| o.kind == ObjectKind::Shelf)
      .unwrap();
    let target = state.objects[object].pos;
    // stand west of the shelf and push east
    state.agent_pos = target + Coord::WEST;
    let before = target;
    let outcome = problem.step(
      &mut rng,
      &mut state,
      problem.push_action(object, Move::East as usize),
    );
    assert_eq!(state.objects[object].pos, before);
    assert!(outcome.reward <= -10.0);
  }

  #[test]
  fn pushing_a_crate_moves_it() {
    let problem = Cellar::five_two();
    let mut rng = StdRng::seed_from_u64(3);
    let mut state = fixed_state(&problem);
    // find any crate with room on its far side
    let (object, direction) = state
      .objects
      .iter()
      .enumerate()
      .filter(|(_, o)| o.kind == ObjectKind::Crate)
      .flat_map(|(ix, o)| (0..4usize).map(move |d| (ix, d, o.pos)))
      .find(|(_, d, pos)| problem.free_tile(&state, *pos + Coord::compass(*d)))
      .map(|(ix, d, _)| (ix, d))
      .unwrap();
    let before = state.objects[object].pos;
    let delta = Coord::compass(direction);
    state.agent_pos = before + Coord::new(-delta.x, -delta.y);
    let outcome = problem.step(&mut rng, &mut state, problem.push_action(object, direction));
    assert_eq!(state.objects[object].pos, before + delta);
    assert_eq!(outcome.reward, -1.0);
  }

  #[test]
  fn checking_objects_builds_assumptions() {
    let problem = Cellar::five_two();
    let mut rng = StdRng::seed_from_u64(4);
    let mut state = fixed_state(&problem);
    let object = 0;
    for _ in 0..12 {
      problem.step(&mut rng, &mut state, problem.object_check_action(object));
    }
    // a dozen close-range readings pin the type down
    assert!(state.objects[object].assumed.is_some());
  }

  #[test]
  fn potential_rises_after_certainty() {
    let problem = Cellar::five_one();
    let mut rng = StdRng::seed_from_u64(5);
    let mut state = fixed_state(&problem);
    let before = problem.potential(&state);
    for _ in 0..12 {
      problem.step(&mut rng, &mut state, problem.bottle_check_action(0));
    }
    assert!(problem.potential(&state) >= before);
  }

  #[test]
  fn pgs_prunes_redundant_checks() {
    let problem = Cellar::five_one();
    let mut rng = StdRng::seed_from_u64(6);
    let mut state = fixed_state(&problem);
    let history = History::new();
    assert!(problem
      .pgs_legal(&state, &history)
      .contains(problem.bottle_check_action(0)));
    for _ in 0..12 {
      problem.step(&mut rng, &mut state, problem.bottle_check_action(0));
    }
    assert!(!problem
      .pgs_legal(&state, &history)
      .contains(problem.bottle_check_action(0)));
  }

  #[test]
  fn search_collects_and_leaves_in_the_open_cellar() {
    let problem = Cellar::new(CellarParams {
      size: 3,
      bottles: 1,
      crates: 0,
      shelves: 0,
    });
    let params = Params {
      num_simulations: 2048,
      max_depth: 30,
      num_start_states: 100,
      exploration_constant: 20.0,
      use_pgs: true,
      ..Params::default()
    };
    let mut engine = Pomcp::new(&problem, params, StdRng::seed_from_u64(7));
    let mut world = StdRng::seed_from_u64(70);
    let mut state = problem.create_start_state(&mut world);
    state.bottles[0].valuable = true;
    let mut exited = false;
    for _ in 0..20 {
      let action = engine.select_action();
      let outcome = problem.step(&mut world, &mut state, action);
      engine.update(action, outcome.observation, outcome.reward);
      if outcome.terminal {
        exited = outcome.reward > 0.0;
        break;
      }
    }
    assert!(exited, "agent never left with the bottle");
  }
}
