use fixedbitset::FixedBitSet;
use rand::rngs::StdRng;

pub mod history;
pub mod utils;

pub use history::History;

/// One transition of the generative model.
#[derive(Clone, Copy, Debug)]
pub struct StepOutcome {
  pub observation: usize,
  pub reward: f32,
  pub terminal: bool,
}

/// The contract a domain implements to be searchable. Actions and
/// observations are dense non-negative indices; the action space is fixed,
/// observation children are created sparsely by the engine. The engine never
/// looks inside `State`: it only clones, steps and drops the states it
/// owns, with every random draw going through the RNG it threads in.
pub trait Simulator {
  type State: Clone;

  fn num_actions(&self) -> usize;
  fn num_observations(&self) -> usize;

  fn discount(&self) -> f32 {
    1.0
  }

  // upper bound on |reward|, the conventional scale for exploration
  fn reward_range(&self) -> f32 {
    1.0
  }

  /// Sample a hidden state from the prior.
  fn create_start_state(&self, rng: &mut StdRng) -> Self::State;

  /// Advance `state` in place.
  fn step(&self, rng: &mut StdRng, state: &mut Self::State, action: usize) -> StepOutcome;

  /// Domain-level sanity check; only consulted in debug builds.
  fn validate(&self, _state: &Self::State) -> bool {
    true
  }

  /// Actions worth considering in `state`. The default is the full action
  /// space; an empty mask is treated the same way by callers.
  fn generate_legal(&self, _state: &Self::State, _history: &History) -> FixedBitSet {
    full_mask(self.num_actions())
  }

  /// Rollout bias; empty means no preference.
  fn generate_preferred(&self, _state: &Self::State, _history: &History) -> FixedBitSet {
    FixedBitSet::with_capacity(self.num_actions())
  }

  /// Mutate `state` into another hidden state consistent with `history`,
  /// returning whether the proposal is acceptable. Drives particle
  /// invigoration; the default accepts nothing.
  fn local_move(
    &self,
    _rng: &mut StdRng,
    _state: &mut Self::State,
    _history: &History,
    _last_observation: usize,
  ) -> bool {
    false
  }

  // PGS hooks. The engine only calls these when its PGS option is set.

  /// State potential used by PGS rollouts in place of environment reward.
  fn potential(&self, _state: &Self::State) -> f32 {
    0.0
  }

  /// Legal set with certainly-harmful actions pruned.
  fn pgs_legal(&self, state: &Self::State, history: &History) -> FixedBitSet {
    self.generate_legal(state, history)
  }

  // display contract, optional for correctness

  fn action_name(&self, action: usize) -> String {
    format!("a{action}")
  }

  fn observation_name(&self, observation: usize) -> String {
    format!("o{observation}")
  }

  fn display_state(&self, _state: &Self::State) -> String {
    String::new()
  }
}

pub fn full_mask(len: usize) -> FixedBitSet {
  let mut mask = FixedBitSet::with_capacity(len);
  mask.insert_range(..);
  mask
}
