pub mod bandits;
pub mod beliefs;
pub mod render;
pub mod search;
pub mod tree;

pub use search::Pomcp;

/// Search configuration. Every knob has a default; drivers override the few
/// they sweep over.
#[derive(Clone, Debug)]
pub struct Params {
  /// simulations per `select_action` call
  pub num_simulations: u32,
  /// maximum search/rollout depth below the root
  pub max_depth: u32,
  /// target root belief size, also the per-node particle cap
  pub num_start_states: usize,
  /// UCB exploration constant; 0 means greedy on mean
  pub exploration_constant: f32,
  pub use_rave: bool,
  pub rave_constant: f32,
  pub rave_discount: f32,
  /// enable particle invigoration through `local_move`
  pub use_transforms: bool,
  /// accepted transforms per `update`
  pub num_transforms: usize,
  /// proposal budget per `update`
  pub max_attempts: usize,
  /// visits an action needs before its observation child is created
  pub expand_count: u32,
  /// promote the matching subtree on `update` instead of rebuilding
  pub reuse_tree: bool,
  /// prior pseudo-count and value given to preferred actions
  pub smart_tree_count: f32,
  pub smart_tree_value: f32,
  /// swap legal-set and rollout generators for the potential-guided variant
  pub use_pgs: bool,
  /// node slots preallocated in the recycler
  pub tree_capacity: usize,
}

impl Default for Params {
  fn default() -> Self {
    Params {
      num_simulations: 1000,
      max_depth: 100,
      num_start_states: 1000,
      exploration_constant: 1.0,
      use_rave: false,
      rave_constant: 0.01,
      rave_discount: 1.0,
      use_transforms: true,
      num_transforms: 64,
      max_attempts: 256,
      expand_count: 1,
      reuse_tree: false,
      smart_tree_count: 10.0,
      smart_tree_value: 1.0,
      use_pgs: false,
      tree_capacity: 4096,
    }
  }
}
