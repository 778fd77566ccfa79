use fixedbitset::FixedBitSet;
use log::{debug, warn};
use pomdp::{full_mask, History, Simulator};
use rand::{rngs::StdRng, Rng};

use crate::{
  bandits::{UcbRule, ILLEGAL_COUNT, ILLEGAL_VALUE},
  beliefs::Belief,
  tree::{Tree, VNodeId},
  Params,
};

/// The planner. Owns the tree, the root belief, the episode history and the
/// random source; the simulator is only ever read. One engine instance
/// drives one episode: alternate `select_action` and `update`.
pub struct Pomcp<'a, P: Simulator> {
  problem: &'a P,
  params: Params,
  ucb: UcbRule,
  tree: Tree<P::State>,
  root: VNodeId,
  history: History,
  rng: StdRng,
  // history length when the simulation in flight started
  sim_base: usize,
}

impl<'a, P: Simulator> Pomcp<'a, P> {
  pub fn new(problem: &'a P, params: Params, rng: StdRng) -> Self {
    let ucb = UcbRule {
      exploration: params.exploration_constant,
      use_rave: params.use_rave,
      rave_constant: params.rave_constant,
    };
    let tree = Tree::new(params.tree_capacity);
    let mut engine = Pomcp {
      problem,
      params,
      ucb,
      tree,
      root: VNodeId(0),
      history: History::new(),
      rng,
      sim_base: 0,
    };
    let state = engine.problem.create_start_state(&mut engine.rng);
    engine.root = engine.expand_node(&state);
    engine.tree.node_mut(engine.root).belief.add_sample(state);
    while engine.tree.node(engine.root).belief.len() < engine.params.num_start_states {
      let particle = engine.problem.create_start_state(&mut engine.rng);
      engine.tree.node_mut(engine.root).belief.add_sample(particle);
    }
    engine
  }

  pub fn params(&self) -> &Params {
    &self.params
  }

  pub fn history(&self) -> &History {
    &self.history
  }

  pub fn tree(&self) -> &Tree<P::State> {
    &self.tree
  }

  pub fn root(&self) -> VNodeId {
    self.root
  }

  /// Run the configured simulation budget and answer the root action with
  /// the best mean. Always returns a legal action: with no visited child it
  /// falls back to a uniformly random legal action.
  pub fn select_action(&mut self) -> usize {
    for _ in 0..self.params.num_simulations {
      self.run_single_simulation();
    }
    self.best_action()
  }

  /// One simulation from a particle drawn from the root belief. Exposed so
  /// callers with a wall-clock budget can loop over it themselves.
  pub fn run_single_simulation(&mut self) {
    self.sim_base = self.history.len();
    let mut state = if self.tree.node(self.root).belief.is_empty() {
      self.problem.create_start_state(&mut self.rng)
    } else {
      self.tree.node(self.root).belief.create_sample(&mut self.rng)
    };
    debug_assert!(self.problem.validate(&state));
    self.simulate_v(&mut state, self.root, 0);
    self.history.truncate(self.sim_base);
  }

  /// Advance the engine past the transition the agent actually took.
  /// Promotes the matching child when tree reuse is on, rebuilds the root
  /// otherwise (always on an unseen observation), then refreshes the
  /// belief. Never fails.
  pub fn update(&mut self, action: usize, observation: usize, reward: f32) {
    debug!(
      "update: action {} observation {} reward {}",
      action, observation, reward
    );
    self.history.add(action, observation);

    let child = self.tree.node(self.root).qnodes[action].child(observation);
    if let (Some(id), true) = (child, self.params.reuse_tree) {
      self
        .tree
        .node_mut(self.root)
        .qnodes[action]
        .children
        .remove(&observation);
      self.tree.free_subtree(self.root);
      self.root = id;
    } else {
      if child.is_none() {
        debug!("observation {} unseen in tree, rebuilding root", observation);
      }
      let mut salvaged = Belief::new();
      if let Some(id) = child {
        salvaged = std::mem::take(&mut self.tree.node_mut(id).belief);
      }
      self.tree.free_subtree(self.root);
      let state = if salvaged.is_empty() {
        self.problem.create_start_state(&mut self.rng)
      } else {
        salvaged.create_sample(&mut self.rng)
      };
      let new_root = self.expand_node(&state);
      self.tree.node_mut(new_root).belief.move_from(&mut salvaged);
      self.root = new_root;
    }
    self.invigorate();
  }

  fn simulate_v(&mut self, state: &mut P::State, vnode: VNodeId, depth: u32) -> f32 {
    if depth >= self.params.max_depth {
      return 0.0;
    }
    // stow particles one step below the root so the next update has a
    // belief to promote
    if depth == 1 && self.tree.node(vnode).belief.len() < self.params.num_start_states {
      self.tree.node_mut(vnode).belief.add_sample(state.clone());
    }
    let action = self.ucb.select(self.tree.node(vnode));
    let total = self.simulate_q(state, vnode, action, depth);
    self.tree.node_mut(vnode).value.add(total);
    if self.params.use_rave {
      self.add_rave(vnode, total, depth);
    }
    total
  }

  fn simulate_q(&mut self, state: &mut P::State, vnode: VNodeId, action: usize, depth: u32) -> f32 {
    let outcome = self.problem.step(&mut self.rng, state, action);
    debug_assert!(outcome.observation < self.problem.num_observations());
    self.history.add(action, outcome.observation);

    let mut child = self.tree.node(vnode).qnodes[action].child(outcome.observation);
    if child.is_none()
      && !outcome.terminal
      && self.tree.node(vnode).qnodes[action].value.count() >= self.params.expand_count as f32
    {
      let id = self.expand_node(state);
      self
        .tree
        .node_mut(vnode)
        .qnodes[action]
        .children
        .insert(outcome.observation, id);
      child = Some(id);
    }

    let delayed = if outcome.terminal {
      0.0
    } else {
      match child {
        Some(id) => self.simulate_v(state, id, depth + 1),
        None => self.rollout(state, depth + 1),
      }
    };
    let total = outcome.reward + self.problem.discount() * delayed;
    self.tree.node_mut(vnode).qnodes[action].value.add(total);
    total
  }

  // credit every action taken at or below this node during the simulation
  // in flight, fading by rave_discount per step
  fn add_rave(&mut self, vnode: VNodeId, total: f32, depth: u32) {
    let mut discount = 1.0;
    for t in (self.sim_base + depth as usize)..self.history.len() {
      let action = self.history[t].action;
      let node = self.tree.node_mut(vnode);
      if action < node.qnodes.len() {
        node.qnodes[action].amaf.add_weighted(total, discount);
      }
      discount *= self.params.rave_discount;
    }
  }

  fn rollout(&mut self, state: &mut P::State, start_depth: u32) -> f32 {
    let mut total = 0.0;
    let mut discount = 1.0;
    let mut prev_potential = if self.params.use_pgs {
      self.problem.potential(state)
    } else {
      0.0
    };
    let mut depth = start_depth;
    while depth < self.params.max_depth {
      let action = self.rollout_action(state);
      let outcome = self.problem.step(&mut self.rng, state, action);
      self.history.add(action, outcome.observation);
      let reward = if self.params.use_pgs {
        // potential delta replaces the environment reward
        let potential = self.problem.potential(state);
        let delta = potential - prev_potential;
        prev_potential = potential;
        delta
      } else {
        outcome.reward
      };
      total += discount * reward;
      if outcome.terminal {
        break;
      }
      discount *= self.problem.discount();
      depth += 1;
    }
    total
  }

  fn rollout_action(&mut self, state: &P::State) -> usize {
    let preferred = self.problem.generate_preferred(state, &self.history);
    if preferred.count_ones(..) > 0 {
      return pick_uniform(&preferred, &mut self.rng);
    }
    let legal = self.legal_mask(state);
    pick_uniform(&legal, &mut self.rng)
  }

  /// New VNode for `state`: one QNode per action, with priors encoding the
  /// legal and preferred sets. Illegal actions are buried so selection
  /// never reaches them; preferred actions start from the smart-tree
  /// pseudo-sample.
  fn expand_node(&mut self, state: &P::State) -> VNodeId {
    let num_actions = self.problem.num_actions();
    let id = self.tree.allocate(num_actions);
    let legal = self.legal_mask(state);
    let preferred = self.problem.generate_preferred(state, &self.history);
    let node = self.tree.node_mut(id);
    for action in 0..num_actions {
      let qnode = &mut node.qnodes[action];
      if !legal.contains(action) {
        qnode.value.set_prior(ILLEGAL_COUNT, ILLEGAL_VALUE);
        qnode.amaf.set_prior(ILLEGAL_COUNT, ILLEGAL_VALUE);
      } else if preferred.contains(action) {
        qnode
          .value
          .set_prior(self.params.smart_tree_count, self.params.smart_tree_value);
        qnode
          .amaf
          .set_prior(self.params.smart_tree_count, self.params.smart_tree_value);
      } else {
        qnode.value.set_prior(0.0, 0.0);
        qnode.amaf.set_prior(0.0, 0.0);
      }
    }
    id
  }

  /// Root action with the best mean among visited children (ties: visit
  /// count, then index). Callers looping `run_single_simulation` under a
  /// wall clock use this for the final recommendation.
  pub fn best_action(&mut self) -> usize {
    let root = self.tree.node(self.root);
    let mut best: Option<(f32, f32, usize)> = None;
    for (action, qnode) in root.qnodes().iter().enumerate() {
      let count = qnode.value().count();
      let mean = qnode.value().mean();
      if count <= 0.0 || count >= ILLEGAL_COUNT {
        continue;
      }
      let better = match best {
        None => true,
        Some((best_mean, best_count, _)) => {
          mean > best_mean || (mean == best_mean && count > best_count)
        }
      };
      if better {
        best = Some((mean, count, action));
      }
    }
    match best {
      Some((_, _, action)) => action,
      None => self.random_legal_action(),
    }
  }

  fn random_legal_action(&mut self) -> usize {
    let state = if self.tree.node(self.root).belief.is_empty() {
      self.problem.create_start_state(&mut self.rng)
    } else {
      self.tree.node(self.root).belief.create_sample(&mut self.rng)
    };
    let legal = self.legal_mask(&state);
    pick_uniform(&legal, &mut self.rng)
  }

  fn legal_mask(&self, state: &P::State) -> FixedBitSet {
    let mask = if self.params.use_pgs {
      self.problem.pgs_legal(state, &self.history)
    } else {
      self.problem.generate_legal(state, &self.history)
    };
    // an empty legal set falls back to the full action space
    if mask.count_ones(..) == 0 {
      full_mask(self.problem.num_actions())
    } else {
      mask
    }
  }

  /// Refill the root belief toward its target size: bounded local-move
  /// proposals first, start-state resampling if the belief is empty.
  fn invigorate(&mut self) {
    let target = self.params.num_start_states;
    self.tree.node_mut(self.root).belief.truncate(target);
    if self.params.use_transforms {
      let mut attempts = 0;
      let mut added = 0;
      while self.tree.node(self.root).belief.len() < target
        && added < self.params.num_transforms
        && attempts < self.params.max_attempts
      {
        attempts += 1;
        if let Some(particle) = self.create_transform() {
          self.tree.node_mut(self.root).belief.add_sample(particle);
          added += 1;
        }
      }
    }
    if self.tree.node(self.root).belief.is_empty() {
      warn!(
        "belief exhausted after {} steps, resampling from the prior",
        self.history.len()
      );
      while self.tree.node(self.root).belief.len() < target {
        let state = self.problem.create_start_state(&mut self.rng);
        self.tree.node_mut(self.root).belief.add_sample(state);
      }
    }
  }

  fn create_transform(&mut self) -> Option<P::State> {
    let last = *self.history.back()?;
    if self.tree.node(self.root).belief.is_empty() {
      return None;
    }
    let mut state = self.tree.node(self.root).belief.create_sample(&mut self.rng);
    if self
      .problem
      .local_move(&mut self.rng, &mut state, &self.history, last.observation)
    {
      debug_assert!(self.problem.validate(&state));
      Some(state)
    } else {
      None
    }
  }
}

fn pick_uniform(mask: &FixedBitSet, rng: &mut StdRng) -> usize {
  let k = rng.gen_range(0..mask.count_ones(..));
  mask.ones().nth(k).unwrap()
}
