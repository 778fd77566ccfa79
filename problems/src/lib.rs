use std::collections::BTreeMap;

use fixedbitset::FixedBitSet;
use pomdp::{History, Simulator, StepOutcome};
use rand::{
  distributions::{Distribution, WeightedIndex},
  rngs::StdRng,
};

struct ActionDef {
  weights: Vec<f32>,
  next_state_id: Vec<usize>,
  observation_id: Vec<usize>,
  reward: Vec<f32>,
}

struct StateDef {
  outgoing_actions: BTreeMap<usize, ActionDef>,
}

/// Tabular POMDP over integer states with explicit weighted transitions.
/// A state with no outgoing transitions is terminal; stepping one anyway
/// yields a zero-reward terminal outcome, so the model is total.
pub struct StaticPomdp {
  action_count: usize,
  observation_count: usize,
  discount: f32,
  reward_range: f32,
  states: Vec<StateDef>,
  start_weights: Vec<f32>,
}

impl StaticPomdp {
  pub fn new(
    state_count: usize,
    action_count: usize,
    observation_count: usize,
    start_weights: Vec<f32>,
    discount: f32,
    reward_range: f32,
  ) -> Self {
    let mut result = StaticPomdp {
      action_count,
      observation_count,
      discount,
      reward_range,
      states: Vec::with_capacity(state_count),
      start_weights,
    };
    for _ in 0..state_count {
      result.states.push(StateDef {
        outgoing_actions: BTreeMap::new(),
      });
    }
    result
  }

  pub fn add_transition(
    &mut self,
    si: usize,
    action: usize,
    sj: usize,
    observation: usize,
    reward: f32,
    weight: f32,
  ) {
    assert!(action < self.action_count, "invalid action");
    assert!(observation < self.observation_count, "invalid observation");
    let entry = self.states[si]
      .outgoing_actions
      .entry(action)
      .or_insert_with(|| ActionDef {
        weights: vec![],
        next_state_id: vec![],
        observation_id: vec![],
        reward: vec![],
      });
    entry.weights.push(weight);
    entry.next_state_id.push(sj);
    entry.observation_id.push(observation);
    entry.reward.push(reward);
  }
}

impl Simulator for StaticPomdp {
  type State = usize;

  fn num_actions(&self) -> usize {
    self.action_count
  }

  fn num_observations(&self) -> usize {
    self.observation_count
  }

  fn discount(&self) -> f32 {
    self.discount
  }

  fn reward_range(&self) -> f32 {
    self.reward_range
  }

  fn create_start_state(&self, rng: &mut StdRng) -> Self::State {
    let wi = WeightedIndex::new(&self.start_weights).unwrap();
    wi.sample(rng)
  }

  fn step(&self, rng: &mut StdRng, state: &mut Self::State, action: usize) -> StepOutcome {
    match self.states[*state].outgoing_actions.get(&action) {
      None => StepOutcome {
        observation: 0,
        reward: 0.0,
        terminal: true,
      },
      Some(transitions) => {
        let wi = WeightedIndex::new(&transitions.weights).unwrap();
        let index = wi.sample(rng);
        *state = transitions.next_state_id[index];
        StepOutcome {
          observation: transitions.observation_id[index],
          reward: transitions.reward[index],
          terminal: self.states[*state].outgoing_actions.is_empty(),
        }
      }
    }
  }

  fn validate(&self, state: &Self::State) -> bool {
    *state < self.states.len()
  }

  fn generate_legal(&self, state: &Self::State, _history: &History) -> FixedBitSet {
    let mut mask = FixedBitSet::with_capacity(self.action_count);
    for action in self.states[*state].outgoing_actions.keys() {
      mask.insert(*action);
    }
    mask
  }
}

/// Two arms, one step: arm 1 pays `reward1`, arm 0 pays `reward0`.
pub fn two_armed_bandit(reward0: f32, reward1: f32) -> StaticPomdp {
  let range = reward0.abs().max(reward1.abs()).max(1.0);
  let mut m = StaticPomdp::new(2, 2, 1, vec![1.0, 0.0], 1.0, range);
  m.add_transition(0, 0, 1, 0, reward0, 1.0);
  m.add_transition(0, 1, 1, 0, reward1, 1.0);
  m
}

/// Every action ends the episode immediately with the same bonus.
pub fn terminal_bonus(reward: f32) -> StaticPomdp {
  let mut m = StaticPomdp::new(2, 2, 1, vec![1.0, 0.0], 1.0, reward.abs().max(1.0));
  m.add_transition(0, 0, 1, 0, reward, 1.0);
  m.add_transition(0, 1, 1, 0, reward, 1.0);
  m
}

/// Small two-hypothesis chain: the hidden branch is fixed at the start and
/// only the third step reveals which branch pays.
pub fn hidden_chain() -> StaticPomdp {
  let mut s_prob = vec![0.0; 10];
  s_prob[0] = 0.5;
  s_prob[5] = 0.5;
  let mut m = StaticPomdp::new(10, 5, 5, s_prob, 1.0, 1.0);
  m.add_transition(0, 1, 1, 0, 0.0, 1.0);
  m.add_transition(0, 2, 2, 0, 0.5, 1.0);
  m.add_transition(1, 3, 3, 1, -1.0, 1.0);
  m.add_transition(1, 4, 4, 2, 1.0, 1.0);
  m.add_transition(5, 1, 6, 0, 0.0, 1.0);
  m.add_transition(5, 2, 7, 0, 0.5, 1.0);
  m.add_transition(6, 3, 8, 3, 1.0, 1.0);
  m.add_transition(6, 4, 9, 4, -1.0, 1.0);
  m
}
