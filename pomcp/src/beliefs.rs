use std::ops::Index;

use rand::{rngs::StdRng, Rng};

/// Unordered multiset of hidden-state particles. The belief owns its
/// particles; dropping it (or `clear`) releases them. Sampling is uniform
/// with replacement.
pub struct Belief<S> {
  particles: Vec<S>,
}

impl<S> Default for Belief<S> {
  fn default() -> Self {
    Belief { particles: vec![] }
  }
}

impl<S: Clone> Belief<S> {
  pub fn new() -> Self {
    Belief { particles: vec![] }
  }

  pub fn add_sample(&mut self, state: S) {
    self.particles.push(state);
  }

  pub fn len(&self) -> usize {
    self.particles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.particles.is_empty()
  }

  pub fn sample(&self, rng: &mut StdRng) -> &S {
    &self.particles[rng.gen_range(0..self.particles.len())]
  }

  /// Fresh particle cloned from a uniform draw.
  pub fn create_sample(&self, rng: &mut StdRng) -> S {
    self.sample(rng).clone()
  }

  /// Takes ownership of every particle in `other`.
  pub fn move_from(&mut self, other: &mut Belief<S>) {
    self.particles.append(&mut other.particles);
  }

  pub fn truncate(&mut self, len: usize) {
    self.particles.truncate(len);
  }

  pub fn clear(&mut self) {
    self.particles.clear();
  }
}

impl<S> Index<usize> for Belief<S> {
  type Output = S;
  fn index(&self, index: usize) -> &Self::Output {
    &self.particles[index]
  }
}
