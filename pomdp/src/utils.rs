use std::ops::{Add, Index, IndexMut};

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Running aggregate with an optional pseudo-sample prior. The prior seeds
/// `count`/`total` but never moves the extrema.
#[derive(Clone, Debug)]
pub struct Statistic {
  count: f32,
  total: f32,
  sq_sum: f32,
  max: f32,
  min: f32,
  initial_count: f32,
  initial_value: f32,
}

impl Default for Statistic {
  fn default() -> Self {
    Statistic::new(0.0, 0.0)
  }
}

impl Statistic {
  pub fn new(initial_count: f32, initial_value: f32) -> Self {
    let mut result = Statistic {
      count: 0.0,
      total: 0.0,
      sq_sum: 0.0,
      max: f32::NEG_INFINITY,
      min: f32::INFINITY,
      initial_count,
      initial_value,
    };
    result.clear();
    result
  }

  pub fn set_prior(&mut self, count: f32, value: f32) {
    self.initial_count = count;
    self.initial_value = value;
    self.clear();
  }

  pub fn clear(&mut self) {
    self.count = self.initial_count;
    self.total = self.initial_count * self.initial_value;
    self.sq_sum = self.initial_count * self.initial_value * self.initial_value;
    self.max = f32::NEG_INFINITY;
    self.min = f32::INFINITY;
  }

  pub fn add(&mut self, x: f32) {
    self.add_weighted(x, 1.0);
  }

  pub fn add_weighted(&mut self, x: f32, weight: f32) {
    self.count += weight;
    self.total += x * weight;
    self.sq_sum += x * x * weight;
    if x > self.max {
      self.max = x;
    }
    if x < self.min {
      self.min = x;
    }
  }

  // peels one previously added sample off; extrema are not rolled back
  pub fn subtract(&mut self, x: f32) {
    self.count -= 1.0;
    self.total -= x;
    self.sq_sum -= x * x;
  }

  pub fn count(&self) -> f32 {
    self.count
  }

  pub fn total(&self) -> f32 {
    self.total
  }

  pub fn mean(&self) -> f32 {
    if self.count > 0.0 {
      self.total / self.count
    } else {
      self.initial_value
    }
  }

  pub fn variance(&self) -> f32 {
    if self.count > 0.0 {
      let mean = self.total / self.count;
      (self.sq_sum / self.count - mean * mean).max(0.0)
    } else {
      0.0
    }
  }

  pub fn max(&self) -> f32 {
    self.max
  }

  pub fn min(&self) -> f32 {
    self.min
  }
}

pub fn env_seed() -> Option<u64> {
  std::env::var("RNG_SEED")
    .ok()
    .and_then(|s| s.parse::<u64>().ok())
}

/// Seeds from `RNG_SEED` when set, system entropy otherwise.
pub fn rng_from_env() -> StdRng {
  match env_seed() {
    Some(seed) => StdRng::seed_from_u64(seed),
    None => StdRng::from_entropy(),
  }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Coord {
  pub x: i32,
  pub y: i32,
}

impl Coord {
  pub const NORTH: Coord = Coord { x: 0, y: 1 };
  pub const SOUTH: Coord = Coord { x: 0, y: -1 };
  pub const EAST: Coord = Coord { x: 1, y: 0 };
  pub const WEST: Coord = Coord { x: -1, y: 0 };

  pub fn new(x: i32, y: i32) -> Self {
    Coord { x, y }
  }

  // indexed by the conventional N/S/E/W move order
  pub fn compass(direction: usize) -> Coord {
    [Coord::NORTH, Coord::SOUTH, Coord::EAST, Coord::WEST][direction]
  }

  pub fn adjacent_neighbours(&self) -> [Coord; 4] {
    [
      *self + Coord::NORTH,
      *self + Coord::SOUTH,
      *self + Coord::EAST,
      *self + Coord::WEST,
    ]
  }

  pub fn manhattan_distance(&self, other: &Coord) -> i32 {
    (self.x - other.x).abs() + (self.y - other.y).abs()
  }

  pub fn euclidean_distance(&self, other: &Coord) -> f32 {
    let dx = (self.x - other.x) as f32;
    let dy = (self.y - other.y) as f32;
    (dx * dx + dy * dy).sqrt()
  }
}

impl Add for Coord {
  type Output = Coord;
  fn add(self, rhs: Self) -> Self::Output {
    Coord {
      x: self.x + rhs.x,
      y: self.y + rhs.y,
    }
  }
}

#[derive(Clone, Debug, Serialize)]
pub struct Grid<T> {
  width: usize,
  height: usize,
  cells: Vec<T>,
}

impl<T: Clone> Grid<T> {
  pub fn new(width: usize, height: usize, value: T) -> Self {
    Grid {
      width,
      height,
      cells: vec![value; width * height],
    }
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn inside(&self, coord: Coord) -> bool {
    coord.x >= 0
      && coord.y >= 0
      && (coord.x as usize) < self.width
      && (coord.y as usize) < self.height
  }
}

impl<T> Index<Coord> for Grid<T> {
  type Output = T;
  fn index(&self, index: Coord) -> &Self::Output {
    &self.cells[index.y as usize * self.width + index.x as usize]
  }
}

impl<T> IndexMut<Coord> for Grid<T> {
  fn index_mut(&mut self, index: Coord) -> &mut Self::Output {
    &mut self.cells[index.y as usize * self.width + index.x as usize]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn statistic_prior_and_mean() {
    let mut s = Statistic::new(2.0, 5.0);
    assert_eq!(s.mean(), 5.0);
    assert_eq!(s.count(), 2.0);
    s.add(8.0);
    assert_eq!(s.count(), 3.0);
    assert!((s.mean() - 6.0).abs() < 1e-6);
    // priors never move the extrema
    assert_eq!(s.max(), 8.0);
    assert_eq!(s.min(), 8.0);
  }

  #[test]
  fn statistic_subtract_undoes_add() {
    let mut s = Statistic::default();
    s.add(3.0);
    s.add(7.0);
    s.subtract(7.0);
    assert_eq!(s.count(), 1.0);
    assert!((s.mean() - 3.0).abs() < 1e-6);
  }

  #[test]
  fn grid_bounds() {
    let g = Grid::new(3, 2, 0u8);
    assert!(g.inside(Coord::new(2, 1)));
    assert!(!g.inside(Coord::new(3, 1)));
    assert!(!g.inside(Coord::new(0, -1)));
  }

  proptest::proptest! {
    #[test]
    fn statistic_stays_consistent(samples in proptest::collection::vec(-100.0f32..100.0, 1..64)) {
      let mut s = Statistic::default();
      for x in &samples {
        s.add(*x);
      }
      proptest::prop_assert!((s.mean() * s.count() - s.total()).abs() < 1e-2);
      proptest::prop_assert!(s.max() >= s.mean() - 1e-3);
      proptest::prop_assert!(s.min() <= s.mean() + 1e-3);
      proptest::prop_assert!(s.variance() >= 0.0);
    }
  }
}
