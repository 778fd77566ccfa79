use crate::tree::VNode;

// Priors that keep an action out of UCB selection entirely. Illegal actions
// are excluded by burying them under a huge pseudo-count with a value no
// bonus can recover from.
pub(crate) const ILLEGAL_COUNT: f32 = 1.0e6;
pub(crate) const ILLEGAL_VALUE: f32 = -1.0e10;

/// UCB1 selection over the QNodes of a single VNode, with optional
/// all-moves-as-first mixing.
#[derive(Clone, Copy)]
pub struct UcbRule {
  pub exploration: f32,
  pub use_rave: bool,
  pub rave_constant: f32,
}

impl UcbRule {
  /// Unvisited actions win in declaration order; otherwise the argmax of
  /// mean plus exploration bonus, ties to the lowest action index. A zero
  /// exploration constant degrades to pure greedy on mean.
  pub fn select<S: Clone>(&self, vnode: &VNode<S>) -> usize {
    let log_n = (vnode.value().count() + 1.0).ln();
    let mut best_score = f32::NEG_INFINITY;
    let mut best_action = 0;
    for (action, qnode) in vnode.qnodes().iter().enumerate() {
      let n = qnode.value().count();
      if n == 0.0 && self.exploration > 0.0 {
        return action;
      }
      let mut q = qnode.value().mean();
      if self.use_rave && qnode.amaf().count() > 0.0 {
        let n_amaf = qnode.amaf().count();
        let beta = n_amaf / (n + n_amaf + self.rave_constant * n * n_amaf);
        q = (1.0 - beta) * q + beta * qnode.amaf().mean();
      }
      if self.exploration > 0.0 && n > 0.0 {
        q += self.exploration * (log_n / n).sqrt();
      }
      if q > best_score {
        best_score = q;
        best_action = action;
      }
    }
    best_action
  }
}
