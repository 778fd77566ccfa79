use std::collections::BTreeMap;

use pomdp::utils::Statistic;

use crate::beliefs::Belief;

// An arena of VNode slots addressed by handle, with a free list so that
// re-rooting returns whole subtrees to the pool instead of allocating.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VNodeId(pub(crate) usize);

/// Per-action node. `children` is sparse: observation slots appear on first
/// visit.
pub struct QNode {
  pub(crate) value: Statistic,
  pub(crate) amaf: Statistic,
  pub(crate) children: BTreeMap<usize, VNodeId>,
}

impl QNode {
  fn new() -> Self {
    QNode {
      value: Statistic::default(),
      amaf: Statistic::default(),
      children: BTreeMap::new(),
    }
  }

  fn reset(&mut self) {
    self.value.set_prior(0.0, 0.0);
    self.amaf.set_prior(0.0, 0.0);
    self.children.clear();
  }

  pub fn value(&self) -> &Statistic {
    &self.value
  }

  pub fn amaf(&self) -> &Statistic {
    &self.amaf
  }

  pub fn child(&self, observation: usize) -> Option<VNodeId> {
    self.children.get(&observation).copied()
  }

  pub fn children(&self) -> &BTreeMap<usize, VNodeId> {
    &self.children
  }
}

/// Observation/belief node: one QNode per action in the full action space,
/// plus the particles supporting this history.
pub struct VNode<S> {
  pub(crate) value: Statistic,
  pub(crate) belief: Belief<S>,
  pub(crate) qnodes: Vec<QNode>,
}

impl<S: Clone> VNode<S> {
  fn empty() -> Self {
    VNode {
      value: Statistic::default(),
      belief: Belief::new(),
      qnodes: vec![],
    }
  }

  pub fn value(&self) -> &Statistic {
    &self.value
  }

  pub fn belief(&self) -> &Belief<S> {
    &self.belief
  }

  pub fn qnodes(&self) -> &[QNode] {
    &self.qnodes
  }

  pub fn qnode(&self, action: usize) -> &QNode {
    &self.qnodes[action]
  }
}

pub struct Tree<S> {
  slots: Vec<VNode<S>>,
  free: Vec<VNodeId>,
}

impl<S: Clone> Tree<S> {
  pub fn new(capacity: usize) -> Self {
    let mut tree = Tree {
      slots: Vec::with_capacity(capacity),
      free: Vec::with_capacity(capacity),
    };
    for ix in 0..capacity {
      tree.slots.push(VNode::empty());
      tree.free.push(VNodeId(ix));
    }
    tree
  }

  /// Pull a slot from the recycler (growing the arena if it is drained) and
  /// size its QNode array to the action space. Statistic priors are the
  /// caller's job.
  pub fn allocate(&mut self, num_actions: usize) -> VNodeId {
    let id = match self.free.pop() {
      Some(id) => id,
      None => {
        self.slots.push(VNode::empty());
        VNodeId(self.slots.len() - 1)
      }
    };
    let node = &mut self.slots[id.0];
    node.value.set_prior(0.0, 0.0);
    node.belief.clear();
    node.qnodes.resize_with(num_actions, QNode::new);
    for qnode in node.qnodes.iter_mut() {
      qnode.reset();
    }
    id
  }

  /// Post-order walk releasing `id` and everything below it: particles are
  /// dropped, slots go back on the free list. Detach `id` from its parent
  /// before calling.
  pub fn free_subtree(&mut self, id: VNodeId) {
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
      let node = &mut self.slots[current.0];
      node.belief.clear();
      for qnode in node.qnodes.iter_mut() {
        for (_, child) in std::mem::take(&mut qnode.children) {
          stack.push(child);
        }
      }
      self.free.push(current);
    }
  }

  pub fn node(&self, id: VNodeId) -> &VNode<S> {
    &self.slots[id.0]
  }

  pub fn node_mut(&mut self, id: VNodeId) -> &mut VNode<S> {
    &mut self.slots[id.0]
  }

  /// Slots currently holding live nodes.
  pub fn live_count(&self) -> usize {
    self.slots.len() - self.free.len()
  }
}
