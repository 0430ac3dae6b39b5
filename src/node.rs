use std::fmt;

use smallvec::SmallVec;

use crate::op::Op;

/// Index of a node in its graph's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// We have code that relies on `NodeId` fitting a bitset slot...
const _: () = {
  use std::mem::size_of;
  assert!(size_of::<NodeId>() <= size_of::<usize>())
};

impl NodeId {
  #[inline(always)]
  pub fn index(&self) -> usize {
    self.0
  }
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

pub(crate) type Operands = SmallVec<[NodeId; 2]>;

/// A single operation in the graph along with the caches the passes fill in.
///
/// Caches are stamped: `evaluated` holds the graph epoch the value was computed
/// at, `sweep` the propagation pass that last wrote the adjoint. A stamp that no
/// longer matches the graph means the cache is stale.
#[derive(Debug, Clone)]
pub struct Node {
  pub(crate) op: Op,
  pub(crate) operands: Operands,
  pub(crate) input: f64,
  pub(crate) value: f64,
  pub(crate) evaluated: Option<u64>,
  pub(crate) adjoint: f64,
  pub(crate) sweep: Option<u64>,
  pub(crate) order: Option<usize>,
}

impl Node {
  pub(crate) fn leaf(input: f64) -> Self {
    Self::new(Op::Leaf, Operands::new(), input)
  }

  pub(crate) fn apply(op: Op, operands: Operands) -> Self {
    Self::new(op, operands, 0.0)
  }

  fn new(op: Op, operands: Operands, input: f64) -> Self {
    Self {
      op,
      operands,
      input,
      value: 0.0,
      evaluated: None,
      adjoint: 0.0,
      sweep: None,
      order: None,
    }
  }

  #[inline]
  pub fn op(&self) -> Op {
    self.op
  }

  /// Operands in order, empty for a leaf
  #[inline]
  pub fn operands(&self) -> &[NodeId] {
    &self.operands
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.op == Op::Leaf
  }

  /// Raw input of a leaf; meaningless for any other kind
  #[inline]
  pub fn input(&self) -> f64 {
    self.input
  }

  /// Topological index from the most recent ordering pass that reached this node
  #[inline]
  pub fn order(&self) -> Option<usize> {
    self.order
  }

  #[inline]
  pub(crate) fn is_evaluated_at(&self, epoch: u64) -> bool {
    self.evaluated == Some(epoch)
  }
}
