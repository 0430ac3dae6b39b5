use std::fmt;

use thiserror::Error;

use crate::node::NodeId;
use crate::op::Op;

/// Which per-node cache a stale read was attempted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
  Value,
  Adjoint,
}

impl fmt::Display for CacheKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheKind::Value => f.write_str("value"),
      CacheKind::Adjoint => f.write_str("adjoint"),
    }
  }
}

/// Everything that can go wrong while building or running passes over a graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
  /// A leaf-only operation was applied to an interior node
  #[error("node {node} is a `{op}` node, not a leaf")]
  TypeMismatch { node: NodeId, op: Op },

  /// A forward rule was evaluated outside of its mathematical domain
  #[error("`{op}` is undefined at {value}")]
  Domain { op: Op, value: f64 },

  /// A cache was read before the pass that fills it ran over the current state
  #[error("{state} of node {node} is stale, run the corresponding pass first")]
  Stale { node: NodeId, state: CacheKind },

  /// An operand would not precede the node referencing it
  #[error("operand {operand} does not precede node {node}")]
  Cycle { node: NodeId, operand: NodeId },

  /// An operand handle was created by a different graph
  #[error("node {node} belongs to another graph")]
  ForeignHandle { node: NodeId },

  /// Wrong number of operands for a kind
  #[error("`{op}` takes {expected} operand(s), found {found}")]
  Arity {
    op: Op,
    expected: usize,
    found: usize,
  },
}

pub type Result<T, E = GraphError> = std::result::Result<T, E>;
