//!
//! Reverse pass.
//!
//! Nodes are processed in strictly decreasing topological index. Every parent of
//! a node has a larger index than the node, so by the time a node pushes its
//! adjoint to its operands, every parent has already pushed into it. A naive
//! pre-order or breadth-first walk gives no such guarantee once a node has more
//! than one parent.
//!

use log::{debug, trace};
use smallvec::SmallVec;

use crate::error::{CacheKind, GraphError, Result};
use crate::graph::{Graph, Handle, Sweep};
use crate::order::Orderer;

/// Where a propagator is in its pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
  #[default]
  Idle,
  Resetting,
  Seeded,
  Propagating,
  Done,
}

#[derive(Debug, Default)]
pub struct Propagator {
  phase: Phase,
  orderer: Orderer,
}

impl Propagator {
  pub fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub fn phase(&self) -> Phase {
    self.phase
  }

  /// Accumulate d(root)/d(node) into every node `root` depends on.
  ///
  /// Requires every such node to hold a value from the current epoch; if one
  /// does not, nothing is modified and the propagator stays idle.
  pub fn run(&mut self, graph: &Graph, root: Handle<'_>) -> Result<()> {
    self.phase = Phase::Idle;
    let sequence = self.orderer.sequence(graph, root)?;
    let root = root.id();
    let epoch = graph.epoch();

    {
      let nodes = graph.nodes();
      if let Some(id) = sequence.iter().find(|id| !nodes[id.0].is_evaluated_at(epoch)) {
        return Err(GraphError::Stale {
          node: *id,
          state: CacheKind::Value,
        });
      }
    }
    Orderer::commit(graph, &sequence);

    let mut nodes = graph.nodes_mut();

    self.phase = Phase::Resetting;
    for id in &sequence {
      nodes[id.0].adjoint = 0.0;
    }

    self.phase = Phase::Seeded;
    nodes[root.0].adjoint = 1.0;

    self.phase = Phase::Propagating;
    let mut args: SmallVec<[f64; 2]> = SmallVec::new();
    for (order, id) in sequence.iter().enumerate().rev() {
      let node = &nodes[id.0];
      let (op, adjoint, operands) = (node.op, node.adjoint, node.operands.clone());
      if node.is_leaf() {
        trace!("accumulated leaf {order} adjoint = {adjoint}");
        continue;
      }
      trace!("propagating node {order} adjoint = {adjoint}");

      args.clear();
      args.extend(operands.iter().map(|operand| nodes[operand.0].value));
      let contributions = op.pullback(&args, adjoint);
      // the same operand may appear twice (x * x), each slot contributes
      for (operand, contribution) in operands.iter().zip(contributions) {
        nodes[operand.0].adjoint += contribution;
      }
    }

    let sweep = Sweep {
      id: graph.next_sweep(),
      epoch,
    };
    for id in &sequence {
      nodes[id.0].sweep = Some(sweep.id);
    }
    graph.complete_sweep(sweep);
    self.phase = Phase::Done;

    debug!("propagated {} nodes from {root}, sweep {}", sequence.len(), sweep.id);
    Ok(())
  }
}
