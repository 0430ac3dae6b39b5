//!
//! Depth-first and breadth-first walks over a node arena.
//!
//! The visited marker lives on the `Walker`, not on the nodes, and is only ever
//! cleared by `Walker::reset`. Reusing a walker without a reset skips every node
//! the previous walk reached.
//!

use std::collections::VecDeque;

use bit_set::BitSet;

use crate::error::Result;
use crate::node::{Node, NodeId};

/// A unit of work applied to one node during a walk
pub trait Visitor {
  fn visit(&mut self, id: NodeId, node: &Node) -> Result<()>;
}

impl<F> Visitor for F
where
  F: FnMut(NodeId, &Node) -> Result<()>,
{
  #[inline]
  fn visit(&mut self, id: NodeId, node: &Node) -> Result<()> {
    self(id, node)
  }
}

/// Order in which a walk reaches nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
  /// Operands first, each node once; yields a topological order
  PostOrder,
  /// Node first, then operands; a shared node is visited once per path
  PreOrder,
  /// Node first, then operands level by level, each node once
  BreadthFirst,
}

#[derive(Debug, Default)]
pub struct Walker {
  visited: BitSet,
  stack: Vec<(NodeId, bool)>,
  pending: Vec<NodeId>,
  queue: VecDeque<NodeId>,
}

impl Walker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Forget every node marked by previous walks
  #[inline]
  pub fn reset(&mut self) {
    self.visited.clear();
  }

  #[inline]
  pub fn is_visited(&self, id: NodeId) -> bool {
    self.visited.contains(id.0)
  }

  pub fn walk<V>(
    &mut self,
    traversal: Traversal,
    nodes: &[Node],
    root: NodeId,
    visitor: &mut V,
  ) -> Result<()>
  where
    V: Visitor + ?Sized,
  {
    match traversal {
      Traversal::PostOrder => self.post_order(nodes, root, visitor),
      Traversal::PreOrder => self.pre_order(nodes, root, visitor),
      Traversal::BreadthFirst => self.breadth_first(nodes, root, visitor),
    }
  }

  pub fn post_order<V>(&mut self, nodes: &[Node], root: NodeId, visitor: &mut V) -> Result<()>
  where
    V: Visitor + ?Sized,
  {
    self.stack.clear();
    self.stack.push((root, false));

    // linear dfs so long chains cannot blow the call stack...
    while let Some((id, expanded)) = self.stack.pop() {
      if expanded {
        visitor.visit(id, &nodes[id.0])?;
      } else if self.visited.insert(id.0) {
        // marker to visit the node after its operands
        self.stack.push((id, true));
        // pushed in reverse so operand 0 is expanded first, order matters...
        for operand in nodes[id.0].operands.iter().rev() {
          if !self.visited.contains(operand.0) {
            self.stack.push((*operand, false));
          }
        }
      }
    }

    Ok(())
  }

  /// Unguarded: cost grows with the number of paths, not nodes
  pub fn pre_order<V>(&mut self, nodes: &[Node], root: NodeId, visitor: &mut V) -> Result<()>
  where
    V: Visitor + ?Sized,
  {
    self.pending.clear();
    self.pending.push(root);

    while let Some(id) = self.pending.pop() {
      let node = &nodes[id.0];
      visitor.visit(id, node)?;
      self.pending.extend(node.operands.iter().rev());
    }

    Ok(())
  }

  pub fn breadth_first<V>(&mut self, nodes: &[Node], root: NodeId, visitor: &mut V) -> Result<()>
  where
    V: Visitor + ?Sized,
  {
    self.queue.clear();
    if self.visited.insert(root.0) {
      self.queue.push_back(root);
    }

    while let Some(id) = self.queue.pop_front() {
      let node = &nodes[id.0];
      visitor.visit(id, node)?;
      for operand in &node.operands {
        if self.visited.insert(operand.0) {
          self.queue.push_back(*operand);
        }
      }
    }

    Ok(())
  }
}
