use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::ptr;

use log::{debug, trace};

use crate::adjoint::Propagator;
use crate::error::{CacheKind, GraphError, Result};
use crate::evaluate::Evaluator;
use crate::node::{Node, NodeId, Operands};
use crate::op::Op;
use crate::order::{Orderer, Program};
use crate::traverse::{Traversal, Visitor, Walker};

/// Bookkeeping for the most recent completed propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Sweep {
  pub(crate) id: u64,
  pub(crate) epoch: u64,
}

/// An arena of nodes, the owner of every node a `Handle` refers to.
///
/// Nodes are only ever appended, and only ever reference nodes that already
/// exist, so the arena order is itself a valid topological order and no cycle
/// can be formed. Mutating a leaf bumps the epoch, which makes every cached
/// value and adjoint stale until the passes are re-run.
#[derive(Debug, Default)]
pub struct Graph {
  nodes: RefCell<Vec<Node>>,
  epoch: Cell<u64>,
  sweeps: Cell<u64>,
  last_sweep: Cell<Option<Sweep>>,
}

impl Graph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      nodes: RefCell::new(Vec::with_capacity(capacity)),
      ..Self::default()
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.nodes.borrow().len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Create a fresh input
  pub fn leaf(&self, value: f64) -> Handle<'_> {
    let mut nodes = self.nodes.borrow_mut();
    let id = NodeId(nodes.len());
    nodes.push(Node::leaf(value));
    trace!("created leaf {id} = {value}");
    Handle { id, graph: self }
  }

  /// Create a node applying a binary `op` to `a` and `b`; the operands are
  /// referenced, so passing one handle twice shares a single node
  pub fn combine(&self, op: Op, a: Handle<'_>, b: Handle<'_>) -> Result<Handle<'_>> {
    self.push(op, &[a, b])
  }

  /// Create a node applying a unary `op` to `a`
  pub fn combine_unary(&self, op: Op, a: Handle<'_>) -> Result<Handle<'_>> {
    self.push(op, &[a])
  }

  fn push(&self, op: Op, operands: &[Handle<'_>]) -> Result<Handle<'_>> {
    let expected = op.arity();
    if op == Op::Leaf || operands.len() != expected {
      return Err(GraphError::Arity {
        op,
        expected,
        found: operands.len(),
      });
    }

    let mut nodes = self.nodes.borrow_mut();
    let id = NodeId(nodes.len());
    let mut ids = Operands::new();
    for operand in operands {
      if !ptr::eq(operand.graph, self) {
        return Err(GraphError::ForeignHandle { node: operand.id });
      }
      // an operand must already exist, otherwise the new node could close a loop
      if operand.id >= id {
        return Err(GraphError::Cycle {
          node: id,
          operand: operand.id,
        });
      }
      ids.push(operand.id);
    }

    trace!("created node {id} = {op}{ids:?}");
    nodes.push(Node::apply(op, ids));
    Ok(Handle { id, graph: self })
  }

  /// Overwrite the input of a leaf, invalidating every cache in the graph
  pub fn set_leaf_value(&self, leaf: Handle<'_>, value: f64) -> Result<()> {
    let id = self.check(leaf)?;
    let mut nodes = self.nodes.borrow_mut();
    let node = &mut nodes[id.0];
    if !node.is_leaf() {
      return Err(GraphError::TypeMismatch { node: id, op: node.op });
    }
    node.input = value;
    self.epoch.set(self.epoch.get() + 1);
    debug!("leaf {id} set to {value}, epoch {}", self.epoch.get());
    Ok(())
  }

  pub fn leaf_value(&self, leaf: Handle<'_>) -> Result<f64> {
    let id = self.check(leaf)?;
    let nodes = self.nodes.borrow();
    let node = &nodes[id.0];
    if !node.is_leaf() {
      return Err(GraphError::TypeMismatch { node: id, op: node.op });
    }
    Ok(node.input)
  }

  /// Value cached by the last evaluation, if nothing changed since
  pub fn value(&self, handle: Handle<'_>) -> Result<f64> {
    let id = self.check(handle)?;
    let nodes = self.nodes.borrow();
    let node = &nodes[id.0];
    if !node.is_evaluated_at(self.epoch.get()) {
      return Err(GraphError::Stale {
        node: id,
        state: CacheKind::Value,
      });
    }
    Ok(node.value)
  }

  /// Adjoint from the last propagation, if nothing changed since.
  ///
  /// A node the last propagated root does not depend on has a partial of zero.
  pub fn adjoint(&self, handle: Handle<'_>) -> Result<f64> {
    let id = self.check(handle)?;
    let stale = GraphError::Stale {
      node: id,
      state: CacheKind::Adjoint,
    };
    let sweep = self.last_sweep.get().ok_or_else(|| stale.clone())?;
    if sweep.epoch != self.epoch.get() {
      return Err(stale);
    }
    let nodes = self.nodes.borrow();
    let node = &nodes[id.0];
    if node.sweep == Some(sweep.id) {
      Ok(node.adjoint)
    } else {
      Ok(0.0)
    }
  }

  /// Forward pass from `root`, returns its value
  pub fn evaluate(&self, root: Handle<'_>) -> Result<f64> {
    Evaluator::new().run(self, root)
  }

  /// Assign topological indices to everything `root` depends on, returns the
  /// number of nodes ordered
  pub fn order(&self, root: Handle<'_>) -> Result<usize> {
    Orderer::new().run(self, root).map(|sequence| sequence.len())
  }

  /// Order from `root` and dump the resulting straight-line program
  pub fn program(&self, root: Handle<'_>) -> Result<Program> {
    let sequence = Orderer::new().run(self, root)?;
    Ok(Program::build(&self.nodes(), &sequence))
  }

  /// Reverse pass from `root`; requires a fresh evaluation
  pub fn propagate(&self, root: Handle<'_>) -> Result<()> {
    Propagator::new().run(self, root)
  }

  /// Evaluate and propagate from `root`, returning its value together with the
  /// partials of `root` with respect to each of `inputs`
  pub fn differentiate(&self, root: Handle<'_>, inputs: &[Handle<'_>]) -> Result<(f64, Vec<f64>)> {
    let value = self.evaluate(root)?;
    self.propagate(root)?;
    let adjoints = inputs
      .iter()
      .map(|input| self.adjoint(*input))
      .collect::<Result<Vec<_>>>()?;
    Ok((value, adjoints))
  }

  /// Run `visitor` over everything `root` depends on.
  ///
  /// The walker is not reset here, callers decide when a fresh pass starts.
  /// Nodes are handed to the visitor as they were when the walk began and the
  /// arena is not borrowed meanwhile, so the visitor may mutate or run passes
  /// over the graph. The walker's marker covers every reached node, even when
  /// the visitor aborts.
  pub fn walk<V>(
    &self,
    walker: &mut Walker,
    traversal: Traversal,
    root: Handle<'_>,
    visitor: &mut V,
  ) -> Result<()>
  where
    V: Visitor + ?Sized,
  {
    let root = self.check(root)?;
    let mut reached = Vec::new();
    walker.walk(traversal, &self.nodes(), root, &mut |id: NodeId, node: &Node| -> Result<()> {
      reached.push((id, node.clone()));
      Ok(())
    })?;
    trace!("walked {} nodes from {root}", reached.len());

    for (id, node) in &reached {
      visitor.visit(*id, node)?;
    }
    Ok(())
  }

  /// Resolve `handle` to a node of this arena
  #[inline]
  pub(crate) fn check(&self, handle: Handle<'_>) -> Result<NodeId> {
    if ptr::eq(handle.graph, self) && handle.id.0 < self.len() {
      Ok(handle.id)
    } else {
      Err(GraphError::ForeignHandle { node: handle.id })
    }
  }

  #[inline]
  pub(crate) fn nodes(&self) -> Ref<'_, Vec<Node>> {
    self.nodes.borrow()
  }

  #[inline]
  pub(crate) fn nodes_mut(&self) -> RefMut<'_, Vec<Node>> {
    self.nodes.borrow_mut()
  }

  #[inline]
  pub(crate) fn epoch(&self) -> u64 {
    self.epoch.get()
  }

  pub(crate) fn next_sweep(&self) -> u64 {
    let id = self.sweeps.get();
    self.sweeps.set(id + 1);
    id
  }

  pub(crate) fn complete_sweep(&self, sweep: Sweep) {
    self.last_sweep.set(Some(sweep));
  }
}

/// A cheap, copyable reference to a node of a `Graph`.
///
/// Copies refer to the same node and see the same value and adjoint.
#[derive(Clone, Copy)]
pub struct Handle<'g> {
  id: NodeId,
  graph: &'g Graph,
}

impl<'g> Handle<'g> {
  #[inline]
  pub fn id(&self) -> NodeId {
    self.id
  }

  #[inline]
  pub fn graph(&self) -> &'g Graph {
    self.graph
  }

  pub fn op(&self) -> Result<Op> {
    let id = self.graph.check(*self)?;
    Ok(self.graph.nodes()[id.0].op)
  }

  /// Topological index from the latest ordering that reached this node
  pub fn order(&self) -> Result<Option<usize>> {
    let id = self.graph.check(*self)?;
    Ok(self.graph.nodes()[id.0].order)
  }

  #[inline]
  pub fn value(&self) -> Result<f64> {
    self.graph.value(*self)
  }

  #[inline]
  pub fn adjoint(&self) -> Result<f64> {
    self.graph.adjoint(*self)
  }

  #[inline]
  pub fn leaf_value(&self) -> Result<f64> {
    self.graph.leaf_value(*self)
  }

  #[inline]
  pub fn set_leaf_value(&self, value: f64) -> Result<()> {
    self.graph.set_leaf_value(*self, value)
  }

  #[inline]
  pub fn evaluate(&self) -> Result<f64> {
    self.graph.evaluate(*self)
  }

  #[inline]
  pub fn propagate(&self) -> Result<()> {
    self.graph.propagate(*self)
  }

  pub fn add(&self, other: &Self) -> Result<Self> {
    self.graph.combine(Op::Add, *self, *other)
  }

  pub fn sub(&self, other: &Self) -> Result<Self> {
    self.graph.combine(Op::Sub, *self, *other)
  }

  pub fn mul(&self, other: &Self) -> Result<Self> {
    self.graph.combine(Op::Mul, *self, *other)
  }

  pub fn div(&self, other: &Self) -> Result<Self> {
    self.graph.combine(Op::Div, *self, *other)
  }

  pub fn ln(&self) -> Result<Self> {
    self.graph.combine_unary(Op::Ln, *self)
  }

  pub fn exp(&self) -> Result<Self> {
    self.graph.combine_unary(Op::Exp, *self)
  }

  pub fn sqrt(&self) -> Result<Self> {
    self.graph.combine_unary(Op::Sqrt, *self)
  }

  pub fn sin(&self) -> Result<Self> {
    self.graph.combine_unary(Op::Sin, *self)
  }

  pub fn cos(&self) -> Result<Self> {
    self.graph.combine_unary(Op::Cos, *self)
  }
}

impl PartialEq for Handle<'_> {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id && ptr::eq(self.graph, other.graph)
  }
}

impl Eq for Handle<'_> {}

impl fmt::Debug for Handle<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Handle")
      .field("id", &self.id)
      .field("op", &self.op().ok())
      .finish()
  }
}
