//!
//! Topological ordering and the straight-line program it induces.
//!
//! Indices are handed out in post-order starting at 0, so every operand gets a
//! strictly smaller index than any node referencing it. The same sequence,
//! read backwards, is the order the adjoint pass must follow.
//!

use std::fmt;

use log::debug;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::Result;
use crate::graph::{Graph, Handle};
use crate::node::{Node, NodeId};
use crate::op::Op;
use crate::traverse::Walker;

#[derive(Debug, Default)]
pub struct Orderer {
  walker: Walker,
}

impl Orderer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Index everything `root` depends on; `sequence[i]` is the node given index `i`
  pub fn run(&mut self, graph: &Graph, root: Handle<'_>) -> Result<Vec<NodeId>> {
    let sequence = self.sequence(graph, root)?;
    Self::commit(graph, &sequence);
    Ok(sequence)
  }

  /// Post-order from `root` without touching the nodes
  pub(crate) fn sequence(&mut self, graph: &Graph, root: Handle<'_>) -> Result<Vec<NodeId>> {
    let root = graph.check(root)?;
    self.walker.reset();

    let mut sequence = Vec::with_capacity(graph.len());
    self.walker.post_order(&graph.nodes(), root, &mut |id: NodeId, _: &Node| -> Result<()> {
      sequence.push(id);
      Ok(())
    })?;
    Ok(sequence)
  }

  /// Write the index of every node in `sequence`
  pub(crate) fn commit(graph: &Graph, sequence: &[NodeId]) {
    let mut nodes = graph.nodes_mut();
    for (order, id) in sequence.iter().enumerate() {
      nodes[id.0].order = Some(order);
    }
    if let Some(root) = sequence.last() {
      debug!("ordered {} nodes from {root}", sequence.len());
    }
  }
}

/// One line of a program; operands refer to earlier lines by index
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
  Literal(f64),
  Apply { op: Op, args: SmallVec<[usize; 2]> },
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Instruction::Literal(value) => write!(f, "{value}"),
      Instruction::Apply { op, args } => match (op.symbol(), args.as_slice()) {
        (Some(symbol), [lhs, rhs]) => write!(f, "y{lhs} {symbol} y{rhs}"),
        _ => {
          write!(f, "{op}(")?;
          for (i, arg) in args.iter().enumerate() {
            if i > 0 {
              f.write_str(", ")?;
            }
            write!(f, "y{arg}")?;
          }
          f.write_str(")")
        }
      },
    }
  }
}

/// A graph flattened into topological order, one instruction per node.
///
/// Diagnostic output only: the text form carries no compatibility guarantees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
  instructions: Vec<Instruction>,
}

impl Program {
  pub(crate) fn build(nodes: &[Node], sequence: &[NodeId]) -> Self {
    let mut index = FxHashMap::with_capacity_and_hasher(sequence.len(), Default::default());
    let mut instructions = Vec::with_capacity(sequence.len());

    for (i, id) in sequence.iter().enumerate() {
      let node = &nodes[id.0];
      let instruction = if node.is_leaf() {
        Instruction::Literal(node.input)
      } else {
        Instruction::Apply {
          op: node.op,
          args: node.operands.iter().map(|operand| index[operand]).collect(),
        }
      };
      index.insert(*id, i);
      instructions.push(instruction);
    }

    Self { instructions }
  }

  #[inline]
  pub fn instructions(&self) -> &[Instruction] {
    &self.instructions
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.instructions.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.instructions.is_empty()
  }

  /// Execute the program front to back without the graph, returning the value
  /// of every line; the last one is the root's
  pub fn replay(&self) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(self.instructions.len());
    for instruction in &self.instructions {
      let value = match instruction {
        Instruction::Literal(value) => *value,
        Instruction::Apply { op, args } => {
          let args: SmallVec<[f64; 2]> = args.iter().map(|arg| values[*arg]).collect();
          op.forward(&args)?
        }
      };
      values.push(value);
    }
    Ok(values)
  }
}

impl fmt::Display for Program {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, instruction) in self.instructions.iter().enumerate() {
      writeln!(f, "y{i} = {instruction}")?;
    }
    Ok(())
  }
}
