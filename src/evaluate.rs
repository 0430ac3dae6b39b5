use log::{debug, trace};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::Result;
use crate::graph::{Graph, Handle};
use crate::node::{Node, NodeId};
use crate::traverse::Walker;

/// Forward pass: computes every value `root` depends on, operands first.
///
/// Results are staged and only written back once the whole walk succeeded, so a
/// domain error leaves the previously cached values untouched.
#[derive(Debug, Default)]
pub struct Evaluator {
  walker: Walker,
  staged: FxHashMap<NodeId, f64>,
}

impl Evaluator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn run(&mut self, graph: &Graph, root: Handle<'_>) -> Result<f64> {
    let root = graph.check(root)?;
    self.walker.reset();
    self.staged.clear();
    self.staged.reserve(graph.len());

    {
      let nodes = graph.nodes();
      let staged = &mut self.staged;
      self.walker.post_order(&nodes, root, &mut |id: NodeId, node: &Node| -> Result<()> {
        let value = if node.is_leaf() {
          node.input
        } else {
          // operands were visited first, their values are staged already
          let args: SmallVec<[f64; 2]> = node.operands.iter().map(|operand| staged[operand]).collect();
          node.op.forward(&args)?
        };
        trace!("processed node {id} result {value}");
        staged.insert(id, value);
        Ok(())
      })?;
    }

    let epoch = graph.epoch();
    let mut nodes = graph.nodes_mut();
    let count = self.staged.len();
    for (id, value) in self.staged.drain() {
      let node = &mut nodes[id.0];
      node.value = value;
      node.evaluated = Some(epoch);
    }

    let value = nodes[root.0].value;
    debug!("evaluated {count} nodes from {root}, result {value}");
    Ok(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::GraphError;
  use crate::op::Op;

  #[test]
  fn polynomial() {
    let graph = Graph::new();
    let a = graph.leaf(3.0);
    let b = graph.leaf(4.0);
    // (a + b) * a - b / a
    let res = a.add(&b).unwrap().mul(&a).unwrap().sub(&b.div(&a).unwrap()).unwrap();
    assert_eq!(res.evaluate(), Ok((3.0 + 4.0) * 3.0 - 4.0 / 3.0));
  }

  #[test]
  fn caches_every_value() {
    let graph = Graph::new();
    let x = graph.leaf(4.0);
    let s = x.sqrt().unwrap();
    let y = s.mul(&x).unwrap();
    y.evaluate().unwrap();
    assert_eq!(x.value(), Ok(4.0));
    assert_eq!(s.value(), Ok(2.0));
    assert_eq!(y.value(), Ok(8.0));
  }

  #[test]
  fn repeated_runs_agree() {
    let graph = Graph::new();
    let x = graph.leaf(1.3);
    let y = x.sin().unwrap().mul(&x.cos().unwrap()).unwrap();
    let mut evaluator = Evaluator::new();
    let first = evaluator.run(&graph, y).unwrap();
    let second = evaluator.run(&graph, y).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, 1.3f64.sin() * 1.3f64.cos());
  }

  #[test]
  fn domain_error_at_evaluation() {
    let graph = Graph::new();
    let x = graph.leaf(2.0);
    // constructing log of a value that will later be negative is fine
    let y = x.ln().unwrap();
    assert_eq!(y.evaluate(), Ok(2.0f64.ln()));
    x.set_leaf_value(-1.0).unwrap();
    assert_eq!(
      y.evaluate(),
      Err(GraphError::Domain {
        op: Op::Ln,
        value: -1.0
      })
    );
  }

  #[test]
  fn domain_error_keeps_cache() {
    let graph = Graph::new();
    let x = graph.leaf(2.0);
    let z = graph.leaf(0.0);
    let q = x.div(&z).unwrap();
    let p = x.exp().unwrap();
    p.evaluate().unwrap();
    assert!(q.evaluate().is_err());
    // the aborted pass committed nothing
    assert_eq!(x.value(), Ok(2.0));
    assert_eq!(p.value(), Ok(2.0f64.exp()));
    assert!(z.value().is_err());
  }
}
