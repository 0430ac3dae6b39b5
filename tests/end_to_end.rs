use std::cell::Cell;

use approx::assert_relative_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};

use aad_dag::{CacheKind, Graph, GraphError, Handle, Node, NodeId, Op, Result, Traversal, Walker};

/// y1 = x2 * (5 * x0 + x1), y2 = log(y1), y = (y1 + x3 * y2) * (y1 + y2)
fn build<'g>(graph: &'g Graph, x: &[Handle<'g>]) -> Result<Handle<'g>> {
  let five = graph.leaf(5.0);
  let y1 = x[2].mul(&five.mul(&x[0])?.add(&x[1])?)?;
  let y2 = y1.ln()?;
  y1.add(&x[3].mul(&y2)?)?.mul(&y1.add(&y2)?)
}

fn closed_form(x: &[f64]) -> f64 {
  let y1 = x[2] * (5.0 * x[0] + x[1]);
  let y2 = y1.ln();
  (y1 + x[3] * y2) * (y1 + y2)
}

/// Central finite difference of `closed_form` in coordinate `i`
fn finite_diff(x: &[f64], i: usize) -> f64 {
  let h = 1e-6;
  let mut hi = x.to_vec();
  let mut lo = x.to_vec();
  hi[i] += h;
  lo[i] -= h;
  (closed_form(&hi) - closed_form(&lo)) / (2.0 * h)
}

fn inputs(graph: &Graph) -> Vec<Handle<'_>> {
  [1.0, 2.0, 3.0, 4.0, 5.0]
    .iter()
    .map(|v| graph.leaf(*v))
    .collect()
}

#[test]
fn forward_value() {
  let graph = Graph::new();
  let x = inputs(&graph);
  let y = build(&graph, &x).unwrap();
  assert_relative_eq!(y.evaluate().unwrap(), 797.7513234561649, max_relative = 1e-12);
  assert_relative_eq!(
    y.evaluate().unwrap(),
    closed_form(&[1.0, 2.0, 3.0, 4.0, 5.0]),
    max_relative = 1e-12
  );
}

#[test]
fn pinned_adjoints() {
  let graph = Graph::new();
  let x = inputs(&graph);
  let y = build(&graph, &x).unwrap();
  let (value, adjoints) = graph.differentiate(y, &x).unwrap();
  assert_relative_eq!(value, 797.7513234561649, max_relative = 1e-12);
  let expected = [
    950.7364539019619,
    190.14729078039238,
    443.6770118209156,
    73.20408806599326,
    0.0,
  ];
  for (got, want) in adjoints.iter().zip(expected) {
    assert_relative_eq!(*got, want, max_relative = 1e-10);
  }
}

#[test]
fn program_dump() {
  let graph = Graph::new();
  let x = inputs(&graph);
  let y = build(&graph, &x).unwrap();
  let program = graph.program(y).unwrap();
  let expected = "\
y0 = 3
y1 = 5
y2 = 1
y3 = y1 * y2
y4 = 2
y5 = y3 + y4
y6 = y0 * y5
y7 = 4
y8 = log(y6)
y9 = y7 * y8
y10 = y6 + y9
y11 = y6 + y8
y12 = y10 * y11
";
  assert_eq!(program.to_string(), expected);
  assert_eq!(y.order(), Ok(Some(12)));
  // x4 does not take part
  assert_eq!(x[4].order(), Ok(None));

  let replayed = program.replay().unwrap();
  assert_relative_eq!(replayed[12], y.evaluate().unwrap(), max_relative = 1e-15);
}

#[test]
fn mutation_and_reevaluation() {
  let graph = Graph::new();
  let x = inputs(&graph);
  let y = build(&graph, &x).unwrap();
  assert_relative_eq!(y.evaluate().unwrap(), 797.7513234561649, max_relative = 1e-12);

  x[0].set_leaf_value(2.5).unwrap();
  assert_eq!(x[0].leaf_value(), Ok(2.5));
  assert_eq!(
    y.value(),
    Err(GraphError::Stale {
      node: y.id(),
      state: CacheKind::Value
    })
  );
  assert_relative_eq!(y.evaluate().unwrap(), 2769.7604044196346, max_relative = 1e-12);
  assert_relative_eq!(
    y.value().unwrap(),
    closed_form(&[2.5, 2.0, 3.0, 4.0, 5.0]),
    max_relative = 1e-12
  );
}

#[test]
fn adjoints_match_finite_differences() {
  let mut rng = StdRng::seed_from_u64(0x5eed);
  let graph = Graph::new();
  let x = inputs(&graph);
  let y = build(&graph, &x).unwrap();

  for _ in 0..20 {
    let values: Vec<f64> = (0..5).map(|_| rng.gen_range(0.5..3.0)).collect();
    for (leaf, value) in x.iter().zip(&values) {
      leaf.set_leaf_value(*value).unwrap();
    }
    let (value, adjoints) = graph.differentiate(y, &x).unwrap();
    assert_relative_eq!(value, closed_form(&values), max_relative = 1e-12);
    for (i, adjoint) in adjoints.iter().enumerate() {
      assert_relative_eq!(*adjoint, finite_diff(&values, i), epsilon = 1e-4, max_relative = 1e-6);
    }
  }
}

#[test]
fn diamond_sharing() {
  let graph = Graph::new();
  let x = graph.leaf(3.0);
  let y = graph.combine(Op::Mul, x, x).unwrap();
  y.evaluate().unwrap();
  y.propagate().unwrap();
  assert_eq!(x.adjoint(), Ok(6.0));

  // two distinct leaves of equal value each see only their own share
  let a = graph.leaf(3.0);
  let b = graph.leaf(3.0);
  let z = a.mul(&b).unwrap();
  let (_, adjoints) = graph.differentiate(z, &[a, b]).unwrap();
  assert_eq!(adjoints, [3.0, 3.0]);
}

#[test]
fn deep_sharing() {
  // x_{k+1} = x_k * x_k: every level is a diamond, d/dx of x^(2^n) at 1.01
  let graph = Graph::new();
  let x = graph.leaf(1.01);
  let mut y = x;
  for _ in 0..10 {
    y = y.mul(&y).unwrap();
  }
  let (value, adjoints) = graph.differentiate(y, &[x]).unwrap();
  let n = 1024.0;
  assert_relative_eq!(value, 1.01f64.powf(n), max_relative = 1e-10);
  assert_relative_eq!(adjoints[0], n * 1.01f64.powf(n - 1.0), max_relative = 1e-10);
}

#[test]
fn ordering_is_stable() {
  let graph = Graph::new();
  let x = inputs(&graph);
  let y = build(&graph, &x).unwrap();
  graph.order(y).unwrap();
  let before: Vec<_> = x.iter().map(|h| h.order().unwrap()).collect();
  graph.order(y).unwrap();
  let after: Vec<_> = x.iter().map(|h| h.order().unwrap()).collect();
  assert_eq!(before, after);
}

#[test]
fn reused_graph_keeps_relative_order() {
  let graph = Graph::new();
  let x = inputs(&graph);
  let y = build(&graph, &x).unwrap();
  let old = graph.program(y).unwrap();

  let z = y.mul(&x[4]).unwrap().sin().unwrap();
  let new = graph.program(z).unwrap();
  assert_eq!(new.len(), old.len() + 3);
  // the old program is a prefix of the new one
  assert_eq!(&new.instructions()[..old.len()], old.instructions());
  assert_eq!(y.order(), Ok(Some(12)));
  assert_eq!(x[4].order(), Ok(Some(13)));
  assert_eq!(z.order(), Ok(Some(15)));
}

#[test]
fn reset_then_evaluate_twice() {
  let graph = Graph::new();
  let x = inputs(&graph);
  let y = build(&graph, &x).unwrap();
  let first = y.evaluate().unwrap();
  let second = y.evaluate().unwrap();
  assert_eq!(first, second);
}

#[test]
fn walker_needs_reset() {
  let graph = Graph::new();
  let x = inputs(&graph);
  let y = build(&graph, &x).unwrap();
  let mut walker = Walker::new();

  let count = Cell::new(0);
  let mut counter = |_: NodeId, _: &Node| -> Result<()> {
    count.set(count.get() + 1);
    Ok(())
  };
  graph.walk(&mut walker, Traversal::PostOrder, y, &mut counter).unwrap();
  // the marker from the first walk is still set
  graph.walk(&mut walker, Traversal::PostOrder, y, &mut counter).unwrap();
  assert_eq!(count.get(), 13);

  walker.reset();
  graph.walk(&mut walker, Traversal::BreadthFirst, y, &mut counter).unwrap();
  assert_eq!(count.get(), 26);

  // pre-order walks every path, the shared y6 is reached more than once
  walker.reset();
  count.set(0);
  graph.walk(&mut walker, Traversal::PreOrder, y, &mut counter).unwrap();
  assert!(count.get() > 13);
}

#[test]
fn domain_error_is_deferred_to_evaluation() {
  let graph = Graph::new();
  let a = graph.leaf(1.0);
  let b = graph.leaf(2.0);
  let y = a.sub(&b).unwrap().ln().unwrap();
  assert_eq!(
    y.evaluate(),
    Err(GraphError::Domain {
      op: Op::Ln,
      value: -1.0
    })
  );
  assert!(y.propagate().is_err());
  b.set_leaf_value(0.5).unwrap();
  assert_relative_eq!(y.evaluate().unwrap(), 0.5f64.ln());
  y.propagate().unwrap();
  assert_relative_eq!(a.adjoint().unwrap(), 2.0);
  assert_relative_eq!(b.adjoint().unwrap(), -2.0);
}
