//!
//! # aad-dag
//!
//! Reverse-mode adjoint differentiation over a runtime DAG.
//!
//! A [`Graph`] owns every node; application code builds a function out of
//! leaves and combinators through copyable [`Handle`]s. Handing the same handle
//! to two combinators shares one node between them, which is what makes the
//! structure a DAG rather than a tree.
//!
//! One forward pass ([`Graph::evaluate`]) and one reverse pass
//! ([`Graph::propagate`]) give the value of the root and its partial with
//! respect to every node it depends on, however many inputs there are.
//!
//! ```
//! use aad_dag::Graph;
//!
//! let graph = Graph::new();
//! let x = graph.leaf(3.0);
//! let y = x.mul(&x)?;
//! assert_eq!(y.evaluate()?, 9.0);
//! y.propagate()?;
//! assert_eq!(x.adjoint()?, 6.0);
//! # Ok::<(), aad_dag::GraphError>(())
//! ```
//!
//! ## Cache invariants
//!
//! 1. Values are valid only while no leaf has been mutated since the evaluation
//!    that produced them; reading a stale value is an error, not a silent reuse
//! 2. Adjoints are valid only for the most recent propagation, and only while
//!    no leaf has been mutated since
//! 3. A failed pass commits nothing
//!

pub mod adjoint;
pub mod error;
pub mod evaluate;
pub mod graph;
pub mod node;
pub mod op;
pub mod order;
pub mod traverse;

pub use adjoint::{Phase, Propagator};
pub use error::{CacheKind, GraphError, Result};
pub use evaluate::Evaluator;
pub use graph::{Graph, Handle};
pub use node::{Node, NodeId};
pub use op::{Op, Rule};
pub use order::{Instruction, Orderer, Program};
pub use traverse::{Traversal, Visitor, Walker};
