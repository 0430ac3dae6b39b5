//!
//! The closed set of operation kinds, each defined by a forward rule and a
//! pullback rule over the operands' cached values.
//!

use std::fmt;

use smallvec::{smallvec, SmallVec};

use crate::error::{GraphError, Result};

/// Per-operand adjoint contributions produced by a pullback
pub type Contributions = SmallVec<[f64; 2]>;

/// Operation kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
  Leaf,
  Add,
  Sub,
  Mul,
  Div,
  Ln,
  Exp,
  /// Defined at 0 with value 0; the pullback there is `+inf` (`-inf` for a
  /// negative adjoint), the one-sided derivative, and flows into the operand
  Sqrt,
  Sin,
  Cos,
}

/// Forward and pullback rules of one operation kind.
///
/// `args` always holds exactly `ARITY` operand values, in operand order.
pub trait Rule {
  const ARITY: usize;

  /// Forward computation from operand values
  fn forward(&self, args: &[f64]) -> Result<f64>;

  /// Chain rule: the contribution `adjoint * d(self)/d(arg_i)` for each operand
  fn pullback(&self, args: &[f64], adjoint: f64) -> Contributions;
}

pub struct AddOp;

impl Rule for AddOp {
  const ARITY: usize = 2;

  fn forward(&self, args: &[f64]) -> Result<f64> {
    Ok(args[0] + args[1])
  }

  fn pullback(&self, _args: &[f64], adjoint: f64) -> Contributions {
    smallvec![adjoint, adjoint]
  }
}

pub struct SubOp;

impl Rule for SubOp {
  const ARITY: usize = 2;

  fn forward(&self, args: &[f64]) -> Result<f64> {
    Ok(args[0] - args[1])
  }

  fn pullback(&self, _args: &[f64], adjoint: f64) -> Contributions {
    smallvec![adjoint, -adjoint]
  }
}

pub struct MulOp;

impl Rule for MulOp {
  const ARITY: usize = 2;

  fn forward(&self, args: &[f64]) -> Result<f64> {
    Ok(args[0] * args[1])
  }

  fn pullback(&self, args: &[f64], adjoint: f64) -> Contributions {
    // each side picks up the other side's value
    smallvec![adjoint * args[1], adjoint * args[0]]
  }
}

pub struct DivOp;

impl Rule for DivOp {
  const ARITY: usize = 2;

  fn forward(&self, args: &[f64]) -> Result<f64> {
    let (a, b) = (args[0], args[1]);
    if b == 0.0 {
      return Err(GraphError::Domain {
        op: Op::Div,
        value: b,
      });
    }
    Ok(a / b)
  }

  fn pullback(&self, args: &[f64], adjoint: f64) -> Contributions {
    let (a, b) = (args[0], args[1]);
    smallvec![adjoint / b, -adjoint * a / (b * b)]
  }
}

// Unary operations, `$domain` is the predicate the operand must satisfy
macro_rules! unary_op {
  ($name:ident, $variant:ident, $domain:expr, $forward:expr, $local:expr) => {
    pub struct $name;

    impl Rule for $name {
      const ARITY: usize = 1;

      fn forward(&self, args: &[f64]) -> Result<f64> {
        let a = args[0];
        if !$domain(a) {
          return Err(GraphError::Domain {
            op: Op::$variant,
            value: a,
          });
        }
        Ok($forward(a))
      }

      fn pullback(&self, args: &[f64], adjoint: f64) -> Contributions {
        smallvec![adjoint * $local(args[0])]
      }
    }
  };
}

unary_op!(LnOp, Ln, |a: f64| a > 0.0, f64::ln, |a: f64| 1.0 / a);
unary_op!(ExpOp, Exp, |_a: f64| true, f64::exp, f64::exp);
unary_op!(SqrtOp, Sqrt, |a: f64| a >= 0.0, f64::sqrt, |a: f64| {
  0.5 / a.sqrt()
});
unary_op!(SinOp, Sin, |_a: f64| true, f64::sin, f64::cos);
unary_op!(CosOp, Cos, |_a: f64| true, f64::cos, |a: f64| -a.sin());

impl Op {
  /// Number of operands a node of this kind references
  pub fn arity(&self) -> usize {
    match self {
      Op::Leaf => 0,
      Op::Add => AddOp::ARITY,
      Op::Sub => SubOp::ARITY,
      Op::Mul => MulOp::ARITY,
      Op::Div => DivOp::ARITY,
      Op::Ln => LnOp::ARITY,
      Op::Exp => ExpOp::ARITY,
      Op::Sqrt => SqrtOp::ARITY,
      Op::Sin => SinOp::ARITY,
      Op::Cos => CosOp::ARITY,
    }
  }

  /// Apply the forward rule; a leaf has no rule and evaluates to its input,
  /// which the caller supplies instead
  pub fn forward(&self, args: &[f64]) -> Result<f64> {
    debug_assert_eq!(args.len(), self.arity());
    match self {
      Op::Leaf => Err(GraphError::Arity {
        op: Op::Leaf,
        expected: 0,
        found: args.len(),
      }),
      Op::Add => AddOp.forward(args),
      Op::Sub => SubOp.forward(args),
      Op::Mul => MulOp.forward(args),
      Op::Div => DivOp.forward(args),
      Op::Ln => LnOp.forward(args),
      Op::Exp => ExpOp.forward(args),
      Op::Sqrt => SqrtOp.forward(args),
      Op::Sin => SinOp.forward(args),
      Op::Cos => CosOp.forward(args),
    }
  }

  /// Apply the pullback rule; leaves accumulate and push nothing
  pub fn pullback(&self, args: &[f64], adjoint: f64) -> Contributions {
    match self {
      Op::Leaf => SmallVec::new(),
      Op::Add => AddOp.pullback(args, adjoint),
      Op::Sub => SubOp.pullback(args, adjoint),
      Op::Mul => MulOp.pullback(args, adjoint),
      Op::Div => DivOp.pullback(args, adjoint),
      Op::Ln => LnOp.pullback(args, adjoint),
      Op::Exp => ExpOp.pullback(args, adjoint),
      Op::Sqrt => SqrtOp.pullback(args, adjoint),
      Op::Sin => SinOp.pullback(args, adjoint),
      Op::Cos => CosOp.pullback(args, adjoint),
    }
  }

  /// Infix symbol for binary kinds, `None` otherwise
  pub fn symbol(&self) -> Option<&'static str> {
    match self {
      Op::Add => Some("+"),
      Op::Sub => Some("-"),
      Op::Mul => Some("*"),
      Op::Div => Some("/"),
      _ => None,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Op::Leaf => "leaf",
      Op::Add => "add",
      Op::Sub => "sub",
      Op::Mul => "mul",
      Op::Div => "div",
      Op::Ln => "log",
      Op::Exp => "exp",
      Op::Sqrt => "sqrt",
      Op::Sin => "sin",
      Op::Cos => "cos",
    }
  }
}

impl fmt::Display for Op {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}
