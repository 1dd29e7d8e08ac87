//! Expression evaluation over tuples.
//!
//! A deliberately small expression tree: enough for scan predicates, join
//! conditions and projections, and HAVING clauses over aggregate results.
//! Three evaluation contexts exist, mirroring how operators call in:
//! single-tuple ([`Expr::evaluate`]), joined pair ([`Expr::evaluate_join`]),
//! and aggregated group ([`Expr::evaluate_aggregate`]).

use crate::error::{Result, RivetError};
use crate::types::{Tuple, Value};

/// Which input of a join a column reference resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    /// The build (left) input.
    Left,
    /// The probe (right) input.
    Right,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn matches(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            CompareOp::Eq => ordering == Equal,
            CompareOp::NotEq => ordering != Equal,
            CompareOp::Lt => ordering == Less,
            CompareOp::LtEq => ordering != Greater,
            CompareOp::Gt => ordering == Greater,
            CompareOp::GtEq => ordering != Less,
        }
    }
}

/// An evaluable expression.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Column of the single input tuple.
    Column(usize),
    /// Column of one side of a join.
    JoinColumn { side: JoinSide, index: usize },
    /// Constant value.
    Literal(Value),
    /// Comparison of two sub-expressions.
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    /// Logical AND of two boolean sub-expressions.
    And(Box<Expr>, Box<Expr>),
    /// Group-by column of an aggregated row.
    GroupRef(usize),
    /// Aggregate result of an aggregated row.
    AggRef(usize),
}

impl Expr {
    /// Convenience constructor for `lhs op rhs`.
    #[must_use]
    pub fn compare(op: CompareOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Compare(op, Box::new(lhs), Box::new(rhs))
    }

    /// Evaluates against a single tuple.
    ///
    /// # Errors
    ///
    /// Returns an error for references that are invalid in this context.
    pub fn evaluate(&self, tuple: &Tuple) -> Result<Value> {
        self.eval(&mut |expr| match expr {
            Expr::Column(index) => Ok(tuple.value(*index).clone()),
            _ => Err(RivetError::Execution(format!(
                "expression {expr:?} is not valid over a single tuple"
            ))),
        })
    }

    /// Evaluates against a pair of joined tuples.
    ///
    /// # Errors
    ///
    /// Returns an error for references that are invalid in this context.
    pub fn evaluate_join(&self, left: &Tuple, right: &Tuple) -> Result<Value> {
        self.eval(&mut |expr| match expr {
            Expr::JoinColumn { side, index } => {
                let tuple = match side {
                    JoinSide::Left => left,
                    JoinSide::Right => right,
                };
                Ok(tuple.value(*index).clone())
            }
            _ => Err(RivetError::Execution(format!(
                "expression {expr:?} is not valid over a join pair"
            ))),
        })
    }

    /// Evaluates against one aggregated group.
    ///
    /// # Errors
    ///
    /// Returns an error for references that are invalid in this context.
    pub fn evaluate_aggregate(&self, group_bys: &[Value], aggregates: &[Value]) -> Result<Value> {
        self.eval(&mut |expr| match expr {
            Expr::GroupRef(index) => Ok(group_bys[*index].clone()),
            Expr::AggRef(index) => Ok(aggregates[*index].clone()),
            _ => Err(RivetError::Execution(format!(
                "expression {expr:?} is not valid over an aggregated group"
            ))),
        })
    }

    /// Shared walk; `leaf` resolves the context-dependent references.
    fn eval(&self, leaf: &mut dyn FnMut(&Expr) -> Result<Value>) -> Result<Value> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Compare(op, lhs, rhs) => {
                let lhs = lhs.eval(leaf)?;
                let rhs = rhs.eval(leaf)?;
                match lhs.compare(&rhs) {
                    Some(ordering) => Ok(Value::Bool(op.matches(ordering))),
                    None => Ok(Value::Bool(false)),
                }
            }
            Expr::And(lhs, rhs) => {
                let lhs = as_bool(&lhs.eval(leaf)?)?;
                let rhs = as_bool(&rhs.eval(leaf)?)?;
                Ok(Value::Bool(lhs && rhs))
            }
            other => leaf(other),
        }
    }
}

fn as_bool(value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| RivetError::Execution(format!("expected boolean, got {value}")))
}

/// Evaluates a predicate expression to a boolean.
///
/// # Errors
///
/// Returns an error if the expression does not produce a boolean.
pub fn eval_predicate(expr: &Expr, tuple: &Tuple) -> Result<bool> {
    as_bool(&expr.evaluate(tuple)?)
}
