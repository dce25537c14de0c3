pub(crate) mod arithmetic;
pub(crate) mod booleans;

use std::cmp::Ordering;

use crate::{
    context::JoinContext,
    expressions::{BinaryOp, Expression, Literal, UnaryOp},
    DBError, DBResult,
};

use self::{
    arithmetic::{divide_impl, minus_impl, multiply_impl, negative_impl, plus_impl},
    booleans::{
        and_impl, eq_impl, gt_impl, gte_impl, lt_impl, lte_impl, not_eq_impl, not_impl,
        or_impl, sort_cmp_impl,
    },
};

pub struct Interpreter {}

impl Interpreter {
    /// Evaluate over the current record buffers and the active slice of `join`.
    pub fn eval(expr: &Expression, join: &JoinContext) -> DBResult<Literal> {
        match expr {
            Expression::Literal(l) => Ok(l.clone()),
            Expression::UnResolvedFieldRef(field) => Err(DBError::InterpretingError(
                format!("Trying evaluate an unresolved field {field}."),
            )),
            Expression::FieldRef { table, index, .. } => table.column(*index),
            Expression::ItemRef { slot, .. } => join.item(*slot),
            Expression::BinaryOp { op, left, right } => {
                let left = Self::eval(left, join)?;
                // AND/OR stop early only when the result is already known
                match (op, &left) {
                    (BinaryOp::And, Literal::Bool(false)) => return Ok(left),
                    (BinaryOp::Or, Literal::Bool(true)) => return Ok(left),
                    _ => {}
                }
                let right = Self::eval(right, join)?;
                match op {
                    BinaryOp::Plus => plus_impl(left, right),
                    BinaryOp::Minus => minus_impl(left, right),
                    BinaryOp::Divide => divide_impl(left, right),
                    BinaryOp::Multiply => multiply_impl(left, right),
                    BinaryOp::Gt => gt_impl(left, right),
                    BinaryOp::Gte => gte_impl(left, right),
                    BinaryOp::Eq => eq_impl(left, right),
                    BinaryOp::NotEq => not_eq_impl(left, right),
                    BinaryOp::Lt => lt_impl(left, right),
                    BinaryOp::Lte => lte_impl(left, right),
                    BinaryOp::And => and_impl(left, right),
                    BinaryOp::Or => or_impl(left, right),
                }
            }
            Expression::UnaryOp { op, input } => match op {
                UnaryOp::Not => not_impl(Self::eval(input, join)?),
                UnaryOp::Neg => negative_impl(Self::eval(input, join)?),
            },
            Expression::IsNull { negated, input } => {
                let is_null = Self::eval(input, join)?.is_null();
                Ok(Literal::Bool(is_null != *negated))
            }
            Expression::Alias { alias: _, child } => Self::eval(child, join),
            Expression::Exists(subquery) => subquery.exists().map(Literal::Bool),
        }
    }

    pub fn eval_condition(expr: &Expression, join: &JoinContext) -> DBResult<bool> {
        Self::eval(expr, join)?.as_bool()
    }

    pub fn eval_all(exprs: &[Expression], join: &JoinContext) -> DBResult<Vec<Literal>> {
        exprs.iter().map(|e| Self::eval(e, join)).collect()
    }

    /// Total order used for sorting and grouping: NULLs first.
    pub fn compare(left: &Literal, right: &Literal) -> DBResult<Ordering> {
        sort_cmp_impl(left, right)
    }
}
