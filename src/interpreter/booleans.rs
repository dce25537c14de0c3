use std::cmp::Ordering;

use crate::{
    expressions::{BinaryOp, Literal, UnaryOp},
    DBError::InterpretingError,
    DBResult,
};

fn compare(
    left: Literal,
    right: Literal,
    op: BinaryOp,
    f: impl FnOnce(Ordering) -> bool,
) -> DBResult<Literal> {
    if left.is_null() || right.is_null() {
        return Ok(Literal::Null);
    }
    cmp_impl(&left, &right)
        .map(|o| Literal::Bool(f(o)))
        .map_err(|_| {
            InterpretingError(format!(
                "{op} operator not implemented for {left:?} and {right:?}"
            ))
        })
}

pub fn gt_impl(left: Literal, right: Literal) -> DBResult<Literal> {
    compare(left, right, BinaryOp::Gt, Ordering::is_gt)
}

pub fn gte_impl(left: Literal, right: Literal) -> DBResult<Literal> {
    compare(left, right, BinaryOp::Gte, Ordering::is_ge)
}

pub fn eq_impl(left: Literal, right: Literal) -> DBResult<Literal> {
    compare(left, right, BinaryOp::Eq, Ordering::is_eq)
}

pub fn not_eq_impl(left: Literal, right: Literal) -> DBResult<Literal> {
    compare(left, right, BinaryOp::NotEq, Ordering::is_ne)
}

pub fn lt_impl(left: Literal, right: Literal) -> DBResult<Literal> {
    compare(left, right, BinaryOp::Lt, Ordering::is_lt)
}

pub fn lte_impl(left: Literal, right: Literal) -> DBResult<Literal> {
    compare(left, right, BinaryOp::Lte, Ordering::is_le)
}

/// Order two non-NULL values. Numbers of different types compare by value.
pub fn cmp_impl(left: &Literal, right: &Literal) -> DBResult<Ordering> {
    match (left, right) {
        (Literal::Int32(l), Literal::Int32(r)) => Ok(l.cmp(r)),
        (Literal::Int64(l), Literal::Int64(r)) => Ok(l.cmp(r)),
        (Literal::UInt64(l), Literal::UInt64(r)) => Ok(l.cmp(r)),
        (Literal::Float64(l), Literal::Float64(r)) => Ok(l.total_cmp(r)),
        (Literal::String(l), Literal::String(r)) => Ok(l.cmp(r)),
        (Literal::DateTime(l), Literal::DateTime(r)) => Ok(l.cmp(r)),
        (Literal::Bool(l), Literal::Bool(r)) => Ok(l.cmp(r)),
        (l, r) if l.data_type().is_integer() && r.data_type().is_integer() => {
            Ok(integer_value(l).cmp(&integer_value(r)))
        }
        (l, r) if l.data_type().is_numeric() && r.data_type().is_numeric() => {
            Ok(float_value(l).total_cmp(&float_value(r)))
        }
        (left, right) => Err(InterpretingError(format!(
            "cannot compare {left:?} with {right:?}"
        ))),
    }
}

/// Ordering used by sorting and MIN/MAX: NULL sorts before every value.
pub fn sort_cmp_impl(left: &Literal, right: &Literal) -> DBResult<Ordering> {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ok(Ordering::Equal),
        (true, false) => Ok(Ordering::Less),
        (false, true) => Ok(Ordering::Greater),
        (false, false) => cmp_impl(left, right),
    }
}

fn integer_value(literal: &Literal) -> i128 {
    match literal {
        Literal::Int32(v) => *v as i128,
        Literal::Int64(v) => *v as i128,
        Literal::UInt64(v) => *v as i128,
        _ => 0,
    }
}

fn float_value(literal: &Literal) -> f64 {
    match literal {
        Literal::Float64(v) => *v,
        other => integer_value(other) as f64,
    }
}

fn truth_value(op: BinaryOp, input: &Literal) -> DBResult<Option<bool>> {
    match input {
        Literal::Bool(v) => Ok(Some(*v)),
        Literal::Null => Ok(None),
        input => Err(InterpretingError(format!(
            "{op} operator not implemented for {input:?}"
        ))),
    }
}

pub fn and_impl(left: Literal, right: Literal) -> DBResult<Literal> {
    let l = truth_value(BinaryOp::And, &left)?;
    let r = truth_value(BinaryOp::And, &right)?;
    Ok(match (l, r) {
        (Some(false), _) | (_, Some(false)) => Literal::Bool(false),
        (Some(true), Some(true)) => Literal::Bool(true),
        _ => Literal::Null,
    })
}

pub fn or_impl(left: Literal, right: Literal) -> DBResult<Literal> {
    let l = truth_value(BinaryOp::Or, &left)?;
    let r = truth_value(BinaryOp::Or, &right)?;
    Ok(match (l, r) {
        (Some(true), _) | (_, Some(true)) => Literal::Bool(true),
        (Some(false), Some(false)) => Literal::Bool(false),
        _ => Literal::Null,
    })
}

pub fn not_impl(input: Literal) -> DBResult<Literal> {
    match input {
        Literal::Bool(v) => Ok(Literal::Bool(!v)),
        Literal::Null => Ok(Literal::Null),
        input => Err(InterpretingError(format!(
            "{} operator not implemented for {:?}",
            UnaryOp::Not,
            input
        ))),
    }
}
