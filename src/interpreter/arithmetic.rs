use crate::{
    expressions::{BinaryOp, Literal, UnaryOp},
    DBError::InterpretingError,
    DBResult,
};

/// Operands brought to a common type. Mixed integer widths widen to Int64,
/// anything involving a float becomes Float64.
enum Promoted {
    Int32(i32, i32),
    Int64(i64, i64),
    UInt64(u64, u64),
    Float64(f64, f64),
}

fn as_i64(literal: &Literal) -> Option<i64> {
    match literal {
        Literal::Int32(v) => Some(*v as i64),
        Literal::Int64(v) => Some(*v),
        Literal::UInt64(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}

fn as_f64(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Int32(v) => Some(*v as f64),
        Literal::Int64(v) => Some(*v as f64),
        Literal::UInt64(v) => Some(*v as f64),
        Literal::Float64(v) => Some(*v),
        _ => None,
    }
}

fn promote(op: BinaryOp, left: &Literal, right: &Literal) -> DBResult<Promoted> {
    let promoted = match (left, right) {
        (Literal::Int32(l), Literal::Int32(r)) => Some(Promoted::Int32(*l, *r)),
        (Literal::UInt64(l), Literal::UInt64(r)) => Some(Promoted::UInt64(*l, *r)),
        (Literal::Float64(_), _) | (_, Literal::Float64(_)) => {
            as_f64(left).zip(as_f64(right)).map(|(l, r)| Promoted::Float64(l, r))
        }
        _ => as_i64(left).zip(as_i64(right)).map(|(l, r)| Promoted::Int64(l, r)),
    };
    promoted.ok_or_else(|| {
        InterpretingError(format!(
            "{op} operator not implemented for {left:?} and {right:?}"
        ))
    })
}

fn overflow(op: BinaryOp, left: &Literal, right: &Literal) -> crate::DBError {
    InterpretingError(format!("{left} {op} {right} is out of range"))
}

macro_rules! checked_arithmetic {
    ($name:ident, $op:expr, $checked:ident, $float:tt) => {
        pub fn $name(left: Literal, right: Literal) -> DBResult<Literal> {
            if left.is_null() || right.is_null() {
                return Ok(Literal::Null);
            }
            let result = match promote($op, &left, &right)? {
                Promoted::Int32(l, r) => l.$checked(r).map(Literal::Int32),
                Promoted::Int64(l, r) => l.$checked(r).map(Literal::Int64),
                Promoted::UInt64(l, r) => l.$checked(r).map(Literal::UInt64),
                Promoted::Float64(l, r) => Some(Literal::Float64(l $float r)),
            };
            result.ok_or_else(|| overflow($op, &left, &right))
        }
    };
}

checked_arithmetic!(plus_impl, BinaryOp::Plus, checked_add, +);
checked_arithmetic!(minus_impl, BinaryOp::Minus, checked_sub, -);
checked_arithmetic!(multiply_impl, BinaryOp::Multiply, checked_mul, *);

/// Division by zero yields NULL.
pub fn divide_impl(left: Literal, right: Literal) -> DBResult<Literal> {
    if left.is_null() || right.is_null() {
        return Ok(Literal::Null);
    }
    let result = match promote(BinaryOp::Divide, &left, &right)? {
        Promoted::Int32(_, 0) | Promoted::Int64(_, 0) | Promoted::UInt64(_, 0) => {
            return Ok(Literal::Null)
        }
        Promoted::Float64(_, r) if r == 0.0 => return Ok(Literal::Null),
        Promoted::Int32(l, r) => l.checked_div(r).map(Literal::Int32),
        Promoted::Int64(l, r) => l.checked_div(r).map(Literal::Int64),
        Promoted::UInt64(l, r) => l.checked_div(r).map(Literal::UInt64),
        Promoted::Float64(l, r) => Some(Literal::Float64(l / r)),
    };
    result.ok_or_else(|| overflow(BinaryOp::Divide, &left, &right))
}

pub fn negative_impl(input: Literal) -> DBResult<Literal> {
    match input {
        Literal::Null => Ok(Literal::Null),
        Literal::Int32(v) => v
            .checked_neg()
            .map(Literal::Int32)
            .ok_or_else(|| InterpretingError(format!("-{v} is out of range"))),
        Literal::Int64(v) => v
            .checked_neg()
            .map(Literal::Int64)
            .ok_or_else(|| InterpretingError(format!("-{v} is out of range"))),
        Literal::UInt64(v) => i64::try_from(v)
            .map(|v| Literal::Int64(-v))
            .map_err(|_| InterpretingError(format!("-{v} is out of range"))),
        Literal::Float64(v) => Ok(Literal::Float64(-v)),
        input => Err(InterpretingError(format!(
            "{} operator not implemented for {:?}",
            UnaryOp::Neg,
            input
        ))),
    }
}
