use std::cell::RefCell;
use std::fmt::Display;
use std::hash::Hash;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::access_path::AccessPath;
use crate::compiler::create_iterator_from_access_path;
use crate::context::JoinContext;
use crate::data_types::DataType;
use crate::iterators::{ReadResult, RowIterator};
use crate::tables::{TableMap, TableRef};
use crate::DBError;
use crate::DBResult;

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    UnResolvedFieldRef(String),
    FieldRef {
        name: String,
        table: TableRef,
        index: usize,
        data_type: DataType,
    },
    /// An item of the query block's active ref-item slice.
    ItemRef {
        name: String,
        slot: usize,
        data_type: DataType,
    },
    Alias {
        alias: String,
        child: Box<Expression>,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOp,
        input: Box<Expression>,
    },
    IsNull {
        negated: bool,
        input: Box<Expression>,
    },
    Exists(Rc<Subquery>),
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal(l) => l.fmt(f),
            Expression::UnResolvedFieldRef(name) => name.fmt(f),
            Expression::FieldRef { name, table, .. } => {
                write!(f, "{}.{name}", table.name())
            }
            Expression::ItemRef { name, .. } => name.fmt(f),
            Expression::Alias { alias, child: _ } => alias.fmt(f),
            Expression::BinaryOp { op, left, right } => {
                write!(f, "({left} {op} {right})")
            }
            Expression::UnaryOp { op, input } => write!(f, "{op} {input}"),
            Expression::IsNull { negated, input } => {
                if *negated {
                    write!(f, "{input} IS NOT NULL")
                } else {
                    write!(f, "{input} IS NULL")
                }
            }
            Expression::Exists(subquery) => write!(f, "exists(select #{})", subquery.select_number()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Plus,
    Minus,
    Divide,
    Multiply,
    Gt,
    Gte,
    Eq,
    NotEq,
    Lt,
    Lte,
    And,
    Or,
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Plus => "+".fmt(f),
            BinaryOp::Minus => "-".fmt(f),
            BinaryOp::Divide => "/".fmt(f),
            BinaryOp::Multiply => "*".fmt(f),
            BinaryOp::Gt => ">".fmt(f),
            BinaryOp::Gte => ">=".fmt(f),
            BinaryOp::Eq => "=".fmt(f),
            BinaryOp::NotEq => "<>".fmt(f),
            BinaryOp::Lt => "<".fmt(f),
            BinaryOp::Lte => "<=".fmt(f),
            BinaryOp::And => "AND".fmt(f),
            BinaryOp::Or => "OR".fmt(f),
        }
    }
}

impl BinaryOp {
    pub fn is_boolean_op(&self) -> bool {
        matches!(
            self,
            BinaryOp::Gt
                | BinaryOp::Gte
                | BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::Lte
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Not => "NOT".fmt(f),
            UnaryOp::Neg => "-".fmt(f),
        }
    }
}

impl Expression {
    pub fn field(table: &TableRef, index: usize) -> Self {
        let field = &table.schema().get_fields()[index];
        Expression::FieldRef {
            name: field.name().to_owned(),
            table: Rc::clone(table),
            index,
            data_type: field.data_type().clone(),
        }
    }

    pub fn item(name: &str, slot: usize, data_type: DataType) -> Self {
        Expression::ItemRef {
            name: name.to_owned(),
            slot,
            data_type,
        }
    }

    pub fn literal(literal: Literal) -> Self {
        Expression::Literal(literal)
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expression::Literal(l) => l.data_type(),
            Expression::UnResolvedFieldRef(_) => DataType::Unknown,
            Expression::FieldRef { data_type, .. } => data_type.clone(),
            Expression::ItemRef { data_type, .. } => data_type.clone(),
            Expression::BinaryOp { op, left, right: _ } => match op {
                op if op.is_boolean_op() => DataType::Boolean,
                _ => left.data_type(),
            },
            Expression::UnaryOp { op, input } => match op {
                UnaryOp::Not => DataType::Boolean,
                UnaryOp::Neg => input.data_type(),
            },
            Expression::IsNull { .. } | Expression::Exists(_) => DataType::Boolean,
            Expression::Alias { alias: _, child } => child.data_type(),
        }
    }

    pub fn has_subquery(&self) -> bool {
        match self {
            Expression::Exists(_) => true,
            Expression::Alias { child, .. } => child.has_subquery(),
            Expression::BinaryOp { left, right, .. } => {
                left.has_subquery() || right.has_subquery()
            }
            Expression::UnaryOp { input, .. } | Expression::IsNull { input, .. } => {
                input.has_subquery()
            }
            _ => false,
        }
    }

    /// Tables whose record buffers this expression reads.
    pub fn used_tables(&self) -> TableMap {
        match self {
            Expression::FieldRef { table, .. } => TableMap::single(table.id()),
            Expression::Alias { child, .. } => child.used_tables(),
            Expression::BinaryOp { left, right, .. } => {
                left.used_tables() | right.used_tables()
            }
            Expression::UnaryOp { input, .. } | Expression::IsNull { input, .. } => {
                input.used_tables()
            }
            _ => TableMap::empty(),
        }
    }
}

/// An EXISTS subquery. Its iterator tree is compiled on first evaluation and
/// rescanned on every later one.
pub struct Subquery {
    path: AccessPath,
    join: Rc<JoinContext>,
    iterator: RefCell<Option<Box<dyn RowIterator>>>,
}

impl std::fmt::Debug for Subquery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subquery")
            .field("select_number", &self.join.select_number())
            .finish()
    }
}

impl Subquery {
    pub fn new(path: AccessPath, join: Rc<JoinContext>) -> Self {
        Self {
            path,
            join,
            iterator: RefCell::new(None),
        }
    }

    pub fn path(&self) -> &AccessPath {
        &self.path
    }

    pub fn select_number(&self) -> usize {
        self.join.select_number()
    }

    pub fn exists(&self) -> DBResult<bool> {
        let mut slot = self.iterator.try_borrow_mut().map_err(|_| {
            DBError::InterpretingError("subquery evaluated recursively".to_owned())
        })?;
        let iterator = slot.get_or_insert_with(|| {
            create_iterator_from_access_path(&self.path, &self.join, true)
        });
        // only the first row is read, so batch mode must be ended here
        let result = iterator
            .init()
            .and_then(|_| iterator.read())
            .map(|result| result == ReadResult::Row);
        iterator.end_psi_batch_mode_if_started();
        result
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Literal {
    Int32(i32),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Bool(bool),
    String(String),
    DateTime(String),
    Null,
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int32(l0), Self::Int32(r0)) => l0 == r0,
            (Self::Int64(l0), Self::Int64(r0)) => l0 == r0,
            (Self::UInt64(l0), Self::UInt64(r0)) => l0 == r0,
            (Self::Float64(l0), Self::Float64(r0)) => {
                l0 == r0 || (l0.is_nan() && r0.is_nan())
            }
            (Self::Bool(l0), Self::Bool(r0)) => l0 == r0,
            (Self::String(l0), Self::String(r0)) => l0 == r0,
            (Self::DateTime(l0), Self::DateTime(r0)) => l0 == r0,
            (Self::Null, Self::Null) => true,
            _ => false,
        }
    }
}

impl Default for Literal {
    fn default() -> Self {
        Literal::Null
    }
}

/// NaN equals NaN and -0.0 equals 0.0 so literals can key hash maps.
impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Literal::Int32(v) => v.hash(state),
            Literal::Int64(v) => v.hash(state),
            Literal::UInt64(v) => v.hash(state),
            Literal::Float64(v) => {
                let canonical = if *v == 0.0 {
                    0.0f64
                } else if v.is_nan() {
                    f64::NAN
                } else {
                    *v
                };
                canonical.to_bits().hash(state)
            }
            Literal::Bool(v) => v.hash(state),
            Literal::String(v) | Literal::DateTime(v) => v.hash(state),
            Literal::Null => {}
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int32(v) => v.fmt(f),
            Literal::Int64(v) => v.fmt(f),
            Literal::UInt64(v) => v.fmt(f),
            Literal::Float64(v) => v.fmt(f),
            Literal::Bool(v) => v.fmt(f),
            Literal::String(v) => write!(f, "'{v}'"),
            Literal::DateTime(v) => write!(f, "'{v}'"),
            Literal::Null => "NULL".fmt(f),
        }
    }
}

impl Literal {
    /// SQL truth value: NULL counts as false.
    pub fn as_bool(&self) -> DBResult<bool> {
        match self {
            Literal::Bool(v) => Ok(*v),
            Literal::Null => Ok(false),
            _ => Err(DBError::InterpretingError(format!(
                "Cannot convert {self} to bool."
            ))),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// The value as a hash key. Numbers that compare equal share one key,
    /// so `Int32(1)`, `Int64(1)` and `Float64(1.0)` collide.
    pub fn to_key(&self) -> Literal {
        match self {
            Literal::Int32(v) => Literal::Int64(*v as i64),
            Literal::UInt64(v) => i64::try_from(*v).map_or(Literal::UInt64(*v), Literal::Int64),
            Literal::Float64(v) if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 => {
                Literal::Int64(*v as i64)
            }
            other => other.clone(),
        }
    }

    /// Convert a numeric value to a numeric column type. Values that would
    /// lose precision, and non-numeric values, are returned unchanged.
    pub fn cast_to(self, data_type: &DataType) -> Literal {
        let converted = match (&self, data_type) {
            _ if self.data_type() == *data_type => None,
            (_, DataType::Int32) => match self.to_key() {
                Literal::Int64(v) => i32::try_from(v).ok().map(Literal::Int32),
                _ => None,
            },
            (_, DataType::Int64) => match self.to_key() {
                Literal::Int64(v) => Some(Literal::Int64(v)),
                _ => None,
            },
            (_, DataType::UInt64) => match self.to_key() {
                Literal::Int64(v) => u64::try_from(v).ok().map(Literal::UInt64),
                _ => None,
            },
            (Literal::Int32(v), DataType::Float64) => Some(Literal::Float64(*v as f64)),
            (Literal::Int64(v), DataType::Float64) if v.unsigned_abs() <= 1 << 53 => {
                Some(Literal::Float64(*v as f64))
            }
            (Literal::UInt64(v), DataType::Float64) if *v <= 1 << 53 => Some(Literal::Float64(*v as f64)),
            _ => None,
        };
        converted.unwrap_or(self)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Literal::Int32(_) => DataType::Int32,
            Literal::Int64(_) => DataType::Int64,
            Literal::UInt64(_) => DataType::UInt64,
            Literal::Float64(_) => DataType::Float64,
            Literal::Bool(_) => DataType::Boolean,
            Literal::String(_) => DataType::String,
            Literal::DateTime(_) => DataType::DateTime,
            Literal::Null => DataType::Unknown,
        }
    }

    /// parse a textual value (csv cell, plan file cell) into the given data type
    pub fn parse_as(value: &str, data_type: &DataType) -> DBResult<Literal> {
        if value.eq_ignore_ascii_case("null") {
            return Ok(Literal::Null);
        }
        match data_type {
            DataType::Int32 => Ok(Literal::Int32(value.parse::<i32>()?)),
            DataType::Int64 => Ok(Literal::Int64(value.parse::<i64>()?)),
            DataType::UInt64 => Ok(Literal::UInt64(value.parse::<u64>()?)),
            DataType::Float64 => Ok(Literal::Float64(value.parse::<f64>()?)),
            DataType::Boolean => Ok(Literal::Bool(value.to_lowercase() == "true")),
            DataType::DateTime => Ok(Literal::DateTime(value.to_owned())),
            DataType::String | DataType::Unknown => Ok(Literal::String(value.to_owned())),
        }
    }
}
