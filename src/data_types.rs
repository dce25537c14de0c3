use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int32,
    Int64,
    UInt64,
    Float64,
    String,
    Boolean,
    DateTime,
    Unknown,
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64 | Self::UInt64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Self::Float64)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<sqlparser::ast::DataType> for DataType {
    fn from(dt: sqlparser::ast::DataType) -> Self {
        match dt {
            sqlparser::ast::DataType::TinyInt(_) => DataType::Int32,
            sqlparser::ast::DataType::SmallInt(_) => DataType::Int32,
            sqlparser::ast::DataType::Int(_) => DataType::Int32,
            sqlparser::ast::DataType::Integer(_) => DataType::Int32,
            sqlparser::ast::DataType::BigInt(_) => DataType::Int64,
            sqlparser::ast::DataType::UnsignedInt(_) => DataType::UInt64,
            sqlparser::ast::DataType::UnsignedInteger(_) => DataType::UInt64,
            sqlparser::ast::DataType::UnsignedBigInt(_) => DataType::UInt64,
            sqlparser::ast::DataType::Float(_) => DataType::Float64,
            sqlparser::ast::DataType::Real => DataType::Float64,
            sqlparser::ast::DataType::Double => DataType::Float64,
            sqlparser::ast::DataType::DoublePrecision => DataType::Float64,
            sqlparser::ast::DataType::Boolean => DataType::Boolean,
            sqlparser::ast::DataType::Datetime(_) => DataType::DateTime,
            sqlparser::ast::DataType::Timestamp(_, _) => DataType::DateTime,
            sqlparser::ast::DataType::Text => DataType::String,
            sqlparser::ast::DataType::String => DataType::String,
            sqlparser::ast::DataType::Varchar(_) => DataType::String,
            sqlparser::ast::DataType::Char(_) => DataType::String,
            _ => DataType::Unknown,
        }
    }
}
