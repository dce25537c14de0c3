use std::fmt::Display;
use std::num::{ParseFloatError, ParseIntError};

use sqlparser::parser::ParserError;

#[derive(Debug, PartialEq, Eq)]
pub enum DBError {
    ParserError(String),
    TableNotFound(String),
    InterpretingError(String),
    StorageEngine(String),
    Cancelled,
    Config(String),
    Unknown(String),
}

pub type DBResult<T> = Result<T, DBError>;

impl Display for DBError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DBError::ParserError(msg) => write!(f, "parser error: {msg}"),
            DBError::TableNotFound(name) => write!(f, "table \"{name}\" does not exist"),
            DBError::InterpretingError(msg) => write!(f, "evaluation error: {msg}"),
            DBError::StorageEngine(msg) => write!(f, "storage error: {msg}"),
            DBError::Cancelled => "query execution was interrupted".fmt(f),
            DBError::Config(msg) => write!(f, "configuration error: {msg}"),
            DBError::Unknown(msg) => msg.fmt(f),
        }
    }
}

impl std::error::Error for DBError {}

impl From<ParserError> for DBError {
    fn from(e: ParserError) -> Self {
        DBError::ParserError(e.to_string())
    }
}

impl From<ParseIntError> for DBError {
    fn from(e: ParseIntError) -> Self {
        DBError::ParserError(e.to_string())
    }
}

impl From<ParseFloatError> for DBError {
    fn from(e: ParseFloatError) -> Self {
        DBError::ParserError(e.to_string())
    }
}

impl From<std::io::Error> for DBError {
    fn from(e: std::io::Error) -> Self {
        DBError::StorageEngine(e.to_string())
    }
}

impl From<serde_json::Error> for DBError {
    fn from(e: serde_json::Error) -> Self {
        DBError::StorageEngine(format!("serialization failed: {e}"))
    }
}
