pub mod access_path;
pub mod aggregators;
pub mod compiler;
pub mod config;
pub mod context;
pub mod data_types;
mod errors;
pub mod explain;
pub mod expressions;
pub mod interpreter;
pub mod iterators;
pub mod parser;
pub mod plan_file;
pub mod query;
pub mod row;
pub mod tables;

pub use errors::*;

use serde::Serialize;

use crate::expressions::Literal;

#[derive(Debug, PartialEq, Serialize)]
pub struct ResultSet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Literal>>,
}

impl ResultSet {
    pub fn empty() -> Self {
        ResultSet {
            headers: vec![],
            rows: vec![],
        }
    }

    pub fn new(headers: Vec<String>, rows: Vec<Vec<Literal>>) -> Self {
        ResultSet { headers, rows }
    }
}
