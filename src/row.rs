use crate::expressions::Literal;
use crate::{DBError, DBResult};

/// Position of a row inside its table store; enough to fetch it again.
pub type RowId = u64;

/// The record buffer of a table: the row an iterator most recently produced
/// for that table. Parents read rows from here instead of receiving them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub values: Vec<Literal>,
    pub null_row: bool,
    /// Present only when the table is asked to keep row ids.
    pub row_id: Option<RowId>,
}

impl Record {
    pub fn new(values: Vec<Literal>, row_id: Option<RowId>) -> Self {
        Record {
            values,
            null_row: false,
            row_id,
        }
    }

    pub fn num_fields(&self) -> usize {
        self.values.len()
    }

    pub fn get_field(&self, index: usize) -> DBResult<Literal> {
        if self.null_row {
            return Ok(Literal::Null);
        }
        match self.values.get(index) {
            None => Err(DBError::InterpretingError(format!(
                "field index {index} out of bound for record with {} fields",
                self.values.len()
            ))),
            Some(literal) => Ok(literal.clone()),
        }
    }
}
