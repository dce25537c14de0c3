use crate::{tables::TableRef, DBResult};

use super::{set_null_row, ReadResult, RowIterator};

/// Never returns a row. `tables` are the tables of the subtree the plan
/// pruned away; outer joins still NULL-complement them.
pub struct ZeroRowsIterator {
    tables: Vec<TableRef>,
}

impl ZeroRowsIterator {
    pub fn new(tables: Vec<TableRef>) -> Self {
        Self { tables }
    }
}

impl RowIterator for ZeroRowsIterator {
    fn init(&mut self) -> DBResult<()> {
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        Ok(ReadResult::EndOfStream)
    }

    fn unlock_row(&mut self) {}

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        set_null_row(&self.tables, is_null_row)
    }
}

/// One row without any table, for queries like `SELECT 1`.
#[derive(Default)]
pub struct FakeSingleRowIterator {
    done: bool,
}

impl FakeSingleRowIterator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowIterator for FakeSingleRowIterator {
    fn init(&mut self) -> DBResult<()> {
        self.done = false;
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        if self.done {
            return Ok(ReadResult::EndOfStream);
        }
        self.done = true;
        Ok(ReadResult::Row)
    }

    fn unlock_row(&mut self) {}

    fn set_null_row_flag(&mut self, _is_null_row: bool) {}
}
