use std::collections::HashSet;

use crate::{row::RowId, tables::TableRef, DBError, DBResult};

use super::{ReadResult, RowIterator};

/// Removes duplicate combinations of the weedout tables' rows, as produced
/// by a semijoin executed as a plain join. Rows are told apart by row id.
pub struct WeedoutIterator {
    child: Box<dyn RowIterator>,
    tables: Vec<TableRef>,
    seen: HashSet<Vec<Option<RowId>>>,
}

impl WeedoutIterator {
    pub fn new(child: Box<dyn RowIterator>, tables: Vec<TableRef>) -> Self {
        Self {
            child,
            tables,
            seen: HashSet::new(),
        }
    }

    fn current_row_ids(&self) -> DBResult<Vec<Option<RowId>>> {
        self.tables
            .iter()
            .map(|table| {
                if table.is_null_row() {
                    return Ok(None);
                }
                table.row_id().map(Some).ok_or_else(|| {
                    DBError::StorageEngine(format!(
                        "weedout needs the row id of table {}",
                        table.name()
                    ))
                })
            })
            .collect()
    }
}

impl RowIterator for WeedoutIterator {
    fn init(&mut self) -> DBResult<()> {
        self.seen.clear();
        self.child.init()
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        loop {
            if self.child.read()? == ReadResult::EndOfStream {
                return Ok(ReadResult::EndOfStream);
            }
            if self.seen.insert(self.current_row_ids()?) {
                return Ok(ReadResult::Row);
            }
            self.child.unlock_row();
        }
    }

    fn unlock_row(&mut self) {
        self.child.unlock_row()
    }

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        self.child.set_null_row_flag(is_null_row)
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        self.child.end_psi_batch_mode_if_started()
    }
}
