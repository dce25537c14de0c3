use std::rc::Rc;

use crate::{
    context::ExecContext, interpreter::Interpreter, row::RowId, tables::TableRef,
    DBResult,
};

use super::{ReadResult, RowIterator};

pub(crate) struct BatchMode {
    ctx: Rc<ExecContext>,
    started: bool,
}

impl BatchMode {
    pub(crate) fn new(ctx: Rc<ExecContext>) -> Self {
        Self {
            ctx,
            started: false,
        }
    }

    pub(crate) fn start(&mut self) {
        if !self.started {
            self.started = true;
            self.ctx.enter_batch_mode();
        }
    }

    pub(crate) fn end(&mut self) {
        if self.started {
            self.started = false;
            self.ctx.leave_batch_mode();
        }
    }
}

impl Drop for BatchMode {
    fn drop(&mut self) {
        self.end();
    }
}

pub struct TableScanIterator {
    ctx: Rc<ExecContext>,
    table: TableRef,
    next_row: RowId,
    batch_mode: BatchMode,
}

impl TableScanIterator {
    pub fn new(ctx: Rc<ExecContext>, table: TableRef) -> Self {
        Self {
            batch_mode: BatchMode::new(Rc::clone(&ctx)),
            ctx,
            table,
            next_row: 0,
        }
    }
}

impl RowIterator for TableScanIterator {
    fn init(&mut self) -> DBResult<()> {
        self.next_row = 0;
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        self.ctx.check_killed()?;
        let values = {
            let storage = self.table.storage().borrow();
            if self.next_row >= storage.num_rows() as RowId {
                return Ok(ReadResult::EndOfStream);
            }
            storage.fetch(self.next_row)?
        };
        self.table.set_row(values, self.next_row);
        self.next_row += 1;
        Ok(ReadResult::Row)
    }

    fn unlock_row(&mut self) {}

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        self.table.set_null_row(is_null_row)
    }

    fn start_psi_batch_mode(&mut self) {
        self.batch_mode.start()
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        self.batch_mode.end()
    }
}

/// Reads all rows of a table ordered by one key column. NULL keys come first.
pub struct IndexScanIterator {
    ctx: Rc<ExecContext>,
    table: TableRef,
    key_column: usize,
    reverse: bool,
    order: Vec<RowId>,
    pos: usize,
    batch_mode: BatchMode,
}

impl IndexScanIterator {
    pub fn new(ctx: Rc<ExecContext>, table: TableRef, key_column: usize, reverse: bool) -> Self {
        Self {
            batch_mode: BatchMode::new(Rc::clone(&ctx)),
            ctx,
            table,
            key_column,
            reverse,
            order: vec![],
            pos: 0,
        }
    }

    fn build_order(&self) -> DBResult<Vec<RowId>> {
        let storage = self.table.storage().borrow();
        let mut keyed = (0..storage.num_rows() as RowId)
            .map(|row_id| {
                let mut values = storage.fetch(row_id)?;
                let key = values
                    .get_mut(self.key_column)
                    .map(std::mem::take)
                    .unwrap_or_default();
                Ok((key, row_id))
            })
            .collect::<DBResult<Vec<_>>>()?;
        let mut error = None;
        keyed.sort_by(|(l, l_id), (r, r_id)| {
            Interpreter::compare(l, r)
                .unwrap_or_else(|e| {
                    error.get_or_insert(e);
                    std::cmp::Ordering::Equal
                })
                .then(l_id.cmp(r_id))
        });
        if let Some(e) = error {
            return Err(e);
        }
        let mut order: Vec<RowId> = keyed.into_iter().map(|(_, row_id)| row_id).collect();
        if self.reverse {
            order.reverse();
        }
        Ok(order)
    }
}

impl RowIterator for IndexScanIterator {
    fn init(&mut self) -> DBResult<()> {
        self.order = self.build_order()?;
        self.pos = 0;
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        self.ctx.check_killed()?;
        let Some(&row_id) = self.order.get(self.pos) else {
            return Ok(ReadResult::EndOfStream);
        };
        let values = self.table.storage().borrow().fetch(row_id)?;
        self.table.set_row(values, row_id);
        self.pos += 1;
        Ok(ReadResult::Row)
    }

    fn unlock_row(&mut self) {}

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        self.table.set_null_row(is_null_row)
    }

    fn start_psi_batch_mode(&mut self) {
        self.batch_mode.start()
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        self.batch_mode.end()
    }
}
