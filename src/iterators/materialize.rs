use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::{
    context::{ExecContext, JoinContext},
    expressions::{Expression, Literal},
    interpreter::Interpreter,
    tables::{Table, TempTable, WriteError},
    DBError, DBResult,
};

use super::{ReadResult, RowIterator, NO_LIMIT};

/// One query block written into the temp table.
pub struct MaterializeQueryBlock {
    pub iterator: Box<dyn RowIterator>,
    pub join: Rc<JoinContext>,
    /// Evaluated per subquery row into the temp table columns.
    pub copy_fields: Vec<Expression>,
    /// Skip the unique check for this block, e.g. the UNION ALL part of a
    /// mixed union.
    pub disable_deduplication: bool,
    pub pfs_batch_mode: bool,
}

/// Runs its query blocks into a temp table once, then serves reads from
/// the table. Later `init()` calls only rescan the table, unless the
/// materialization must be redone: `rematerialize` is set or an
/// invalidator produced rows since.
pub struct MaterializeIterator {
    ctx: Rc<ExecContext>,
    query_blocks: Vec<MaterializeQueryBlock>,
    temp_table: Rc<RefCell<TempTable>>,
    table_iterator: Box<dyn RowIterator>,
    rematerialize: bool,
    limit_rows: u64,
    invalidators: Vec<(Rc<Cell<u64>>, u64)>,
    materialized: bool,
}

impl MaterializeIterator {
    pub fn new(
        ctx: Rc<ExecContext>,
        query_blocks: Vec<MaterializeQueryBlock>,
        temp_table: Rc<RefCell<TempTable>>,
        table_iterator: Box<dyn RowIterator>,
        rematerialize: bool,
        limit_rows: u64,
        invalidators: Vec<Rc<Cell<u64>>>,
    ) -> Self {
        Self {
            ctx,
            query_blocks,
            temp_table,
            table_iterator,
            rematerialize,
            limit_rows,
            invalidators: invalidators.into_iter().map(|g| (g, 0)).collect(),
            materialized: false,
        }
    }

    fn invalidated(&self) -> bool {
        self.invalidators
            .iter()
            .any(|(generation, seen)| generation.get() != *seen)
    }

    fn materialize(&mut self) -> DBResult<()> {
        {
            let mut table = self.temp_table.borrow_mut();
            table.instantiate();
            table.reset()?;
        }
        for block in self.query_blocks.iter_mut() {
            if self.limit_rows != NO_LIMIT
                && self.temp_table.borrow().num_rows() as u64 >= self.limit_rows
            {
                break;
            }
            if block.pfs_batch_mode {
                block.iterator.start_psi_batch_mode();
            }
            let result =
                materialize_query_block(&self.ctx, block, &self.temp_table, self.limit_rows);
            block.iterator.end_psi_batch_mode_if_started();
            result?;
        }
        for (generation, seen) in self.invalidators.iter_mut() {
            *seen = generation.get();
        }
        log::debug!(
            "materialized {} rows into {}",
            self.temp_table.borrow().num_rows(),
            self.temp_table.borrow().name()
        );
        Ok(())
    }
}

fn materialize_query_block(
    ctx: &ExecContext,
    block: &mut MaterializeQueryBlock,
    temp_table: &RefCell<TempTable>,
    limit_rows: u64,
) -> DBResult<()> {
    block.iterator.init()?;
    loop {
        ctx.check_killed()?;
        if limit_rows != NO_LIMIT && temp_table.borrow().num_rows() as u64 >= limit_rows {
            return Ok(());
        }
        if block.iterator.read()? == ReadResult::EndOfStream {
            return Ok(());
        }
        let values = Interpreter::eval_all(&block.copy_fields, &block.join)?;
        write_row(temp_table, values, !block.disable_deduplication)?;
    }
}

fn write_row(
    temp_table: &RefCell<TempTable>,
    values: Vec<Literal>,
    check_unique: bool,
) -> DBResult<()> {
    let mut table = temp_table.borrow_mut();
    let mut result = table.write_row(values.clone(), check_unique);
    if result == Err(WriteError::TableFull) {
        table.convert_to_disk()?;
        result = table.write_row(values, check_unique);
    }
    match result {
        Ok(()) => Ok(()),
        // deduplicated
        Err(e) if e.is_ignorable() => Ok(()),
        Err(WriteError::Storage(e)) => Err(e),
        Err(_) => Err(DBError::StorageEngine(format!(
            "temp table {} is full",
            table.name()
        ))),
    }
}

impl RowIterator for MaterializeIterator {
    fn init(&mut self) -> DBResult<()> {
        if !self.materialized || self.rematerialize || self.invalidated() {
            self.materialized = false;
            self.materialize()?;
            self.materialized = true;
        } else {
            log::trace!(
                "{} already materialized, rescanning",
                self.temp_table.borrow().name()
            );
        }
        self.table_iterator.init()
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        self.table_iterator.read()
    }

    fn unlock_row(&mut self) {}

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        self.table_iterator.set_null_row_flag(is_null_row)
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        for block in self.query_blocks.iter_mut() {
            block.iterator.end_psi_batch_mode_if_started();
        }
        self.table_iterator.end_psi_batch_mode_if_started();
    }
}
