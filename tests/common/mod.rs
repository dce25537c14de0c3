#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crackexec::{
    config::ExecutorConfig,
    context::{ExecContext, JoinContext},
    data_types::DataType,
    expressions::{Expression, Literal},
    interpreter::Interpreter,
    iterators::{ReadResult, RowIterator},
    tables::{FieldInfo, InMemTable, RelationSchema, TableRef},
    DBError, DBResult,
};

pub fn exec_context() -> Rc<ExecContext> {
    ExecContext::new(ExecutorConfig::default())
}

pub fn join_context(ctx: &Rc<ExecContext>) -> Rc<JoinContext> {
    Rc::new(JoinContext::new(ctx, 1))
}

pub fn table(
    ctx: &ExecContext,
    name: &str,
    columns: &[(&str, DataType)],
    rows: Vec<Vec<Literal>>,
) -> TableRef {
    let schema = RelationSchema::new(
        columns
            .iter()
            .map(|(c, data_type)| FieldInfo::new(c.to_string(), data_type.clone()))
            .collect(),
    );
    let table = InMemTable::with_rows(schema, rows).unwrap();
    ctx.new_table(name, Rc::new(RefCell::new(table)))
}

/// Registers an Int32 table with the given columns and rows.
pub fn int_table(ctx: &ExecContext, name: &str, columns: &[&str], rows: &[&[i32]]) -> TableRef {
    let columns: Vec<_> = columns.iter().map(|c| (*c, DataType::Int32)).collect();
    table(ctx, name, &columns, rows.iter().map(|row| ints(row)).collect())
}

/// A single Int64 column table.
pub fn bigint_table(ctx: &ExecContext, name: &str, column: &str, values: &[i64]) -> TableRef {
    let rows = values.iter().map(|v| vec![Literal::Int64(*v)]).collect();
    table(ctx, name, &[(column, DataType::Int64)], rows)
}

pub fn ints(values: &[i32]) -> Vec<Literal> {
    values.iter().map(|v| Literal::Int32(*v)).collect()
}

/// init() then read to the end, evaluating `outputs` per row.
pub fn collect(
    iterator: &mut dyn RowIterator,
    join: &JoinContext,
    outputs: &[Expression],
) -> DBResult<Vec<Vec<Literal>>> {
    iterator.init()?;
    let mut rows = vec![];
    while iterator.read()? == ReadResult::Row {
        rows.push(Interpreter::eval_all(outputs, join)?);
    }
    Ok(rows)
}

/// Counters shared between a test and its [`MockIterator`].
#[derive(Default)]
pub struct MockStats {
    pub inits: Cell<usize>,
    pub reads: Cell<usize>,
    pub unlocks: Cell<usize>,
}

/// Replays fixed rows into a table's record buffer. Can fail at a given
/// read to test error propagation.
pub struct MockIterator {
    table: TableRef,
    rows: Vec<Vec<Literal>>,
    pos: usize,
    fail_at: Option<usize>,
    stats: Rc<MockStats>,
    batch_mode: Option<Rc<ExecContext>>,
    in_batch_mode: bool,
}

impl MockIterator {
    pub fn new(table: &TableRef, rows: Vec<Vec<Literal>>) -> Self {
        Self {
            table: Rc::clone(table),
            rows,
            pos: 0,
            fail_at: None,
            stats: Rc::new(MockStats::default()),
            batch_mode: None,
            in_batch_mode: false,
        }
    }

    pub fn failing_at(mut self, read: usize) -> Self {
        self.fail_at = Some(read);
        self
    }

    /// Count batch mode on `ctx` the way leaf scans do.
    pub fn with_batch_mode(mut self, ctx: &Rc<ExecContext>) -> Self {
        self.batch_mode = Some(Rc::clone(ctx));
        self
    }

    pub fn stats(&self) -> Rc<MockStats> {
        Rc::clone(&self.stats)
    }
}

impl RowIterator for MockIterator {
    fn init(&mut self) -> DBResult<()> {
        self.pos = 0;
        self.stats.inits.set(self.stats.inits.get() + 1);
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        self.stats.reads.set(self.stats.reads.get() + 1);
        if self.fail_at == Some(self.pos) {
            return Err(DBError::StorageEngine("injected read error".to_owned()));
        }
        let Some(row) = self.rows.get(self.pos) else {
            return Ok(ReadResult::EndOfStream);
        };
        self.table.set_row(row.clone(), self.pos as u64);
        self.pos += 1;
        Ok(ReadResult::Row)
    }

    fn unlock_row(&mut self) {
        self.stats.unlocks.set(self.stats.unlocks.get() + 1);
    }

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        self.table.set_null_row(is_null_row)
    }

    fn start_psi_batch_mode(&mut self) {
        if let (Some(ctx), false) = (self.batch_mode.as_ref(), self.in_batch_mode) {
            ctx.enter_batch_mode();
            self.in_batch_mode = true;
        }
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        if let (Some(ctx), true) = (self.batch_mode.as_ref(), self.in_batch_mode) {
            ctx.leave_batch_mode();
            self.in_batch_mode = false;
        }
    }
}
