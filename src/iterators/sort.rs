use std::cmp::Ordering;
use std::rc::Rc;

use crate::{
    context::JoinContext,
    expressions::{Expression, Literal},
    interpreter::Interpreter,
    row::{Record, RowId},
    tables::TableRef,
    DBError, DBResult,
};

use super::{ReadResult, RowIterator, NO_LIMIT};

#[derive(Debug, Clone)]
pub struct SortKey {
    pub expr: Expression,
    pub asc: bool,
}

impl SortKey {
    pub fn asc(expr: Expression) -> Self {
        Self { expr, asc: true }
    }

    pub fn desc(expr: Expression) -> Self {
        Self { expr, asc: false }
    }
}

enum SortedRecord {
    RowId(RowId),
    Record(Record),
}

struct SortedRow {
    keys: Vec<Literal>,
    records: Vec<SortedRecord>,
}

/// Buffers the whole input, then returns it ordered by the sort keys. Tables
/// asked to keep row ids are buffered by row id and re-fetched when read.
pub struct SortIterator {
    child: Box<dyn RowIterator>,
    join: Rc<JoinContext>,
    tables: Vec<TableRef>,
    order: Vec<SortKey>,
    remove_duplicates: bool,
    use_row_ids: bool,
    limit: u64,
    rows: Vec<SortedRow>,
    pos: usize,
}

impl SortIterator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        child: Box<dyn RowIterator>,
        join: Rc<JoinContext>,
        tables: Vec<TableRef>,
        order: Vec<SortKey>,
        remove_duplicates: bool,
        use_row_ids: bool,
        limit: u64,
    ) -> Self {
        Self {
            child,
            join,
            tables,
            order,
            remove_duplicates,
            use_row_ids,
            limit,
            rows: vec![],
            pos: 0,
        }
    }

    fn buffer_current_row(&self) -> DBResult<SortedRow> {
        let keys = self
            .order
            .iter()
            .map(|key| Interpreter::eval(&key.expr, &self.join))
            .collect::<DBResult<Vec<_>>>()?;
        let records = self
            .tables
            .iter()
            .map(|table| match table.row_id() {
                Some(row_id) if self.use_row_ids && !table.is_null_row() => {
                    SortedRecord::RowId(row_id)
                }
                _ => SortedRecord::Record(table.snapshot()),
            })
            .collect();
        Ok(SortedRow { keys, records })
    }

    fn compare(&self, left: &[Literal], right: &[Literal]) -> DBResult<Ordering> {
        for ((l, r), key) in left.iter().zip(right.iter()).zip(self.order.iter()) {
            let ordering = Interpreter::compare(l, r)?;
            let ordering = if key.asc { ordering } else { ordering.reverse() };
            if ordering.is_ne() {
                return Ok(ordering);
            }
        }
        Ok(Ordering::Equal)
    }

    fn sort_rows(&self, rows: &mut [SortedRow]) -> DBResult<()> {
        let mut error: Option<DBError> = None;
        rows.sort_by(|left, right| {
            self.compare(&left.keys, &right.keys).unwrap_or_else(|e| {
                error.get_or_insert(e);
                Ordering::Equal
            })
        });
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl RowIterator for SortIterator {
    fn init(&mut self) -> DBResult<()> {
        self.child.init()?;
        let mut rows = vec![];
        loop {
            self.join.exec_context().check_killed()?;
            if self.child.read()? == ReadResult::EndOfStream {
                break;
            }
            rows.push(self.buffer_current_row()?);
        }
        self.sort_rows(&mut rows)?;
        if self.remove_duplicates {
            rows.dedup_by(|right, left| left.keys == right.keys);
        }
        if self.limit != NO_LIMIT {
            rows.truncate(usize::try_from(self.limit).unwrap_or(usize::MAX));
        }
        log::trace!("sorted {} rows", rows.len());
        self.rows = rows;
        self.pos = 0;
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        let Some(row) = self.rows.get(self.pos) else {
            return Ok(ReadResult::EndOfStream);
        };
        for (table, record) in self.tables.iter().zip(row.records.iter()) {
            match record {
                SortedRecord::RowId(row_id) => table.load_row(*row_id)?,
                SortedRecord::Record(record) => table.restore(record),
            }
        }
        self.pos += 1;
        Ok(ReadResult::Row)
    }

    fn unlock_row(&mut self) {}

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        self.child.set_null_row_flag(is_null_row)
    }

    fn start_psi_batch_mode(&mut self) {
        self.child.start_psi_batch_mode()
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        self.child.end_psi_batch_mode_if_started()
    }
}
