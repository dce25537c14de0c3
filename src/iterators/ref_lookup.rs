use std::rc::Rc;

use crate::{
    context::JoinContext,
    expressions::{Expression, Literal},
    interpreter::{booleans::cmp_impl, Interpreter},
    row::RowId,
    tables::TableRef,
    DBResult,
};

use super::{table_scan::BatchMode, ReadResult, RowIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Ref,
    /// At most one row; the lookup is cached while the key is unchanged.
    EqRef,
    Mrr,
}

/// Key lookup on one column. The key expression is evaluated at `init()`,
/// usually over the current rows of outer tables. A NULL key matches nothing.
pub struct RefIterator {
    kind: RefKind,
    table: TableRef,
    key_column: usize,
    key: Expression,
    join: Rc<JoinContext>,
    matches: Vec<RowId>,
    pos: usize,
    cached_key: Option<Literal>,
    batch_mode: BatchMode,
}

impl RefIterator {
    pub fn new(
        kind: RefKind,
        table: TableRef,
        key_column: usize,
        key: Expression,
        join: Rc<JoinContext>,
    ) -> Self {
        Self {
            batch_mode: BatchMode::new(Rc::clone(join.exec_context())),
            kind,
            table,
            key_column,
            key,
            join,
            matches: vec![],
            pos: 0,
            cached_key: None,
        }
    }

    fn lookup(&self, key: &Literal) -> DBResult<Vec<RowId>> {
        let storage = self.table.storage().borrow();
        let mut matches = vec![];
        for row_id in 0..storage.num_rows() as RowId {
            let values = storage.fetch(row_id)?;
            let Some(value) = values.get(self.key_column) else {
                continue;
            };
            if !value.is_null() && cmp_impl(value, key)?.is_eq() {
                matches.push(row_id);
                if self.kind == RefKind::EqRef {
                    break;
                }
            }
        }
        Ok(matches)
    }
}

impl RowIterator for RefIterator {
    fn init(&mut self) -> DBResult<()> {
        self.pos = 0;
        let key = Interpreter::eval(&self.key, &self.join)?;
        if key.is_null() {
            self.matches.clear();
            self.cached_key = None;
            return Ok(());
        }
        if self.kind == RefKind::EqRef && self.cached_key.as_ref() == Some(&key) {
            log::trace!("eq_ref on {} reuses cached lookup", self.table.name());
            return Ok(());
        }
        self.matches = self.lookup(&key)?;
        self.cached_key = Some(key);
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        self.join.exec_context().check_killed()?;
        let Some(&row_id) = self.matches.get(self.pos) else {
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
