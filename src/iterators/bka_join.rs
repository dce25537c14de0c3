use std::rc::Rc;

use crate::{access_path::JoinType, context::ExecContext, row::Record, tables::TableRef, DBResult};

use super::{ReadResult, RowIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NeedOuterRows,
    ReturningJoinedRows,
    EndOfRows,
}

/// Batched key access: buffers up to `batch_size` outer rows, then runs the
/// multi-range-read inner lookup for each buffered row in turn.
pub struct BkaIterator {
    ctx: Rc<ExecContext>,
    outer: Box<dyn RowIterator>,
    inner: Box<dyn RowIterator>,
    outer_tables: Vec<TableRef>,
    join_type: JoinType,
    batch_size: usize,
    pfs_batch_mode: bool,
    state: State,
    outer_rows: Vec<Vec<Record>>,
    outer_exhausted: bool,
    current: usize,
    matched: bool,
    advance_pending: bool,
}

impl BkaIterator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: Rc<ExecContext>,
        outer: Box<dyn RowIterator>,
        inner: Box<dyn RowIterator>,
        outer_tables: Vec<TableRef>,
        join_type: JoinType,
        batch_size: usize,
        pfs_batch_mode: bool,
    ) -> Self {
        Self {
            ctx,
            outer,
            inner,
            outer_tables,
            join_type,
            batch_size: batch_size.max(1),
            pfs_batch_mode,
            state: State::NeedOuterRows,
            outer_rows: vec![],
            outer_exhausted: false,
            current: 0,
            matched: false,
            advance_pending: false,
        }
    }

    fn end_inner_batch_mode(&mut self) {
        if self.pfs_batch_mode {
            self.inner.end_psi_batch_mode_if_started();
        }
    }

    fn fill_outer_rows(&mut self) -> DBResult<()> {
        self.outer_rows.clear();
        while self.outer_rows.len() < self.batch_size {
            self.ctx.check_killed()?;
            if self.outer.read()? == ReadResult::EndOfStream {
                self.outer_exhausted = true;
                break;
            }
            self.outer_rows
                .push(self.outer_tables.iter().map(|t| t.snapshot()).collect());
        }
        log::trace!("batched key access buffered {} outer rows", self.outer_rows.len());
        Ok(())
    }

    fn start_lookup(&mut self) -> DBResult<()> {
        for (table, record) in self.outer_tables.iter().zip(self.outer_rows[self.current].iter()) {
            table.restore(record);
        }
        self.matched = false;
        self.inner.set_null_row_flag(false);
        if let Err(e) = self.inner.init() {
            self.end_inner_batch_mode();
            return Err(e);
        }
        Ok(())
    }

    fn advance(&mut self) -> DBResult<bool> {
        self.current += 1;
        if self.current < self.outer_rows.len() {
            self.start_lookup()?;
            return Ok(true);
        }
        self.end_inner_batch_mode();
        self.state = if self.outer_exhausted {
            State::EndOfRows
        } else {
            State::NeedOuterRows
        };
        Ok(false)
    }
}

impl RowIterator for BkaIterator {
    fn init(&mut self) -> DBResult<()> {
        self.end_inner_batch_mode();
        self.outer.init()?;
        self.outer_rows.clear();
        self.outer_exhausted = false;
        self.advance_pending = false;
        self.state = State::NeedOuterRows;
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        loop {
            match self.state {
                State::EndOfRows => return Ok(ReadResult::EndOfStream),
                State::NeedOuterRows => {
                    self.fill_outer_rows()?;
                    if self.outer_rows.is_empty() {
                        self.state = State::EndOfRows;
                        return Ok(ReadResult::EndOfStream);
                    }
                    if self.pfs_batch_mode {
                        self.inner.start_psi_batch_mode();
                    }
                    self.current = 0;
                    self.start_lookup()?;
                    self.state = State::ReturningJoinedRows;
                }
                State::ReturningJoinedRows => {
                    if self.advance_pending {
                        self.advance_pending = false;
                        if !self.advance()? {
                            continue;
                        }
                    }
                    let result = self.inner.read();
                    if result.is_err() {
                        self.end_inner_batch_mode();
                    }
                    let result = result?;
                    if let Err(e) = self.ctx.check_killed() {
                        self.end_inner_batch_mode();
                        return Err(e);
                    }
                    match (result, self.join_type) {
                        (ReadResult::EndOfStream, join_type) => {
                            if !self.matched
                                && matches!(join_type, JoinType::Outer | JoinType::Anti)
                            {
                                self.inner.set_null_row_flag(true);
                                self.advance_pending = true;
                                return Ok(ReadResult::Row);
                            }
                            self.advance()?;
                        }
                        (ReadResult::Row, JoinType::Anti) => {
                            self.advance()?;
                        }
                        (ReadResult::Row, JoinType::Semi) => {
                            self.advance_pending = true;
                            return Ok(ReadResult::Row);
                        }
                        (ReadResult::Row, JoinType::Inner | JoinType::Outer) => {
                            self.matched = true;
                            return Ok(ReadResult::Row);
                        }
                    }
                }
            }
        }
    }

    fn unlock_row(&mut self) {}

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        self.outer.set_null_row_flag(is_null_row);
        self.inner.set_null_row_flag(is_null_row);
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        self.outer.end_psi_batch_mode_if_started();
        self.inner.end_psi_batch_mode_if_started();
    }
}
