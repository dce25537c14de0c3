use std::rc::Rc;

use crate::{access_path::JoinType, context::ExecContext, DBResult};

use super::{ReadResult, RowIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NeedsOuterRow,
    ReadingFirstInnerRow,
    ReadingInnerRows,
    EndOfRows,
}

/// Joins by rescanning the inner side once per outer row.
///
/// Batch mode on the inner side is ended whenever the join stops reading it:
/// inner errors, inner end of stream, a finished semi or anti match,
/// cancellation, a failed inner `init()` and rescans.
pub struct NestedLoopIterator {
    ctx: Rc<ExecContext>,
    outer: Box<dyn RowIterator>,
    inner: Box<dyn RowIterator>,
    join_type: JoinType,
    pfs_batch_mode: bool,
    state: State,
}

impl NestedLoopIterator {
    pub fn new(
        ctx: Rc<ExecContext>,
        outer: Box<dyn RowIterator>,
        inner: Box<dyn RowIterator>,
        join_type: JoinType,
        pfs_batch_mode: bool,
    ) -> Self {
        Self {
            ctx,
            outer,
            inner,
            join_type,
            pfs_batch_mode,
            state: State::NeedsOuterRow,
        }
    }

    fn end_inner_batch_mode(&mut self) {
        if self.pfs_batch_mode {
            self.inner.end_psi_batch_mode_if_started();
        }
    }
}

impl RowIterator for NestedLoopIterator {
    fn init(&mut self) -> DBResult<()> {
        self.outer.init()?;
        self.state = State::NeedsOuterRow;
        self.end_inner_batch_mode();
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        if self.state == State::EndOfRows {
            return Ok(ReadResult::EndOfStream);
        }
        loop {
            if self.state == State::NeedsOuterRow {
                if self.outer.read()? == ReadResult::EndOfStream {
                    self.state = State::EndOfRows;
                    return Ok(ReadResult::EndOfStream);
                }
                if self.pfs_batch_mode {
                    self.inner.start_psi_batch_mode();
                }
                // init() may build a lookup key from the null-row flags
                self.inner.set_null_row_flag(false);
                if let Err(e) = self.inner.init() {
                    self.end_inner_batch_mode();
                    return Err(e);
                }
                self.state = State::ReadingFirstInnerRow;
            }

            let result = self.inner.read();
            if !matches!(result, Ok(ReadResult::Row)) {
                self.end_inner_batch_mode();
            }
            let result = result?;
            if let Err(e) = self.ctx.check_killed() {
                self.end_inner_batch_mode();
                return Err(e);
            }

            if result == ReadResult::EndOfStream {
                let no_match = self.state == State::ReadingFirstInnerRow;
                self.state = State::NeedsOuterRow;
                if no_match && matches!(self.join_type, JoinType::Outer | JoinType::Anti) {
                    self.inner.set_null_row_flag(true);
                    return Ok(ReadResult::Row);
                }
                continue;
            }

            match self.join_type {
                // a match disqualifies the outer row; stop scanning the inner side
                JoinType::Anti => {
                    self.end_inner_batch_mode();
                    self.state = State::NeedsOuterRow;
                }
                JoinType::Semi => {
                    self.end_inner_batch_mode();
                    self.state = State::NeedsOuterRow;
                    return Ok(ReadResult::Row);
                }
                JoinType::Inner | JoinType::Outer => {
                    self.state = State::ReadingInnerRows;
                    return Ok(ReadResult::Row);
                }
            }
        }
    }

    /// The outer row may still be part of other joined rows, so only the
    /// inner row is unlocked.
    fn unlock_row(&mut self) {
        if matches!(
            self.state,
            State::ReadingFirstInnerRow | State::ReadingInnerRows
        ) {
            self.inner.unlock_row();
        }
    }

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        self.outer.set_null_row_flag(is_null_row);
        self.inner.set_null_row_flag(is_null_row);
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        self.outer.end_psi_batch_mode_if_started();
        self.inner.end_psi_batch_mode_if_started();
    }
}
