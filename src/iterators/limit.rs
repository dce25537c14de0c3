use std::cell::Cell;
use std::rc::Rc;

use crate::DBResult;

use super::{ReadResult, RowIterator};

pub const NO_LIMIT: u64 = u64::MAX;

/// Returns child rows at positions `[offset, limit)`; `limit` is an absolute
/// end position, not a row count.
pub struct LimitOffsetIterator {
    child: Box<dyn RowIterator>,
    limit: u64,
    offset: u64,
    count_all_rows: bool,
    skipped_rows: Option<Rc<Cell<u64>>>,
    seen_rows: u64,
    child_exhausted: bool,
}

impl LimitOffsetIterator {
    pub fn new(child: Box<dyn RowIterator>, limit: u64, offset: u64) -> Self {
        Self {
            child,
            limit,
            offset,
            count_all_rows: false,
            skipped_rows: None,
            seen_rows: 0,
            child_exhausted: false,
        }
    }

    /// Count rows skipped by the offset, and with `count_all_rows` also the
    /// rows past the limit, into `skipped_rows`.
    pub fn with_skipped_rows(
        mut self,
        skipped_rows: Rc<Cell<u64>>,
        count_all_rows: bool,
    ) -> Self {
        self.skipped_rows = Some(skipped_rows);
        self.count_all_rows = count_all_rows;
        self
    }

    fn count_skipped(&self) {
        if let Some(skipped) = &self.skipped_rows {
            skipped.set(skipped.get() + 1);
        }
    }
}

impl RowIterator for LimitOffsetIterator {
    fn init(&mut self) -> DBResult<()> {
        self.child.init()?;
        self.seen_rows = 0;
        self.child_exhausted = false;
        while self.seen_rows < self.offset {
            if self.child.read()? == ReadResult::EndOfStream {
                // fewer rows than the offset; every later read ends the stream
                self.seen_rows = self.limit;
                self.child_exhausted = true;
                return Ok(());
            }
            self.count_skipped();
            self.seen_rows += 1;
        }
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        if self.seen_rows >= self.limit {
            if self.count_all_rows && !self.child_exhausted {
                while self.child.read()? == ReadResult::Row {
                    self.count_skipped();
                }
                self.child_exhausted = true;
            }
            return Ok(ReadResult::EndOfStream);
        }
        let result = self.child.read()?;
        match result {
            ReadResult::Row => self.seen_rows += 1,
            ReadResult::EndOfStream => self.child_exhausted = true,
        }
        Ok(result)
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
