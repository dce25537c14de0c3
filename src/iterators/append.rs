use crate::DBResult;

use super::{ReadResult, RowIterator};

/// Reads its children one after another, like UNION ALL. Each child is
/// initialized only when the previous one is exhausted.
pub struct AppendIterator {
    children: Vec<Box<dyn RowIterator>>,
    current: usize,
}

impl AppendIterator {
    pub fn new(children: Vec<Box<dyn RowIterator>>) -> Self {
        Self {
            children,
            current: 0,
        }
    }
}

impl RowIterator for AppendIterator {
    fn init(&mut self) -> DBResult<()> {
        self.current = 0;
        match self.children.first_mut() {
            Some(child) => child.init(),
            None => Ok(()),
        }
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        while let Some(child) = self.children.get_mut(self.current) {
            if child.read()? == ReadResult::Row {
                return Ok(ReadResult::Row);
            }
            self.current += 1;
            if let Some(next) = self.children.get_mut(self.current) {
                next.init()?;
            }
        }
        Ok(ReadResult::EndOfStream)
    }

    fn unlock_row(&mut self) {
        if let Some(child) = self.children.get_mut(self.current) {
            child.unlock_row();
        }
    }

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        for child in self.children.iter_mut() {
            child.set_null_row_flag(is_null_row);
        }
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        for child in self.children.iter_mut() {
            child.end_psi_batch_mode_if_started();
        }
    }
}
