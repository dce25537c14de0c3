use std::cell::Cell;
use std::rc::Rc;

use crate::DBResult;

use super::{ReadResult, RowIterator};

/// Pass-through that bumps a generation counter on `init()` and on every
/// row. Materializations depending on it rematerialize once it moved.
pub struct CacheInvalidatorIterator {
    child: Box<dyn RowIterator>,
    name: String,
    generation: Rc<Cell<u64>>,
}

impl CacheInvalidatorIterator {
    pub fn new(child: Box<dyn RowIterator>, name: &str) -> Self {
        Self {
            child,
            name: name.to_owned(),
            generation: Rc::new(Cell::new(0)),
        }
    }

    pub fn generation(&self) -> Rc<Cell<u64>> {
        Rc::clone(&self.generation)
    }

    fn bump(&self) {
        self.generation.set(self.generation.get() + 1);
        log::trace!("invalidator {} at generation {}", self.name, self.generation.get());
    }
}

impl RowIterator for CacheInvalidatorIterator {
    fn init(&mut self) -> DBResult<()> {
        self.child.init()?;
        self.bump();
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        let result = self.child.read()?;
        if result == ReadResult::Row {
            self.bump();
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
