use std::rc::Rc;

use crate::{
    context::JoinContext, expressions::{Expression, Literal}, interpreter::Interpreter,
    DBResult,
};

use super::{ReadResult, RowIterator};

/// Drops rows whose key equals the key of the row before; input arrives
/// grouped on the key.
pub struct RemoveDuplicatesIterator {
    child: Box<dyn RowIterator>,
    join: Rc<JoinContext>,
    group_items: Vec<Expression>,
    last_key: Option<Vec<Literal>>,
}

impl RemoveDuplicatesIterator {
    pub fn new(
        child: Box<dyn RowIterator>,
        join: Rc<JoinContext>,
        group_items: Vec<Expression>,
    ) -> Self {
        Self {
            child,
            join,
            group_items,
            last_key: None,
        }
    }
}

impl RowIterator for RemoveDuplicatesIterator {
    fn init(&mut self) -> DBResult<()> {
        self.last_key = None;
        self.child.init()
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        loop {
            if self.child.read()? == ReadResult::EndOfStream {
                return Ok(ReadResult::EndOfStream);
            }
            let key = Interpreter::eval_all(&self.group_items, &self.join)?;
            if self.last_key.as_ref() == Some(&key) {
                self.child.unlock_row();
                continue;
            }
            self.last_key = Some(key);
            return Ok(ReadResult::Row);
        }
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
