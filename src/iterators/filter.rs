use std::rc::Rc;

use crate::{
    context::JoinContext, errors::DBResult, expressions::Expression,
    interpreter::Interpreter,
};

use super::{ReadResult, RowIterator};

pub struct FilterIterator {
    child: Box<dyn RowIterator>,
    condition: Expression,
    join: Rc<JoinContext>,
}

impl FilterIterator {
    pub fn new(
        child: Box<dyn RowIterator>,
        condition: Expression,
        join: Rc<JoinContext>,
    ) -> Self {
        Self {
            child,
            condition,
            join,
        }
    }
}

impl RowIterator for FilterIterator {
    fn init(&mut self) -> DBResult<()> {
        self.child.init()
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        loop {
            self.join.exec_context().check_killed()?;
            if self.child.read()? == ReadResult::EndOfStream {
                return Ok(ReadResult::EndOfStream);
            }
            if Interpreter::eval_condition(&self.condition, &self.join)? {
                return Ok(ReadResult::Row);
            }
            self.child.unlock_row();
        }
    }

    fn unlock_row(&mut self) {
        self.child.unlock_row()
    }

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
