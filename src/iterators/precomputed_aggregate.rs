use std::rc::Rc;

use crate::{
    context::JoinContext, expressions::Literal, interpreter::Interpreter, DBResult,
};

use super::{ReadResult, RowIterator};

/// Aggregation already done below, e.g. MIN/MAX read from an index: each
/// child row is one finished group. Group values and the precomputed
/// aggregate values are published into the output slice.
pub struct PrecomputedAggregateIterator {
    child: Box<dyn RowIterator>,
    join: Rc<JoinContext>,
    output_slice: usize,
    input_slice: usize,
}

impl PrecomputedAggregateIterator {
    pub fn new(child: Box<dyn RowIterator>, join: Rc<JoinContext>, output_slice: usize) -> Self {
        Self {
            child,
            input_slice: join.current_slice(),
            join,
            output_slice,
        }
    }
}

impl RowIterator for PrecomputedAggregateIterator {
    fn init(&mut self) -> DBResult<()> {
        self.input_slice = self.join.current_slice();
        self.child.init()
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        self.join.set_ref_item_slice(self.input_slice);
        let result = self.child.read()?;
        if result == ReadResult::Row {
            let mut items = Interpreter::eval_all(self.join.group_by(), &self.join)?;
            for spec in self.join.aggregates() {
                items.push(match &spec.arg {
                    Some(arg) => Interpreter::eval(arg, &self.join)?,
                    None => Literal::Null,
                });
            }
            self.join.set_items(self.output_slice, items);
        }
        self.join.set_ref_item_slice(self.output_slice);
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
