use std::rc::Rc;

use crate::{
    aggregators::Aggregator,
    context::JoinContext,
    expressions::Literal,
    interpreter::Interpreter,
    row::Record,
    tables::TableRef,
    DBResult,
};

use super::{ReadResult, RowIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingFirstRow,
    /// The last child row read belongs to the next group; its record
    /// buffers are saved and restored before reading on.
    LastRowStartedNewGroup,
    DoneOutputtingRows,
}

/// Grouped or ungrouped aggregation over input that arrives sorted by the
/// group key. One row per contiguous group is published into the output
/// slice: group values first, aggregate results after.
pub struct AggregateIterator {
    child: Box<dyn RowIterator>,
    join: Rc<JoinContext>,
    tables: Vec<TableRef>,
    output_slice: usize,
    input_slice: usize,
    state: State,
    aggregators: Vec<Box<dyn Aggregator>>,
    current_group: Vec<Literal>,
    saved_records: Vec<Record>,
}

impl AggregateIterator {
    pub fn new(
        child: Box<dyn RowIterator>,
        join: Rc<JoinContext>,
        tables: Vec<TableRef>,
        output_slice: usize,
    ) -> Self {
        let aggregators = join.aggregates().iter().map(|a| a.aggregator()).collect();
        Self {
            child,
            tables,
            output_slice,
            input_slice: join.current_slice(),
            join,
            state: State::ReadingFirstRow,
            aggregators,
            current_group: vec![],
            saved_records: vec![],
        }
    }

    fn reset_aggregators(&mut self) {
        for aggregator in self.aggregators.iter_mut() {
            aggregator.reset();
        }
    }

    fn accumulate(&mut self) -> DBResult<()> {
        for (spec, aggregator) in self.join.aggregates().iter().zip(self.aggregators.iter_mut()) {
            let value = match &spec.arg {
                Some(arg) => Interpreter::eval(arg, &self.join)?,
                None => Literal::Null,
            };
            aggregator.add(&value)?;
        }
        Ok(())
    }

    fn publish_group(&mut self) -> DBResult<()> {
        let mut items = std::mem::take(&mut self.current_group);
        for aggregator in self.aggregators.iter() {
            items.push(aggregator.result()?);
        }
        log::trace!("aggregate publishes group {items:?}");
        self.join.set_items(self.output_slice, items);
        self.join.set_ref_item_slice(self.output_slice);
        Ok(())
    }
}

impl RowIterator for AggregateIterator {
    fn init(&mut self) -> DBResult<()> {
        self.child.init()?;
        self.input_slice = self.join.current_slice();
        self.state = State::ReadingFirstRow;
        self.saved_records.clear();
        Ok(())
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        match self.state {
            State::DoneOutputtingRows => return Ok(ReadResult::EndOfStream),
            State::ReadingFirstRow => {
                self.join.set_ref_item_slice(self.input_slice);
                if self.child.read()? == ReadResult::EndOfStream {
                    self.state = State::DoneOutputtingRows;
                    if !self.join.group_by().is_empty() {
                        self.join.set_ref_item_slice(self.output_slice);
                        return Ok(ReadResult::EndOfStream);
                    }
                    // no input rows and no grouping: one row, COUNT is 0
                    // and every other aggregate NULL
                    self.reset_aggregators();
                    self.current_group.clear();
                    self.publish_group()?;
                    return Ok(ReadResult::Row);
                }
            }
            State::LastRowStartedNewGroup => {
                for (table, record) in self.tables.iter().zip(self.saved_records.iter()) {
                    table.restore(record);
                }
                self.join.set_ref_item_slice(self.input_slice);
            }
        }

        // the record buffers hold the first row of a new group
        self.current_group = Interpreter::eval_all(self.join.group_by(), &self.join)?;
        self.reset_aggregators();
        self.accumulate()?;

        loop {
            if self.child.read()? == ReadResult::EndOfStream {
                self.state = State::DoneOutputtingRows;
                self.publish_group()?;
                return Ok(ReadResult::Row);
            }
            let group = Interpreter::eval_all(self.join.group_by(), &self.join)?;
            if group != self.current_group {
                self.saved_records = self.tables.iter().map(|t| t.snapshot()).collect();
                self.state = State::LastRowStartedNewGroup;
                self.publish_group()?;
                return Ok(ReadResult::Row);
            }
            self.accumulate()?;
        }
    }

    /// A group spans many rows, none of which can be unlocked alone.
    fn unlock_row(&mut self) {}

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        self.child.set_null_row_flag(is_null_row)
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        self.child.end_psi_batch_mode_if_started()
    }
}
