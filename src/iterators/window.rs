use std::fmt::Display;
use std::rc::Rc;

use crate::{
    aggregators::{AggregateSpec, Aggregator},
    context::JoinContext,
    expressions::{Expression, Literal},
    interpreter::Interpreter,
    DBResult,
};

use super::{ReadResult, RowIterator};

#[derive(Debug, Clone)]
pub enum WindowFunction {
    RowNumber,
    Rank,
    /// Running aggregate from the start of the partition to the current row.
    Aggregate(AggregateSpec),
}

impl Display for WindowFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowFunction::RowNumber => "row_number()".fmt(f),
            WindowFunction::Rank => "rank()".fmt(f),
            WindowFunction::Aggregate(spec) => spec.name.fmt(f),
        }
    }
}

/// Streaming window functions over input sorted by partition, then order.
/// Each row publishes the input slice items followed by one value per
/// function into the output slice.
pub struct WindowIterator {
    child: Box<dyn RowIterator>,
    join: Rc<JoinContext>,
    functions: Vec<WindowFunction>,
    aggregators: Vec<Option<Box<dyn Aggregator>>>,
    partition_by: Vec<Expression>,
    order_by: Vec<Expression>,
    output_slice: usize,
    input_slice: usize,
    partition: Option<Vec<Literal>>,
    peer_key: Option<Vec<Literal>>,
    row_number: u64,
    rank: u64,
}

impl WindowIterator {
    pub fn new(
        child: Box<dyn RowIterator>,
        join: Rc<JoinContext>,
        functions: Vec<WindowFunction>,
        partition_by: Vec<Expression>,
        order_by: Vec<Expression>,
        output_slice: usize,
    ) -> Self {
        let aggregators = functions
            .iter()
            .map(|function| match function {
                WindowFunction::Aggregate(spec) => Some(spec.aggregator()),
                _ => None,
            })
            .collect();
        Self {
            child,
            input_slice: join.current_slice(),
            join,
            functions,
            aggregators,
            partition_by,
            order_by,
            output_slice,
            partition: None,
            peer_key: None,
            row_number: 0,
            rank: 0,
        }
    }

    fn start_partition(&mut self, partition: Vec<Literal>) {
        self.partition = Some(partition);
        self.peer_key = None;
        self.row_number = 0;
        self.rank = 0;
        for aggregator in self.aggregators.iter_mut().flatten() {
            aggregator.reset();
        }
    }
}

impl RowIterator for WindowIterator {
    fn init(&mut self) -> DBResult<()> {
        self.input_slice = self.join.current_slice();
        self.partition = None;
        self.peer_key = None;
        self.child.init()
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        self.join.set_ref_item_slice(self.input_slice);
        if self.child.read()? == ReadResult::EndOfStream {
            self.join.set_ref_item_slice(self.output_slice);
            return Ok(ReadResult::EndOfStream);
        }

        let partition = Interpreter::eval_all(&self.partition_by, &self.join)?;
        if self.partition.as_ref() != Some(&partition) {
            self.start_partition(partition);
        }
        let peer_key = Interpreter::eval_all(&self.order_by, &self.join)?;
        self.row_number += 1;
        if self.peer_key.as_ref() != Some(&peer_key) {
            self.rank = self.row_number;
            self.peer_key = Some(peer_key);
        }

        let mut items = self.join.items(self.input_slice);
        for (function, aggregator) in self.functions.iter().zip(self.aggregators.iter_mut()) {
            let value = match (function, aggregator) {
                (WindowFunction::RowNumber, _) => Literal::UInt64(self.row_number),
                (WindowFunction::Rank, _) => Literal::UInt64(self.rank),
                (WindowFunction::Aggregate(spec), Some(aggregator)) => {
                    let arg = match &spec.arg {
                        Some(arg) => Interpreter::eval(arg, &self.join)?,
                        None => Literal::Null,
                    };
                    aggregator.add(&arg)?;
                    aggregator.result()?
                }
                (WindowFunction::Aggregate(_), None) => Literal::Null,
            };
            items.push(value);
        }
        self.join.set_items(self.output_slice, items);
        self.join.set_ref_item_slice(self.output_slice);
        Ok(ReadResult::Row)
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
