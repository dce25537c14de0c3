mod aggregate;
mod append;
mod bka_join;
mod cache_invalidator;
mod filter;
mod hash_join;
mod limit;
mod materialize;
mod nested_loop;
mod precomputed_aggregate;
mod ref_lookup;
mod remove_duplicates;
mod sort;
mod table_scan;
mod timing;
mod weedout;
mod window;
mod zero_rows;

use std::rc::Rc;
use std::time::Duration;

use crate::{errors::DBResult, tables::TableRef};

pub use aggregate::AggregateIterator;
pub use append::AppendIterator;
pub use bka_join::BkaIterator;
pub use cache_invalidator::CacheInvalidatorIterator;
pub use filter::FilterIterator;
pub use hash_join::{HashJoinCondition, HashJoinIterator};
pub use limit::{LimitOffsetIterator, NO_LIMIT};
pub use materialize::{MaterializeIterator, MaterializeQueryBlock};
pub use nested_loop::NestedLoopIterator;
pub use precomputed_aggregate::PrecomputedAggregateIterator;
pub use ref_lookup::{RefIterator, RefKind};
pub use remove_duplicates::RemoveDuplicatesIterator;
pub use sort::{SortIterator, SortKey};
pub use table_scan::{IndexScanIterator, TableScanIterator};
pub use timing::{new_iterator, new_iterator_with_stats, IteratorStats, TimingIterator};
pub use weedout::WeedoutIterator;
pub use window::{WindowFunction, WindowIterator};
pub use zero_rows::{FakeSingleRowIterator, ZeroRowsIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    Row,
    /// No more rows until the next `init()`.
    EndOfStream,
}

/// A pull-based execution node.
///
/// Rows are not returned by value: a successful read leaves the row in the
/// record buffers of the tables below the iterator, where parents and
/// expressions pick it up. An error is terminal for the current scan.
pub trait RowIterator {
    /// Prepare a fresh scan from the start. Calling it again rescans.
    fn init(&mut self) -> DBResult<()>;

    fn read(&mut self) -> DBResult<ReadResult>;

    /// Release any row lock held for the current row.
    fn unlock_row(&mut self);

    /// Mark the output as the all-NULL row of an outer join.
    fn set_null_row_flag(&mut self, is_null_row: bool);

    fn start_psi_batch_mode(&mut self) {}

    fn end_psi_batch_mode_if_started(&mut self) {}

    fn profiler(&self) -> Option<Rc<dyn IteratorProfiler>> {
        None
    }

    fn set_override_profiler(&mut self, _profiler: Rc<dyn IteratorProfiler>) {}
}

impl<I: RowIterator + ?Sized> RowIterator for Box<I> {
    fn init(&mut self) -> DBResult<()> {
        (**self).init()
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        (**self).read()
    }

    fn unlock_row(&mut self) {
        (**self).unlock_row()
    }

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        (**self).set_null_row_flag(is_null_row)
    }

    fn start_psi_batch_mode(&mut self) {
        (**self).start_psi_batch_mode()
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        (**self).end_psi_batch_mode_if_started()
    }

    fn profiler(&self) -> Option<Rc<dyn IteratorProfiler>> {
        (**self).profiler()
    }

    fn set_override_profiler(&mut self, profiler: Rc<dyn IteratorProfiler>) {
        (**self).set_override_profiler(profiler)
    }
}

/// Read-only profiling data of one iterator, summed over all its scans.
pub trait IteratorProfiler {
    fn time_of_first_row(&self) -> Duration;

    fn time_of_last_row(&self) -> Duration;

    fn num_init_calls(&self) -> u64;

    fn num_rows(&self) -> u64;
}

pub(crate) fn set_null_row(tables: &[TableRef], is_null_row: bool) {
    for table in tables {
        table.set_null_row(is_null_row);
    }
}
