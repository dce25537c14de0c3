use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::{context::ExecContext, DBResult};

use super::{IteratorProfiler, ReadResult, RowIterator};

#[derive(Debug, Default)]
pub struct IteratorStats {
    time_spent_in_first_row: Cell<Duration>,
    time_spent_in_other_rows: Cell<Duration>,
    num_init_calls: Cell<u64>,
    num_rows: Cell<u64>,
}

impl IteratorStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_first_row_time(&self, elapsed: Duration) {
        self.time_spent_in_first_row
            .set(self.time_spent_in_first_row.get() + elapsed);
    }

    fn add_other_rows_time(&self, elapsed: Duration) {
        self.time_spent_in_other_rows
            .set(self.time_spent_in_other_rows.get() + elapsed);
    }
}

impl IteratorProfiler for IteratorStats {
    fn time_of_first_row(&self) -> Duration {
        self.time_spent_in_first_row.get()
    }

    fn time_of_last_row(&self) -> Duration {
        self.time_spent_in_first_row.get() + self.time_spent_in_other_rows.get()
    }

    fn num_init_calls(&self) -> u64 {
        self.num_init_calls.get()
    }

    fn num_rows(&self) -> u64 {
        self.num_rows.get()
    }
}

/// Forwards every call to the wrapped iterator, timing `init()` and `read()`.
/// Init time counts toward the first row of the scan it starts.
pub struct TimingIterator<I> {
    iterator: I,
    stats: Rc<IteratorStats>,
    override_profiler: Option<Rc<dyn IteratorProfiler>>,
    first_row: bool,
}

impl<I: RowIterator> TimingIterator<I> {
    pub fn new(iterator: I) -> Self {
        Self::with_stats(iterator, Rc::new(IteratorStats::new()))
    }

    pub fn with_stats(iterator: I, stats: Rc<IteratorStats>) -> Self {
        Self {
            iterator,
            stats,
            override_profiler: None,
            first_row: true,
        }
    }
}

impl<I: RowIterator> RowIterator for TimingIterator<I> {
    fn init(&mut self) -> DBResult<()> {
        let start = Instant::now();
        let result = self.iterator.init();
        self.stats.add_first_row_time(start.elapsed());
        self.stats
            .num_init_calls
            .set(self.stats.num_init_calls.get() + 1);
        self.first_row = true;
        result
    }

    fn read(&mut self) -> DBResult<ReadResult> {
        let start = Instant::now();
        let result = self.iterator.read();
        let elapsed = start.elapsed();
        if self.first_row {
            self.stats.add_first_row_time(elapsed);
            self.first_row = false;
        } else {
            self.stats.add_other_rows_time(elapsed);
        }
        if let Ok(ReadResult::Row) = result {
            self.stats.num_rows.set(self.stats.num_rows.get() + 1);
        }
        result
    }

    fn unlock_row(&mut self) {
        self.iterator.unlock_row()
    }

    fn set_null_row_flag(&mut self, is_null_row: bool) {
        self.iterator.set_null_row_flag(is_null_row)
    }

    fn start_psi_batch_mode(&mut self) {
        self.iterator.start_psi_batch_mode()
    }

    fn end_psi_batch_mode_if_started(&mut self) {
        self.iterator.end_psi_batch_mode_if_started()
    }

    fn profiler(&self) -> Option<Rc<dyn IteratorProfiler>> {
        match &self.override_profiler {
            Some(profiler) => Some(Rc::clone(profiler)),
            None => Some(Rc::clone(&self.stats) as Rc<dyn IteratorProfiler>),
        }
    }

    fn set_override_profiler(&mut self, profiler: Rc<dyn IteratorProfiler>) {
        self.override_profiler = Some(profiler);
    }
}

/// Box an iterator, decorated with timing when the query is profiled.
pub fn new_iterator<I: RowIterator + 'static>(
    ctx: &ExecContext,
    iterator: I,
) -> Box<dyn RowIterator> {
    if ctx.config().profiling {
        Box::new(TimingIterator::new(iterator))
    } else {
        Box::new(iterator)
    }
}

/// Like [`new_iterator`], but timing goes into stats the caller already
/// handed out, e.g. as another iterator's override profiler.
pub fn new_iterator_with_stats<I: RowIterator + 'static>(
    iterator: I,
    stats: Option<Rc<IteratorStats>>,
) -> Box<dyn RowIterator> {
    match stats {
        Some(stats) => Box::new(TimingIterator::with_stats(iterator, stats)),
        None => Box::new(iterator),
    }
}
