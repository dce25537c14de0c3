use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::aggregators::AggregateSpec;
use crate::config::ExecutorConfig;
use crate::expressions::{Expression, Literal};
use crate::tables::{QueryTable, Table, TableId, TableRef, MAX_TABLES};
use crate::{DBError, DBResult};

pub const REF_SLICE_BASE: usize = 0;
/// Slice an aggregate publishes group values and aggregate results into.
pub const REF_SLICE_AGGREGATE: usize = 1;
/// Slice a window iterator publishes its function values into.
pub const REF_SLICE_WINDOW: usize = 2;

const NUM_REF_SLICES: usize = 3;

/// Kill flag of a query. Clones share the flag, and it may be set from
/// another thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct ExecContext {
    config: ExecutorConfig,
    killed: CancellationToken,
    batch_mode_leaves: Cell<usize>,
    next_table_id: Cell<TableId>,
}

impl ExecContext {
    pub fn new(config: ExecutorConfig) -> Rc<Self> {
        Rc::new(ExecContext {
            config,
            killed: CancellationToken::new(),
            batch_mode_leaves: Cell::new(0),
            next_table_id: Cell::new(0),
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.killed.clone()
    }

    pub fn kill(&self) {
        self.killed.cancel();
    }

    pub fn check_killed(&self) -> DBResult<()> {
        if self.killed.is_cancelled() {
            return Err(DBError::Cancelled);
        }
        Ok(())
    }

    pub fn enter_batch_mode(&self) {
        self.batch_mode_leaves.set(self.batch_mode_leaves.get() + 1);
    }

    pub fn leave_batch_mode(&self) {
        self.batch_mode_leaves
            .set(self.batch_mode_leaves.get().saturating_sub(1));
    }

    pub fn batch_mode_leaves(&self) -> usize {
        self.batch_mode_leaves.get()
    }

    /// Register a table for this query. A query uses at most 64 tables.
    pub fn new_table(&self, name: &str, storage: Rc<RefCell<dyn Table>>) -> TableRef {
        let id = self.next_table_id.get();
        assert!(id < MAX_TABLES, "a query cannot use more than {MAX_TABLES} tables");
        self.next_table_id.set(id + 1);
        QueryTable::new(id, name, storage)
    }
}

/// Per query block state: grouping, aggregate functions and the ref-item
/// slices. Only the iterator inside `read()` switches the active slice.
pub struct JoinContext {
    ctx: Rc<ExecContext>,
    select_number: usize,
    group_by: Vec<Expression>,
    aggregates: Vec<AggregateSpec>,
    slices: RefCell<Vec<Vec<Literal>>>,
    current_slice: Cell<usize>,
}

impl std::fmt::Debug for JoinContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinContext")
            .field("select_number", &self.select_number)
            .field("group_by", &self.group_by)
            .field("aggregates", &self.aggregates)
            .field("current_slice", &self.current_slice.get())
            .finish()
    }
}

impl JoinContext {
    pub fn new(ctx: &Rc<ExecContext>, select_number: usize) -> Self {
        JoinContext {
            ctx: Rc::clone(ctx),
            select_number,
            group_by: vec![],
            aggregates: vec![],
            slices: RefCell::new(vec![Vec::new(); NUM_REF_SLICES]),
            current_slice: Cell::new(REF_SLICE_BASE),
        }
    }

    pub fn with_group_by(mut self, group_by: Vec<Expression>) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn with_aggregates(mut self, aggregates: Vec<AggregateSpec>) -> Self {
        self.aggregates = aggregates;
        self
    }

    pub fn exec_context(&self) -> &Rc<ExecContext> {
        &self.ctx
    }

    pub fn select_number(&self) -> usize {
        self.select_number
    }

    pub fn group_by(&self) -> &[Expression] {
        &self.group_by
    }

    pub fn aggregates(&self) -> &[AggregateSpec] {
        &self.aggregates
    }

    pub fn current_slice(&self) -> usize {
        self.current_slice.get()
    }

    pub fn set_ref_item_slice(&self, slice: usize) {
        self.current_slice.set(slice);
    }

    pub fn set_items(&self, slice: usize, items: Vec<Literal>) {
        let mut slices = self.slices.borrow_mut();
        if slices.len() <= slice {
            slices.resize(slice + 1, Vec::new());
        }
        slices[slice] = items;
    }

    pub fn items(&self, slice: usize) -> Vec<Literal> {
        self.slices
            .borrow()
            .get(slice)
            .cloned()
            .unwrap_or_default()
    }

    pub fn item(&self, slot: usize) -> DBResult<Literal> {
        let slice = self.current_slice.get();
        self.slices
            .borrow()
            .get(slice)
            .and_then(|items| items.get(slot))
            .cloned()
            .ok_or_else(|| {
                DBError::InterpretingError(format!(
                    "item {slot} is not set in ref slice {slice} of select #{}",
                    self.select_number
                ))
            })
    }
}
