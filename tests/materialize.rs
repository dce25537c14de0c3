mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use common::{
    bigint_table, collect, exec_context, int_table, ints, join_context, MockIterator, MockStats,
};
use crackexec::{
    context::{ExecContext, JoinContext},
    data_types::DataType,
    expressions::{Expression, Literal},
    iterators::{MaterializeIterator, MaterializeQueryBlock, TableScanIterator, NO_LIMIT},
    tables::{FieldInfo, RelationSchema, TempTable, TableRef},
};

struct Fixture {
    ctx: Rc<ExecContext>,
    join: Rc<JoinContext>,
    source: TableRef,
    temp_table: Rc<RefCell<TempTable>>,
    result: TableRef,
}

fn fixture(deduplicate: bool, max_in_memory_rows: usize) -> Fixture {
    let ctx = exec_context();
    let join = join_context(&ctx);
    let source = int_table(&ctx, "t", &["a"], &[]);
    let temp_table = Rc::new(RefCell::new(TempTable::new(
        "m",
        RelationSchema::new(vec![FieldInfo::new("a".to_owned(), DataType::Int32)]),
        deduplicate,
        max_in_memory_rows,
    )));
    let result = ctx.new_table("m", temp_table.clone());
    Fixture {
        ctx,
        join,
        source,
        temp_table,
        result,
    }
}

impl Fixture {
    fn block(&self, values: &[i32], disable_deduplication: bool) -> (MaterializeQueryBlock, Rc<MockStats>) {
        let mock = MockIterator::new(&self.source, values.iter().map(|v| ints(&[*v])).collect());
        let stats = mock.stats();
        let block = MaterializeQueryBlock {
            iterator: Box::new(mock),
            join: Rc::clone(&self.join),
            copy_fields: vec![Expression::field(&self.source, 0)],
            disable_deduplication,
            pfs_batch_mode: false,
        };
        (block, stats)
    }

    fn materialize(
        &self,
        blocks: Vec<MaterializeQueryBlock>,
        rematerialize: bool,
        limit_rows: u64,
        invalidators: Vec<Rc<Cell<u64>>>,
    ) -> MaterializeIterator {
        MaterializeIterator::new(
            Rc::clone(&self.ctx),
            blocks,
            Rc::clone(&self.temp_table),
            Box::new(TableScanIterator::new(Rc::clone(&self.ctx), Rc::clone(&self.result))),
            rematerialize,
            limit_rows,
            invalidators,
        )
    }

    fn read(&self, iterator: &mut MaterializeIterator) -> Vec<Vec<Literal>> {
        collect(iterator, &self.join, &[Expression::field(&self.result, 0)]).unwrap()
    }
}

#[test]
fn rescan_does_not_rerun_the_query_block() {
    let f = fixture(false, 100);
    let (block, stats) = f.block(&[1, 2, 3], false);
    let mut materialize = f.materialize(vec![block], false, NO_LIMIT, vec![]);

    let expected = vec![ints(&[1]), ints(&[2]), ints(&[3])];
    assert_eq!(f.read(&mut materialize), expected);
    assert_eq!(f.read(&mut materialize), expected);
    assert_eq!(stats.inits.get(), 1);
}

#[test]
fn rematerialize_reruns_on_every_init() {
    let f = fixture(false, 100);
    let (block, stats) = f.block(&[1, 2], false);
    let mut materialize = f.materialize(vec![block], true, NO_LIMIT, vec![]);

    f.read(&mut materialize);
    assert_eq!(f.read(&mut materialize), vec![ints(&[1]), ints(&[2])]);
    assert_eq!(stats.inits.get(), 2);
}

#[test]
fn invalidator_forces_rematerialization() {
    let f = fixture(false, 100);
    let (block, stats) = f.block(&[1], false);
    let generation = Rc::new(Cell::new(0));
    let mut materialize = f.materialize(vec![block], false, NO_LIMIT, vec![Rc::clone(&generation)]);

    f.read(&mut materialize);
    f.read(&mut materialize);
    assert_eq!(stats.inits.get(), 1);

    generation.set(generation.get() + 1);
    assert_eq!(f.read(&mut materialize), vec![ints(&[1])]);
    assert_eq!(stats.inits.get(), 2);
}

#[test]
fn union_distinct_removes_duplicates_across_blocks() {
    let f = fixture(true, 100);
    let (first, _) = f.block(&[1, 2, 2], false);
    let (second, _) = f.block(&[2, 3], false);
    let mut materialize = f.materialize(vec![first, second], false, NO_LIMIT, vec![]);

    assert_eq!(
        f.read(&mut materialize),
        vec![ints(&[1]), ints(&[2]), ints(&[3])]
    );
}

#[test]
fn union_all_block_skips_deduplication() {
    let f = fixture(true, 100);
    let (distinct, _) = f.block(&[1, 1], false);
    let (all, _) = f.block(&[1, 2], true);
    let mut materialize = f.materialize(vec![distinct, all], false, NO_LIMIT, vec![]);

    assert_eq!(
        f.read(&mut materialize),
        vec![ints(&[1]), ints(&[1]), ints(&[2])]
    );
}

#[test]
fn limit_rows_stops_materializing() {
    let f = fixture(false, 100);
    let (first, _) = f.block(&[1, 2, 3], false);
    let (second, second_stats) = f.block(&[4], false);
    let mut materialize = f.materialize(vec![first, second], false, 2, vec![]);

    assert_eq!(f.read(&mut materialize), vec![ints(&[1]), ints(&[2])]);
    assert_eq!(second_stats.inits.get(), 0);
}

#[test]
fn full_temp_table_spills_to_disk() {
    let f = fixture(true, 2);
    let (block, _) = f.block(&[5, 4, 4, 3, 2, 1], false);
    let mut materialize = f.materialize(vec![block], false, NO_LIMIT, vec![]);

    assert_eq!(
        f.read(&mut materialize),
        vec![ints(&[5]), ints(&[4]), ints(&[3]), ints(&[2]), ints(&[1])]
    );
    assert!(f.temp_table.borrow().is_on_disk());

    // rematerializing into the spilled table starts from an empty file
    let (block, _) = f.block(&[7, 7], false);
    let mut again = f.materialize(vec![block], false, NO_LIMIT, vec![]);
    assert_eq!(f.read(&mut again), vec![ints(&[7])]);
}

#[test]
fn union_distinct_converts_to_the_column_type() {
    let f = fixture(true, 100);
    let (ints_block, _) = f.block(&[1, 2], false);
    let wide = bigint_table(&f.ctx, "w", "b", &[2, 3]);
    let bigints_block = MaterializeQueryBlock {
        iterator: Box::new(TableScanIterator::new(Rc::clone(&f.ctx), Rc::clone(&wide))),
        join: Rc::clone(&f.join),
        copy_fields: vec![Expression::field(&wide, 0)],
        disable_deduplication: false,
        pfs_batch_mode: false,
    };
    let mut materialize = f.materialize(vec![ints_block, bigints_block], false, NO_LIMIT, vec![]);

    assert_eq!(
        f.read(&mut materialize),
        vec![ints(&[1]), ints(&[2]), ints(&[3])]
    );
}
