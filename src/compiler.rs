use std::rc::Rc;

use crate::{
    access_path::{
        find_tables_to_get_rowid_for, get_used_table_refs, should_enable_batch_mode, AccessPath,
        IteratorLink, PathKind,
    },
    context::JoinContext,
    iterators::{
        new_iterator, new_iterator_with_stats, AggregateIterator, AppendIterator, BkaIterator,
        CacheInvalidatorIterator, FakeSingleRowIterator, FilterIterator, HashJoinIterator,
        IndexScanIterator, IteratorStats, LimitOffsetIterator, MaterializeIterator,
        MaterializeQueryBlock, NestedLoopIterator, PrecomputedAggregateIterator, RefIterator,
        RefKind, RemoveDuplicatesIterator, RowIterator, SortIterator, TableScanIterator,
        WeedoutIterator, WindowIterator, ZeroRowsIterator,
    },
    tables::TableMap,
};

/// Build the iterator tree for `path` and back-link every node onto the
/// plan. `eligible_for_batch_mode` is false on the outer side of joins.
///
/// Panics on plans the executor cannot run, such as a batched key access
/// join without a multi-range read inner, or a node compiled twice.
pub fn create_iterator_from_access_path(
    path: &AccessPath,
    join: &Rc<JoinContext>,
    eligible_for_batch_mode: bool,
) -> Box<dyn RowIterator> {
    let mut link = IteratorLink::default();
    let iterator = build_iterator(path, join, eligible_for_batch_mode, &mut link);
    link.profiler = iterator.profiler();
    path.set_link(link);
    iterator
}

fn build_iterator(
    path: &AccessPath,
    join: &Rc<JoinContext>,
    eligible_for_batch_mode: bool,
    link: &mut IteratorLink,
) -> Box<dyn RowIterator> {
    let ctx = join.exec_context();
    log::trace!("compiling {}", path.description());
    match &path.kind {
        PathKind::TableScan { table } => {
            new_iterator(ctx, TableScanIterator::new(Rc::clone(ctx), Rc::clone(table)))
        }
        PathKind::IndexScan {
            table,
            key_column,
            reverse,
        } => new_iterator(
            ctx,
            IndexScanIterator::new(Rc::clone(ctx), Rc::clone(table), *key_column, *reverse),
        ),
        PathKind::Ref {
            table,
            key_column,
            key,
        } => new_iterator(
            ctx,
            RefIterator::new(RefKind::Ref, Rc::clone(table), *key_column, key.clone(), Rc::clone(join)),
        ),
        PathKind::EqRef {
            table,
            key_column,
            key,
        } => new_iterator(
            ctx,
            RefIterator::new(RefKind::EqRef, Rc::clone(table), *key_column, key.clone(), Rc::clone(join)),
        ),
        PathKind::Mrr {
            table,
            key_column,
            key,
        } => new_iterator(
            ctx,
            RefIterator::new(RefKind::Mrr, Rc::clone(table), *key_column, key.clone(), Rc::clone(join)),
        ),
        PathKind::FakeSingleRow => new_iterator(ctx, FakeSingleRowIterator::new()),
        PathKind::ZeroRows { child, .. } => {
            let tables = child
                .as_ref()
                .map(|child| get_used_table_refs(child))
                .unwrap_or_default();
            new_iterator(ctx, ZeroRowsIterator::new(tables))
        }
        PathKind::NestedLoopJoin {
            outer,
            inner,
            join_type,
        } => {
            let outer_iterator = create_iterator_from_access_path(outer, join, false);
            let inner_iterator =
                create_iterator_from_access_path(inner, join, eligible_for_batch_mode);
            let pfs_batch_mode = eligible_for_batch_mode
                && ctx.config().batch_mode
                && should_enable_batch_mode(inner);
            new_iterator(
                ctx,
                NestedLoopIterator::new(
                    Rc::clone(ctx),
                    outer_iterator,
                    inner_iterator,
                    *join_type,
                    pfs_batch_mode,
                ),
            )
        }
        PathKind::HashJoin {
            outer,
            inner,
            join_type,
            conditions,
            extra_condition,
            store_rowids,
        } => {
            if *store_rowids {
                request_row_ids(path, find_tables_to_get_rowid_for(path));
            }
            let probe = create_iterator_from_access_path(outer, join, false);
            let build = create_iterator_from_access_path(inner, join, eligible_for_batch_mode);
            let pfs_batch_mode = eligible_for_batch_mode
                && ctx.config().batch_mode
                && should_enable_batch_mode(inner);
            new_iterator(
                ctx,
                HashJoinIterator::new(
                    Rc::clone(join),
                    build,
                    probe,
                    get_used_table_refs(inner),
                    conditions.clone(),
                    extra_condition.clone(),
                    *join_type,
                    pfs_batch_mode,
                ),
            )
        }
        PathKind::BatchedKeyAccessJoin {
            outer,
            inner,
            join_type,
            store_rowids,
        } => {
            if !matches!(inner.kind, PathKind::Mrr { .. }) {
                panic!(
                    "batched key access join needs a multi-range read inner, got: {}",
                    inner.description()
                );
            }
            if *store_rowids {
                request_row_ids(path, find_tables_to_get_rowid_for(path));
            }
            let outer_iterator = create_iterator_from_access_path(outer, join, false);
            let inner_iterator =
                create_iterator_from_access_path(inner, join, eligible_for_batch_mode);
            let pfs_batch_mode = eligible_for_batch_mode && ctx.config().batch_mode;
            new_iterator(
                ctx,
                BkaIterator::new(
                    Rc::clone(ctx),
                    outer_iterator,
                    inner_iterator,
                    get_used_table_refs(outer),
                    *join_type,
                    ctx.config().bka_batch_size,
                    pfs_batch_mode,
                ),
            )
        }
        PathKind::Filter { child, condition } => {
            let child = create_iterator_from_access_path(child, join, eligible_for_batch_mode);
            new_iterator(ctx, FilterIterator::new(child, condition.clone(), Rc::clone(join)))
        }
        PathKind::Sort {
            child,
            order,
            remove_duplicates,
            use_row_ids,
            limit,
        } => {
            if *use_row_ids {
                request_row_ids(path, find_tables_to_get_rowid_for(path));
            }
            let tables = get_used_table_refs(child);
            let child = create_iterator_from_access_path(child, join, eligible_for_batch_mode);
            new_iterator(
                ctx,
                SortIterator::new(
                    child,
                    Rc::clone(join),
                    tables,
                    order.clone(),
                    *remove_duplicates,
                    *use_row_ids,
                    *limit,
                ),
            )
        }
        PathKind::Aggregate {
            child,
            output_slice,
        } => {
            let tables = get_used_table_refs(child);
            let child = create_iterator_from_access_path(child, join, eligible_for_batch_mode);
            new_iterator(
                ctx,
                AggregateIterator::new(child, Rc::clone(join), tables, *output_slice),
            )
        }
        PathKind::PrecomputedAggregate {
            child,
            output_slice,
        } => {
            let child = create_iterator_from_access_path(child, join, eligible_for_batch_mode);
            new_iterator(
                ctx,
                PrecomputedAggregateIterator::new(child, Rc::clone(join), *output_slice),
            )
        }
        PathKind::LimitOffset {
            child,
            limit,
            offset,
            count_all_rows,
            skipped_rows,
        } => {
            let child = create_iterator_from_access_path(child, join, eligible_for_batch_mode);
            let mut iterator = LimitOffsetIterator::new(child, *limit, *offset);
            if let Some(skipped_rows) = skipped_rows {
                iterator = iterator.with_skipped_rows(Rc::clone(skipped_rows), *count_all_rows);
            }
            new_iterator(ctx, iterator)
        }
        PathKind::Window {
            child,
            functions,
            partition_by,
            order_by,
            output_slice,
        } => {
            let child = create_iterator_from_access_path(child, join, eligible_for_batch_mode);
            new_iterator(
                ctx,
                WindowIterator::new(
                    child,
                    Rc::clone(join),
                    functions.clone(),
                    partition_by.clone(),
                    order_by.clone(),
                    *output_slice,
                ),
            )
        }
        PathKind::Weedout { child, tables } => {
            request_row_ids(path, find_tables_to_get_rowid_for(path) & *tables);
            let weedout_tables = get_used_table_refs(child)
                .into_iter()
                .filter(|t| tables.contains(t.id()))
                .collect();
            let child = create_iterator_from_access_path(child, join, eligible_for_batch_mode);
            new_iterator(ctx, WeedoutIterator::new(child, weedout_tables))
        }
        PathKind::RemoveDuplicates { child, group_items } => {
            let child = create_iterator_from_access_path(child, join, eligible_for_batch_mode);
            new_iterator(
                ctx,
                RemoveDuplicatesIterator::new(child, Rc::clone(join), group_items.clone()),
            )
        }
        PathKind::CacheInvalidator { child, name } => {
            let child = create_iterator_from_access_path(child, join, eligible_for_batch_mode);
            let iterator = CacheInvalidatorIterator::new(child, name);
            link.generation = Some(iterator.generation());
            new_iterator(ctx, iterator)
        }
        PathKind::Materialize(params) => {
            let query_blocks = params
                .query_blocks
                .iter()
                .map(|block| MaterializeQueryBlock {
                    iterator: create_iterator_from_access_path(
                        &block.subquery_path,
                        &block.join,
                        true,
                    ),
                    join: Rc::clone(&block.join),
                    copy_fields: block.copy_fields.clone(),
                    disable_deduplication: block.disable_deduplication,
                    pfs_batch_mode: ctx.config().batch_mode
                        && should_enable_batch_mode(&block.subquery_path),
                })
                .collect();
            let invalidators = params
                .invalidators
                .iter()
                .map(|slot| match slot.get().and_then(|link| link.generation.clone()) {
                    Some(generation) => generation,
                    None => panic!(
                        "cache invalidator of {} is not compiled yet",
                        params.table.name()
                    ),
                })
                .collect();

            // The table path reports the materialization's profile.
            let mut table_link = IteratorLink::default();
            let mut table_iterator =
                build_iterator(&params.table_path, join, eligible_for_batch_mode, &mut table_link);
            let stats = ctx.config().profiling.then(|| Rc::new(IteratorStats::new()));
            if let Some(stats) = &stats {
                table_iterator.set_override_profiler(stats.clone());
            }
            table_link.profiler = table_iterator.profiler();
            params.table_path.set_link(table_link);

            new_iterator_with_stats(
                MaterializeIterator::new(
                    Rc::clone(ctx),
                    query_blocks,
                    Rc::clone(&params.temp_table),
                    table_iterator,
                    params.rematerialize,
                    params.limit_rows,
                    invalidators,
                ),
                stats,
            )
        }
        PathKind::Append { children } => {
            let children = children
                .iter()
                .map(|child| create_iterator_from_access_path(child, join, eligible_for_batch_mode))
                .collect();
            new_iterator(ctx, AppendIterator::new(children))
        }
    }
}

fn request_row_ids(path: &AccessPath, tables: TableMap) {
    if tables.is_empty() {
        return;
    }
    log::debug!("{} keeps row ids of tables {tables}", path.description());
    for table in get_used_table_refs(path) {
        if tables.contains(table.id()) {
            table.request_row_id();
        }
    }
}
