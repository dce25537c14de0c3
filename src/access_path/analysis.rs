use std::rc::Rc;

use crate::tables::{TableMap, TableRef};

use super::{walk_access_paths, AccessPath, PathKind, WalkPolicy};

/// Tables whose record buffers hold the rows `path` outputs. A materialize
/// contributes its temp table, not the tables of its query blocks.
pub fn get_used_tables(path: &AccessPath) -> TableMap {
    TableMap::from_ids(get_used_table_refs(path).iter().map(|t| t.id()))
}

pub fn get_used_table_refs(path: &AccessPath) -> Vec<TableRef> {
    let mut tables = vec![];
    collect_tables(path, &mut tables);
    tables.sort_by_key(|t| t.id());
    tables.dedup_by_key(|t| t.id());
    tables
}

fn collect_tables(path: &AccessPath, tables: &mut Vec<TableRef>) {
    match &path.kind {
        PathKind::TableScan { table }
        | PathKind::IndexScan { table, .. }
        | PathKind::Ref { table, .. }
        | PathKind::EqRef { table, .. }
        | PathKind::Mrr { table, .. } => tables.push(Rc::clone(table)),
        PathKind::FakeSingleRow => {}
        PathKind::ZeroRows { child, .. } => {
            if let Some(child) = child {
                collect_tables(child, tables);
            }
        }
        PathKind::NestedLoopJoin { outer, inner, .. }
        | PathKind::HashJoin { outer, inner, .. }
        | PathKind::BatchedKeyAccessJoin { outer, inner, .. } => {
            collect_tables(outer, tables);
            collect_tables(inner, tables);
        }
        PathKind::Filter { child, .. }
        | PathKind::Sort { child, .. }
        | PathKind::Aggregate { child, .. }
        | PathKind::PrecomputedAggregate { child, .. }
        | PathKind::LimitOffset { child, .. }
        | PathKind::Window { child, .. }
        | PathKind::Weedout { child, .. }
        | PathKind::RemoveDuplicates { child, .. }
        | PathKind::CacheInvalidator { child, .. } => collect_tables(child, tables),
        PathKind::Materialize(params) => tables.push(Rc::clone(&params.table)),
        PathKind::Append { children } => {
            for child in children {
                collect_tables(child, tables);
            }
        }
    }
}

/// Tables below `path` that must keep row ids for `path` to re-fetch their
/// rows. Tables below a nested hash or batched key access join that stores
/// row ids already have them handled there.
pub fn find_tables_to_get_rowid_for(path: &AccessPath) -> TableMap {
    let mut handled = TableMap::empty();
    walk_access_paths(path, WalkPolicy::StopAtMaterialization, |sub| {
        if std::ptr::eq(sub, path) {
            return false;
        }
        match &sub.kind {
            PathKind::HashJoin {
                store_rowids: true, ..
            }
            | PathKind::BatchedKeyAccessJoin {
                store_rowids: true, ..
            } => {
                handled = handled | get_used_tables(sub);
                true
            }
            _ => false,
        }
    });
    get_used_tables(path) - handled
}

/// Whether the leaves of `path` may read in batch mode: single table access
/// methods that return many rows, possibly under subquery-free filters and
/// sorts.
pub fn should_enable_batch_mode(path: &AccessPath) -> bool {
    match &path.kind {
        PathKind::TableScan { .. }
        | PathKind::IndexScan { .. }
        | PathKind::Ref { .. }
        | PathKind::Mrr { .. } => true,
        PathKind::Filter { child, condition } => {
            !condition.has_subquery() && should_enable_batch_mode(child)
        }
        PathKind::Sort { child, .. } => should_enable_batch_mode(child),
        _ => false,
    }
}
