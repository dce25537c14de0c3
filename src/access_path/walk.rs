use super::{AccessPath, PathKind};

/// How far `walk_access_paths` goes at a materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkPolicy {
    /// Also walk the query blocks a materialize runs.
    EntireTree,
    /// Stay in the current query block; a materialize's table path is walked.
    EntireQueryBlock,
    /// Visit a materialize node but nothing below it.
    StopAtMaterialization,
}

/// Depth-first pre-order walk. `visitor` returns true to skip the subtree of
/// the node it was given.
pub fn walk_access_paths<'a, F>(path: &'a AccessPath, policy: WalkPolicy, mut visitor: F)
where
    F: FnMut(&'a AccessPath) -> bool,
{
    walk(path, policy, &mut visitor)
}

fn walk<'a, F>(path: &'a AccessPath, policy: WalkPolicy, visitor: &mut F)
where
    F: FnMut(&'a AccessPath) -> bool,
{
    if visitor(path) {
        return;
    }
    match &path.kind {
        PathKind::TableScan { .. }
        | PathKind::IndexScan { .. }
        | PathKind::Ref { .. }
        | PathKind::EqRef { .. }
        | PathKind::Mrr { .. }
        | PathKind::FakeSingleRow => {}
        PathKind::ZeroRows { child, .. } => {
            if let Some(child) = child {
                walk(child, policy, visitor);
            }
        }
        PathKind::NestedLoopJoin { outer, inner, .. }
        | PathKind::HashJoin { outer, inner, .. }
        | PathKind::BatchedKeyAccessJoin { outer, inner, .. } => {
            walk(outer, policy, visitor);
            walk(inner, policy, visitor);
        }
        PathKind::Filter { child, .. }
        | PathKind::Sort { child, .. }
        | PathKind::Aggregate { child, .. }
        | PathKind::PrecomputedAggregate { child, .. }
        | PathKind::LimitOffset { child, .. }
        | PathKind::Window { child, .. }
        | PathKind::Weedout { child, .. }
        | PathKind::RemoveDuplicates { child, .. }
        | PathKind::CacheInvalidator { child, .. } => walk(child, policy, visitor),
        PathKind::Materialize(params) => match policy {
            WalkPolicy::StopAtMaterialization => {}
            WalkPolicy::EntireQueryBlock => walk(&params.table_path, policy, visitor),
            WalkPolicy::EntireTree => {
                for block in params.query_blocks.iter() {
                    walk(&block.subquery_path, policy, visitor);
                }
                walk(&params.table_path, policy, visitor);
            }
        },
        PathKind::Append { children } => {
            for child in children {
                walk(child, policy, visitor);
            }
        }
    }
}
