use std::fmt::Write;

use crate::{
    access_path::{AccessPath, PathKind},
    iterators::IteratorProfiler,
};

/// Render `path` as an indented tree, one node per line. Compiled nodes of
/// a profiled query carry their timing:
/// `-> Filter: (t.a > 1)  (actual time=0.010..0.030 rows=4 loops=1)`.
pub fn explain(path: &AccessPath) -> String {
    let mut out = String::new();
    render(path, 0, &mut out);
    out
}

fn render(path: &AccessPath, depth: usize, out: &mut String) {
    let _ = write!(out, "{}-> {}", "    ".repeat(depth), path.description());
    if let Some(profiler) = path.link().and_then(|link| link.profiler.as_ref()) {
        let _ = write!(out, "  {}", format_profile(profiler.as_ref()));
    }
    out.push('\n');
    for child in children(path) {
        render(child, depth + 1, out);
    }
}

fn format_profile(profiler: &dyn IteratorProfiler) -> String {
    let loops = profiler.num_init_calls();
    if loops == 0 {
        return "(never executed)".to_owned();
    }
    let per_loop_ms = |d: std::time::Duration| d.as_secs_f64() * 1000.0 / loops as f64;
    format!(
        "(actual time={:.3}..{:.3} rows={} loops={loops})",
        per_loop_ms(profiler.time_of_first_row()),
        per_loop_ms(profiler.time_of_last_row()),
        profiler.num_rows() as f64 / loops as f64,
    )
}

fn children(path: &AccessPath) -> Vec<&AccessPath> {
    match &path.kind {
        PathKind::TableScan { .. }
        | PathKind::IndexScan { .. }
        | PathKind::Ref { .. }
        | PathKind::EqRef { .. }
        | PathKind::Mrr { .. }
        | PathKind::FakeSingleRow
        | PathKind::ZeroRows { .. } => vec![],
        PathKind::NestedLoopJoin { outer, inner, .. }
        | PathKind::HashJoin { outer, inner, .. }
        | PathKind::BatchedKeyAccessJoin { outer, inner, .. } => vec![&**outer, &**inner],
        PathKind::Filter { child, .. }
        | PathKind::Sort { child, .. }
        | PathKind::Aggregate { child, .. }
        | PathKind::PrecomputedAggregate { child, .. }
        | PathKind::LimitOffset { child, .. }
        | PathKind::Window { child, .. }
        | PathKind::Weedout { child, .. }
        | PathKind::RemoveDuplicates { child, .. }
        | PathKind::CacheInvalidator { child, .. } => vec![&**child],
        // the table path is folded into the materialize line
        PathKind::Materialize(params) => params
            .query_blocks
            .iter()
            .map(|block| &*block.subquery_path)
            .collect(),
        PathKind::Append { children } => children.iter().collect(),
    }
}
