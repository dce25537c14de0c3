mod common;

use std::rc::Rc;

use common::{collect, exec_context, int_table, ints, join_context};
use crackexec::{
    access_path::{
        find_tables_to_get_rowid_for, get_used_tables, should_enable_batch_mode,
        walk_access_paths, AccessPath, JoinType, MaterializeBlock, MaterializeParams, PathKind,
        WalkPolicy,
    },
    compiler::create_iterator_from_access_path,
    config::ExecutorConfig,
    explain::explain,
    context::{ExecContext, JoinContext},
    expressions::{BinaryOp, Expression, Literal, Subquery},
    iterators::{HashJoinCondition, IteratorProfiler, SortKey},
    query::PreparedQuery,
    tables::{TableMap, TableRef},
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn materialize_of(ctx: &Rc<ExecContext>, name: &str, child: AccessPath, copy: Expression) -> AccessPath {
    let block = MaterializeBlock::new(child, join_context(ctx), vec![copy]);
    AccessPath::materialize(MaterializeParams::new(ctx, name, vec![block], false))
}

/// Random plan over `tables`, with the set of tables its rows land in.
fn random_path(
    rng: &mut StdRng,
    ctx: &Rc<ExecContext>,
    tables: &[TableRef],
    depth: usize,
    materializations: &mut usize,
) -> (AccessPath, TableMap) {
    let choice = if depth == 0 { 0 } else { rng.gen_range(0..7) };
    match choice {
        0 => {
            let table = &tables[rng.gen_range(0..tables.len())];
            (AccessPath::table_scan(table), TableMap::single(table.id()))
        }
        1 => {
            let (outer, outer_tables) = random_path(rng, ctx, tables, depth - 1, materializations);
            let (inner, inner_tables) = random_path(rng, ctx, tables, depth - 1, materializations);
            (
                AccessPath::nested_loop(outer, inner, JoinType::Inner),
                outer_tables | inner_tables,
            )
        }
        2 => {
            let (outer, outer_tables) = random_path(rng, ctx, tables, depth - 1, materializations);
            let (inner, inner_tables) = random_path(rng, ctx, tables, depth - 1, materializations);
            (
                AccessPath::hash_join(outer, inner, JoinType::Outer, vec![], None),
                outer_tables | inner_tables,
            )
        }
        3 => {
            let (child, used) = random_path(rng, ctx, tables, depth - 1, materializations);
            let condition = Expression::literal(Literal::Bool(true));
            (AccessPath::filter(child, condition), used)
        }
        4 => {
            let (child, used) = random_path(rng, ctx, tables, depth - 1, materializations);
            (AccessPath::limit_offset(child, 10, 1), used)
        }
        5 => {
            let (child, used) = random_path(rng, ctx, tables, depth - 1, materializations);
            (AccessPath::zero_rows(Some(child), "impossible WHERE"), used)
        }
        _ => {
            let (child, _) = random_path(rng, ctx, tables, depth - 1, materializations);
            *materializations += 1;
            let path = materialize_of(
                ctx,
                &format!("m{materializations}"),
                child,
                Expression::literal(Literal::Int32(1)),
            );
            let used = get_used_tables_of_materialize(&path);
            (path, used)
        }
    }
}

fn get_used_tables_of_materialize(path: &AccessPath) -> TableMap {
    match &path.kind {
        PathKind::Materialize(params) => TableMap::single(params.table.id()),
        _ => unreachable!(),
    }
}

#[test]
fn used_tables_is_the_union_of_the_leaves() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let ctx = exec_context();
        let tables: Vec<TableRef> = (0..4)
            .map(|i| int_table(&ctx, &format!("t{i}"), &["a"], &[&[i]]))
            .collect();
        let mut materializations = 0;
        let (path, expected) = random_path(&mut rng, &ctx, &tables, 4, &mut materializations);
        assert_eq!(get_used_tables(&path), expected);
    }
}

#[test]
fn row_ids_below_a_hash_join_storing_them_are_not_requested_again() {
    let ctx = exec_context();
    let t1 = int_table(&ctx, "t1", &["a"], &[]);
    let t2 = int_table(&ctx, "t2", &["a"], &[]);
    let t3 = int_table(&ctx, "t3", &["a"], &[]);

    let sort_over = |store_rowids: bool| {
        let mut hash_join = AccessPath::hash_join(
            AccessPath::table_scan(&t1),
            AccessPath::table_scan(&t2),
            JoinType::Inner,
            vec![],
            None,
        );
        if store_rowids {
            hash_join = hash_join.with_store_rowids();
        }
        let join = AccessPath::nested_loop(hash_join, AccessPath::table_scan(&t3), JoinType::Inner);
        AccessPath::sort(join, vec![SortKey::asc(Expression::field(&t1, 0))])
    };

    assert_eq!(
        find_tables_to_get_rowid_for(&sort_over(true)),
        TableMap::single(t3.id())
    );
    assert_eq!(
        find_tables_to_get_rowid_for(&sort_over(false)),
        TableMap::from_ids([t1.id(), t2.id(), t3.id()])
    );
}

#[test]
fn row_id_search_stops_at_materialization() {
    let ctx = exec_context();
    let t1 = int_table(&ctx, "t1", &["a"], &[]);
    let t2 = int_table(&ctx, "t2", &["a"], &[]);
    let materialize = materialize_of(
        &ctx,
        "derived",
        AccessPath::table_scan(&t2),
        Expression::field(&t2, 0),
    );
    let temp_table = get_used_tables(&materialize);
    let path = AccessPath::weedout(
        AccessPath::nested_loop(AccessPath::table_scan(&t1), materialize, JoinType::Inner),
        TableMap::single(t1.id()),
    );
    assert_eq!(
        find_tables_to_get_rowid_for(&path),
        TableMap::single(t1.id()) | temp_table
    );
}

#[test]
fn compiling_requests_row_ids_for_weedout_tables_only() {
    let ctx = exec_context();
    let join = join_context(&ctx);
    let t1 = int_table(&ctx, "t1", &["a"], &[&[1]]);
    let t2 = int_table(&ctx, "t2", &["a"], &[&[1]]);
    let path = AccessPath::weedout(
        AccessPath::nested_loop(
            AccessPath::table_scan(&t1),
            AccessPath::table_scan(&t2),
            JoinType::Inner,
        ),
        TableMap::single(t1.id()),
    );
    let _iterator = create_iterator_from_access_path(&path, &join, true);
    assert!(t1.keeps_row_id());
    assert!(!t2.keeps_row_id());
}

#[test]
fn batch_mode_eligibility() {
    let ctx = exec_context();
    let t = int_table(&ctx, "t", &["a"], &[]);
    let scan = || AccessPath::table_scan(&t);
    let exists = Expression::Exists(Rc::new(Subquery::new(
        AccessPath::fake_single_row(),
        Rc::new(JoinContext::new(&ctx, 2)),
    )));

    assert!(should_enable_batch_mode(&scan()));
    assert!(should_enable_batch_mode(&AccessPath::index_scan(&t, 0, true)));
    assert!(should_enable_batch_mode(&AccessPath::sort(
        AccessPath::filter(scan(), Expression::literal(Literal::Bool(true))),
        vec![SortKey::desc(Expression::field(&t, 0))],
    )));
    assert!(!should_enable_batch_mode(&AccessPath::filter(scan(), exists)));
    assert!(!should_enable_batch_mode(&AccessPath::nested_loop(
        scan(),
        scan(),
        JoinType::Inner
    )));
    assert!(!should_enable_batch_mode(&AccessPath::aggregate(scan(), 1)));
    assert!(!should_enable_batch_mode(&AccessPath::eq_ref(
        &t,
        0,
        Expression::literal(Literal::Int32(1))
    )));
}

#[test]
#[should_panic(expected = "multi-range read")]
fn batched_key_access_needs_a_multi_range_read_inner() {
    let ctx = exec_context();
    let join = join_context(&ctx);
    let t1 = int_table(&ctx, "t1", &["a"], &[]);
    let t2 = int_table(&ctx, "t2", &["a"], &[]);
    let path = AccessPath::bka_join(
        AccessPath::table_scan(&t1),
        AccessPath::table_scan(&t2),
        JoinType::Inner,
    );
    create_iterator_from_access_path(&path, &join, true);
}

#[test]
#[should_panic(expected = "compiled twice")]
fn a_path_compiles_once() {
    let ctx = exec_context();
    let join = join_context(&ctx);
    let t = int_table(&ctx, "t", &["a"], &[]);
    let path = AccessPath::table_scan(&t);
    create_iterator_from_access_path(&path, &join, true);
    create_iterator_from_access_path(&path, &join, true);
}

#[test]
fn every_node_links_back_to_its_iterator() {
    let ctx = exec_context();
    let join = join_context(&ctx);
    let t1 = int_table(&ctx, "t1", &["a"], &[&[1]]);
    let t2 = int_table(&ctx, "t2", &["a"], &[&[1]]);
    let path = AccessPath::limit_offset(
        AccessPath::nested_loop(
            AccessPath::table_scan(&t1),
            materialize_of(&ctx, "d", AccessPath::table_scan(&t2), Expression::field(&t2, 0)),
            JoinType::Inner,
        ),
        5,
        0,
    );

    let mut unlinked = 0;
    walk_access_paths(&path, WalkPolicy::EntireTree, |node| {
        unlinked += usize::from(node.link().is_none());
        false
    });
    // the materialize adds its query block and its table path
    assert_eq!(unlinked, 6);

    let _iterator = create_iterator_from_access_path(&path, &join, true);
    walk_access_paths(&path, WalkPolicy::EntireTree, |node| {
        assert!(node.link().is_some(), "{} is not linked", node.description());
        false
    });
}

#[test]
fn profiled_iterators_count_rows_and_loops() {
    let ctx = ExecContext::new(ExecutorConfig {
        profiling: true,
        ..ExecutorConfig::default()
    });
    let join = join_context(&ctx);
    let t = int_table(&ctx, "t", &["a"], &[&[1], &[2], &[3], &[4]]);
    let path = AccessPath::filter(
        AccessPath::table_scan(&t),
        Expression::binary(
            BinaryOp::Gt,
            Expression::field(&t, 0),
            Expression::literal(Literal::Int32(2)),
        ),
    );
    let mut iterator = create_iterator_from_access_path(&path, &join, true);
    collect(iterator.as_mut(), &join, &[]).unwrap();
    collect(iterator.as_mut(), &join, &[]).unwrap();

    let filter = path.link().and_then(|link| link.profiler.clone()).unwrap();
    assert_eq!(filter.num_init_calls(), 2);
    assert_eq!(filter.num_rows(), 4);
    assert!(filter.time_of_first_row() <= filter.time_of_last_row());

    let PathKind::Filter { child, .. } = &path.kind else {
        unreachable!()
    };
    let scan = child.link().and_then(|link| link.profiler.clone()).unwrap();
    assert_eq!(scan.num_rows(), 8);
}

#[test]
fn unprofiled_iterators_have_no_profiler() {
    let ctx = exec_context();
    let join = join_context(&ctx);
    let t = int_table(&ctx, "t", &["a"], &[&[1]]);
    let path = AccessPath::table_scan(&t);
    let _iterator = create_iterator_from_access_path(&path, &join, true);
    assert!(path.link().unwrap().profiler.is_none());
}

#[test]
fn materialization_reports_through_its_table_path() {
    let ctx = ExecContext::new(ExecutorConfig {
        profiling: true,
        ..ExecutorConfig::default()
    });
    let join = join_context(&ctx);
    let t = int_table(&ctx, "t", &["a"], &[&[1], &[2]]);
    let path = materialize_of(&ctx, "d", AccessPath::table_scan(&t), Expression::field(&t, 0));
    let mut iterator = create_iterator_from_access_path(&path, &join, true);
    collect(iterator.as_mut(), &join, &[]).unwrap();

    let PathKind::Materialize(params) = &path.kind else {
        unreachable!()
    };
    let materialize = path.link().and_then(|link| link.profiler.clone()).unwrap();
    let table = params
        .table_path
        .link()
        .and_then(|link| link.profiler.clone())
        .unwrap();
    assert_eq!(materialize.num_rows(), 2);
    assert_eq!(table.num_rows(), materialize.num_rows());
    assert_eq!(table.num_init_calls(), 1);
}

#[test]
fn cache_invalidator_rematerializes_per_outer_row() {
    let ctx = exec_context();
    let join = join_context(&ctx);
    let t1 = int_table(&ctx, "t1", &["a"], &[&[1], &[2]]);
    let t2 = int_table(&ctx, "t2", &["b"], &[&[1], &[2]]);

    let outer = AccessPath::cache_invalidator(AccessPath::table_scan(&t1), "t1");
    let block = MaterializeBlock::new(
        AccessPath::filter(
            AccessPath::table_scan(&t2),
            Expression::eq(Expression::field(&t2, 0), Expression::field(&t1, 0)),
        ),
        join_context(&ctx),
        vec![Expression::field(&t2, 0)],
    );
    let mut params = MaterializeParams::new(&ctx, "lateral", vec![block], false);
    params.invalidators = vec![outer.slot()];
    let derived = Rc::clone(&params.table);
    let path = AccessPath::nested_loop(outer, AccessPath::materialize(params), JoinType::Inner);

    let mut iterator = create_iterator_from_access_path(&path, &join, true);
    let rows = collect(
        iterator.as_mut(),
        &join,
        &[Expression::field(&t1, 0), Expression::field(&derived, 0)],
    )
    .unwrap();
    assert_eq!(rows, vec![ints(&[1, 1]), ints(&[2, 2])]);
}

#[test]
fn hash_join_plan_compiles_and_runs() {
    let ctx = exec_context();
    let join = join_context(&ctx);
    let t1 = int_table(&ctx, "t1", &["a"], &[&[1], &[2], &[3]]);
    let t2 = int_table(&ctx, "t2", &["b"], &[&[3], &[1], &[1]]);
    let path = AccessPath::hash_join(
        AccessPath::table_scan(&t1),
        AccessPath::table_scan(&t2),
        JoinType::Inner,
        vec![HashJoinCondition {
            probe: Expression::field(&t1, 0),
            build: Expression::field(&t2, 0),
        }],
        None,
    );
    let mut iterator = create_iterator_from_access_path(&path, &join, true);
    let rows = collect(
        iterator.as_mut(),
        &join,
        &[Expression::field(&t1, 0), Expression::field(&t2, 0)],
    )
    .unwrap();
    assert_eq!(rows, vec![ints(&[1, 1]), ints(&[1, 1]), ints(&[3, 3])]);
}

#[test]
fn explain_renders_the_tree() {
    let ctx = exec_context();
    let join = join_context(&ctx);
    let t1 = int_table(&ctx, "t1", &["a"], &[&[1]]);
    let t2 = int_table(&ctx, "t2", &["b"], &[&[1]]);
    let path = AccessPath::limit_offset(
        AccessPath::filter(
            AccessPath::nested_loop(
                AccessPath::table_scan(&t1),
                AccessPath::table_scan(&t2),
                JoinType::Anti,
            ),
            Expression::eq(Expression::field(&t1, 0), Expression::literal(Literal::Int32(1))),
        ),
        10,
        0,
    );
    let expected = "\
-> Limit: 10 row(s)
    -> Filter: (t1.a = 1)
        -> Nested loop antijoin
            -> Table scan on t1
            -> Table scan on t2
";
    assert_eq!(explain(&path), expected);

    let _iterator = create_iterator_from_access_path(&path, &join, true);
    assert_eq!(explain(&path), expected);
}

#[test]
fn explain_shows_timing_of_profiled_plans() {
    let ctx = ExecContext::new(ExecutorConfig {
        profiling: true,
        ..ExecutorConfig::default()
    });
    let join = join_context(&ctx);
    let t1 = int_table(&ctx, "t1", &["a"], &[&[1]]);
    let t2 = int_table(&ctx, "t2", &["b"], &[&[1]]);
    let path = AccessPath::nested_loop(
        AccessPath::zero_rows(Some(AccessPath::table_scan(&t1)), "no matching row"),
        AccessPath::table_scan(&t2),
        JoinType::Inner,
    );
    let mut iterator = create_iterator_from_access_path(&path, &join, true);
    collect(iterator.as_mut(), &join, &[]).unwrap();

    let output = explain(&path);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("-> Nested loop inner join  (actual time="));
    assert!(lines[0].ends_with("rows=0 loops=1)"));
    assert!(lines[1].starts_with("    -> Zero rows (no matching row)  (actual time="));
    assert_eq!(lines[2], "    -> Table scan on t2  (never executed)");
}

#[test]
fn exists_subquery_ends_its_batch_mode() {
    let ctx = exec_context();
    let t1 = int_table(&ctx, "t1", &["a"], &[&[1], &[2]]);
    let t2 = int_table(&ctx, "t2", &["b"], &[&[1]]);
    let t3 = int_table(&ctx, "t3", &["c"], &[&[1], &[2]]);
    let subquery = AccessPath::nested_loop(
        AccessPath::table_scan(&t2),
        AccessPath::table_scan(&t3),
        JoinType::Inner,
    );
    let exists = Expression::Exists(Rc::new(Subquery::new(
        subquery,
        Rc::new(JoinContext::new(&ctx, 2)),
    )));
    let mut query = PreparedQuery::new(
        AccessPath::filter(AccessPath::table_scan(&t1), exists),
        join_context(&ctx),
        vec![Expression::field(&t1, 0)],
        vec!["a".to_owned()],
    );

    assert_eq!(query.execute().unwrap().rows, vec![ints(&[1]), ints(&[2])]);
    assert_eq!(ctx.batch_mode_leaves(), 0);
}
