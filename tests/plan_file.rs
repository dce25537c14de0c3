use std::fs;

use crackexec::{expressions::Literal, plan_file::PlanFile, DBError, DBResult, ResultSet};

fn run(json: &str) -> DBResult<ResultSet> {
    PlanFile::from_json(json)?.prepare()?.execute()
}

const JOIN_TABLES: &str = r#"
    {"name": "t1", "columns": [{"name": "a", "type": "INT"}], "rows": [[1], [2], [3]]},
    {"name": "t2", "columns": [{"name": "b", "type": "INT"}, {"name": "c", "type": "TEXT"}],
     "rows": [[1, "one"], [3, "three"], [3, "drei"]]}
"#;

#[test]
fn filter_and_sort_with_aliases() {
    let json = r#"{
        "tables": [{"name": "t",
                    "columns": [{"name": "a", "type": "INT"}, {"name": "b", "type": "VARCHAR(10)"}],
                    "rows": [[1, "x"], [3, "y"], [2, null]]}],
        "query": {
            "plan": {"type": "sort", "order": [{"expr": "a", "asc": false}],
                     "child": {"type": "filter", "condition": "t.a > 1",
                               "child": {"type": "table_scan", "table": "t"}}},
            "outputs": ["t.a", "b AS name", "a * 2"]
        }
    }"#;
    assert_eq!(
        run(json),
        Ok(ResultSet::new(
            vec!["t.a".to_owned(), "name".to_owned(), "a * 2".to_owned()],
            vec![
                vec![Literal::Int32(3), Literal::String("y".to_owned()), Literal::Int32(6)],
                vec![Literal::Int32(2), Literal::Null, Literal::Int32(4)],
            ]
        ))
    );
}

#[test]
fn grouped_aggregate() {
    let json = r#"{
        "tables": [{"name": "t",
                    "columns": [{"name": "g", "type": "INT"}, {"name": "v", "type": "INT"}],
                    "rows": [[1, 10], [1, 20], [2, 5]]}],
        "query": {
            "group_by": ["g"],
            "aggregates": ["count(*)", "sum(v)"],
            "plan": {"type": "aggregate", "child": {"type": "table_scan", "table": "t"}},
            "outputs": ["g", "sum(v) AS total", "count(*)"]
        }
    }"#;
    let result = run(json).unwrap();
    assert_eq!(result.headers, vec!["g", "total", "count(*)"]);
    assert_eq!(
        result.rows,
        vec![
            vec![Literal::Int32(1), Literal::Int64(30), Literal::UInt64(2)],
            vec![Literal::Int32(2), Literal::Int64(5), Literal::UInt64(1)],
        ]
    );
}

#[test]
fn aggregate_over_an_empty_table() {
    let json = r#"{
        "tables": [{"name": "t", "columns": [{"name": "v", "type": "INT"}]}],
        "query": {
            "aggregates": ["count(*)", "max(v)"],
            "plan": {"type": "aggregate", "child": {"type": "table_scan", "table": "t"}},
            "outputs": ["count(*)", "max(v)"]
        }
    }"#;
    assert_eq!(
        run(json).unwrap().rows,
        vec![vec![Literal::UInt64(0), Literal::Null]]
    );
}

fn join_rows(join: &str) -> Vec<Vec<Literal>> {
    let json = format!(
        r#"{{"tables": [{JOIN_TABLES}],
             "query": {{"plan": {join}, "outputs": ["t1.a", "t2.c"]}}}}"#
    );
    run(&json).unwrap().rows
}

fn row(a: i32, c: Option<&str>) -> Vec<Literal> {
    vec![
        Literal::Int32(a),
        c.map_or(Literal::Null, |c| Literal::String(c.to_owned())),
    ]
}

#[test]
fn left_join_strategies_agree() {
    let expected = vec![
        row(1, Some("one")),
        row(2, None),
        row(3, Some("three")),
        row(3, Some("drei")),
    ];
    let nested_loop = r#"{"type": "nested_loop_join", "join_type": "outer",
        "outer": {"type": "table_scan", "table": "t1"},
        "inner": {"type": "ref", "table": "t2", "key_column": "b", "key": "t1.a"}}"#;
    let hash = r#"{"type": "hash_join", "join_type": "outer",
        "outer": {"type": "table_scan", "table": "t1"},
        "inner": {"type": "table_scan", "table": "t2"},
        "conditions": [{"probe": "t1.a", "build": "t2.b"}]}"#;
    let bka = r#"{"type": "batched_key_access_join", "join_type": "outer",
        "outer": {"type": "table_scan", "table": "t1"},
        "inner": {"type": "mrr", "table": "t2", "key_column": "b", "key": "t1.a"}}"#;
    assert_eq!(join_rows(nested_loop), expected);
    assert_eq!(join_rows(hash), expected);
    assert_eq!(join_rows(bka), expected);
}

#[test]
fn semijoin_with_weedout() {
    let plan = r#"{"type": "weedout", "tables": ["t1"],
        "child": {"type": "nested_loop_join",
                  "outer": {"type": "table_scan", "table": "t1"},
                  "inner": {"type": "ref", "table": "t2", "key_column": "b", "key": "t1.a"}}}"#;
    let json = format!(
        r#"{{"tables": [{JOIN_TABLES}],
             "query": {{"plan": {plan}, "outputs": ["a"]}}}}"#
    );
    assert_eq!(
        run(&json).unwrap().rows,
        vec![vec![Literal::Int32(1)], vec![Literal::Int32(3)]]
    );
}

#[test]
fn antijoin_with_extra_condition() {
    let plan = r#"{"type": "hash_join", "join_type": "anti",
        "outer": {"type": "table_scan", "table": "t1"},
        "inner": {"type": "table_scan", "table": "t2"},
        "conditions": [{"probe": "t1.a", "build": "t2.b"}],
        "extra_condition": "t2.c = 'one'"}"#;
    let json = format!(
        r#"{{"tables": [{JOIN_TABLES}],
             "query": {{"plan": {plan}, "outputs": ["t1.a"]}}}}"#
    );
    assert_eq!(
        run(&json).unwrap().rows,
        vec![vec![Literal::Int32(2)], vec![Literal::Int32(3)]]
    );
}

#[test]
fn union_distinct_through_materialization() {
    let json = r#"{
        "tables": [
            {"name": "t1", "columns": [{"name": "a", "type": "INT"}], "rows": [[1], [2]]},
            {"name": "t2", "columns": [{"name": "b", "type": "INT"}], "rows": [[2], [3]]}
        ],
        "query": {
            "plan": {"type": "materialize", "name": "u", "deduplicate": true, "blocks": [
                {"query": {"plan": {"type": "table_scan", "table": "t1"}, "outputs": ["a"]}},
                {"query": {"plan": {"type": "table_scan", "table": "t2"}, "outputs": ["b AS a"]}}
            ]},
            "outputs": ["u.a"]
        }
    }"#;
    assert_eq!(
        run(json).unwrap().rows,
        vec![
            vec![Literal::Int32(1)],
            vec![Literal::Int32(2)],
            vec![Literal::Int32(3)]
        ]
    );
}

#[test]
fn hash_join_on_int_and_bigint_keys() {
    let json = r#"{
        "tables": [
            {"name": "t1", "columns": [{"name": "a", "type": "INT"}], "rows": [[1], [2], [3]]},
            {"name": "t2", "columns": [{"name": "b", "type": "BIGINT"}], "rows": [[3], [1], [4]]}
        ],
        "query": {
            "plan": {"type": "hash_join",
                     "outer": {"type": "table_scan", "table": "t1"},
                     "inner": {"type": "table_scan", "table": "t2"},
                     "conditions": [{"probe": "t1.a", "build": "t2.b"}]},
            "outputs": ["a", "b"]
        }
    }"#;
    assert_eq!(
        run(json).unwrap().rows,
        vec![
            vec![Literal::Int32(1), Literal::Int64(1)],
            vec![Literal::Int32(3), Literal::Int64(3)],
        ]
    );
}

#[test]
fn sort_over_materialized_aggregate() {
    let json = r#"{
        "tables": [{"name": "t",
                    "columns": [{"name": "g", "type": "INT"}, {"name": "v", "type": "INT"}],
                    "rows": [[1, 10], [1, 20], [2, 50]]}],
        "query": {
            "plan": {"type": "sort", "order": [{"expr": "total", "asc": false}],
                     "child": {"type": "materialize", "name": "grouped", "blocks": [{"query": {
                        "group_by": ["g"],
                        "aggregates": ["sum(v)"],
                        "plan": {"type": "aggregate", "child": {"type": "table_scan", "table": "t"}},
                        "outputs": ["g", "sum(v) AS total"]}}]}},
            "outputs": ["grouped.g", "total"]
        }
    }"#;
    assert_eq!(
        run(json).unwrap().rows,
        vec![
            vec![Literal::Int32(2), Literal::Int64(50)],
            vec![Literal::Int32(1), Literal::Int64(30)],
        ]
    );
}

#[test]
fn window_functions() {
    let json = r#"{
        "tables": [{"name": "t",
                    "columns": [{"name": "g", "type": "INT"}, {"name": "v", "type": "INT"}],
                    "rows": [[1, 10], [1, 20], [2, 5]]}],
        "query": {
            "plan": {"type": "window", "functions": ["row_number()", "sum(v)"],
                     "partition_by": ["g"], "order_by": ["v"],
                     "child": {"type": "table_scan", "table": "t"}},
            "outputs": ["g", "row_number()", "sum(v)"]
        }
    }"#;
    assert_eq!(
        run(json).unwrap().rows,
        vec![
            vec![Literal::Int32(1), Literal::UInt64(1), Literal::Int64(10)],
            vec![Literal::Int32(1), Literal::UInt64(2), Literal::Int64(30)],
            vec![Literal::Int32(2), Literal::UInt64(1), Literal::Int64(5)],
        ]
    );
}

#[test]
fn limit_offset_and_explain() {
    let json = r#"{
        "tables": [{"name": "t", "columns": [{"name": "a", "type": "BIGINT"}],
                    "rows": [[1], [2], [3], [4]]}],
        "query": {
            "plan": {"type": "limit_offset", "limit": 3, "offset": 1,
                     "child": {"type": "index_scan", "table": "t", "key": "a", "reverse": true}},
            "outputs": ["a"]
        }
    }"#;
    let mut query = PlanFile::from_json(json).unwrap().prepare().unwrap();
    assert_eq!(
        query.execute().unwrap().rows,
        vec![vec![Literal::Int64(3)], vec![Literal::Int64(2)]]
    );
    assert_eq!(
        query.explain(),
        "-> Limit/Offset: 2/1 row(s)\n    -> Index scan on t using a (reverse)\n"
    );
    // a second execution rescans the compiled tree
    assert_eq!(query.execute().unwrap().rows.len(), 2);
}

#[test]
fn profiling_from_the_config_section() {
    let json = r#"{
        "config": {"profiling": true},
        "tables": [{"name": "t", "columns": [{"name": "a", "type": "INT"}], "rows": [[1]]}],
        "query": {"plan": {"type": "table_scan", "table": "t"}, "outputs": ["a"]}
    }"#;
    let mut query = PlanFile::from_json(json).unwrap().prepare().unwrap();
    query.execute().unwrap();
    let explain = query.explain();
    assert!(explain.starts_with("-> Table scan on t  (actual time="));
    assert!(explain.ends_with("rows=1 loops=1)\n"));
}

#[test]
fn fake_single_row_without_tables() {
    let json = r#"{"query": {"plan": {"type": "fake_single_row"}, "outputs": ["1 + 1 AS two"]}}"#;
    assert_eq!(
        run(json),
        Ok(ResultSet::new(vec!["two".to_owned()], vec![vec![Literal::Int32(2)]]))
    );
}

#[test]
fn csv_tables_resolve_relative_to_the_plan_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("orders.csv"), "id,amount,customer\n1,30.5,ann\n2,12.0,bob\n3,42.0,ann\n")
        .unwrap();
    let plan_path = dir.path().join("plan.json");
    fs::write(
        &plan_path,
        r#"{
            "tables": [{"name": "orders", "csv": "orders.csv"}],
            "query": {
                "plan": {"type": "filter", "condition": "amount > 20",
                         "child": {"type": "table_scan", "table": "orders"}},
                "outputs": ["id", "customer"]
            }
        }"#,
    )
    .unwrap();

    let result = PlanFile::from_path(&plan_path)
        .unwrap()
        .prepare()
        .unwrap()
        .execute()
        .unwrap();
    assert_eq!(
        result.rows,
        vec![
            vec![Literal::Int64(1), Literal::String("ann".to_owned())],
            vec![Literal::Int64(3), Literal::String("ann".to_owned())],
        ]
    );
}

#[test]
fn plan_errors() {
    let unknown_table = r#"{"query": {"plan": {"type": "table_scan", "table": "nope"}}}"#;
    assert!(matches!(
        PlanFile::from_json(unknown_table).unwrap().prepare(),
        Err(DBError::TableNotFound(name)) if name == "nope"
    ));

    let unknown_column = r#"{
        "tables": [{"name": "t", "columns": [{"name": "a", "type": "INT"}]}],
        "query": {"plan": {"type": "table_scan", "table": "t"}, "outputs": ["b"]}
    }"#;
    assert!(matches!(
        PlanFile::from_json(unknown_column).unwrap().prepare(),
        Err(DBError::ParserError(_))
    ));

    let bad_config = r#"{
        "config": {"bka_batch_size": 0},
        "query": {"plan": {"type": "fake_single_row"}}
    }"#;
    assert!(matches!(
        PlanFile::from_json(bad_config).unwrap().prepare(),
        Err(DBError::Config(_))
    ));

    let no_temp_rows = r#"{
        "config": {"max_in_memory_temp_rows": 0},
        "query": {"plan": {"type": "fake_single_row"}}
    }"#;
    assert!(matches!(
        PlanFile::from_json(no_temp_rows).unwrap().prepare(),
        Err(DBError::Config(_))
    ));

    let failing_row = r#"{
        "tables": [{"name": "t", "columns": [{"name": "a", "type": "INT"}], "rows": [[1], ["x"]]}],
        "query": {"plan": {"type": "table_scan", "table": "t"}, "outputs": ["a"]}
    }"#;
    assert!(PlanFile::from_json(failing_row).unwrap().prepare().is_err());

    let division = r#"{"query": {"plan": {"type": "fake_single_row"}, "outputs": ["1 / 0"]}}"#;
    assert_eq!(run(division).unwrap().rows, vec![vec![Literal::Null]]);
}
