use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;

use crate::{
    access_path::{
        AccessPath, IteratorSlot, JoinType, MaterializeBlock, MaterializeParams, PathKind,
    },
    aggregators::AggregateSpec,
    config::ExecutorConfig,
    context::{ExecContext, JoinContext, REF_SLICE_AGGREGATE, REF_SLICE_WINDOW},
    data_types::DataType,
    expressions::{Expression, Literal},
    iterators::{HashJoinCondition, SortKey, WindowFunction, NO_LIMIT},
    parser::{
        parse_aggregate, parse_data_type, parse_expression, parse_output, parse_window_function,
        ExprScope, ScopeItem,
    },
    query::PreparedQuery,
    tables::{csv::CsvTable, FieldInfo, InMemTable, RelationSchema, TableMap, TableRef},
    DBError, DBResult,
};

/// A query described as JSON: base tables, one query block with its plan,
/// and optional executor settings. Expressions are SQL text.
///
/// ```json
/// {
///   "tables": [{"name": "t", "columns": [{"name": "a", "type": "INT"}], "rows": [[1], [2]]}],
///   "query": {
///     "plan": {"type": "filter", "condition": "t.a > 1",
///              "child": {"type": "table_scan", "table": "t"}},
///     "outputs": ["t.a"]
///   }
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub config: Option<ExecutorConfig>,
    #[serde(default)]
    pub tables: Vec<TableDef>,
    pub query: QueryDef,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Load the table from a CSV file with a header line instead.
    #[serde(default)]
    pub csv: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// One query block. `group_by` and `aggregates` are the grouping an
/// `aggregate` node of the plan computes.
#[derive(Debug, Deserialize)]
pub struct QueryDef {
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub aggregates: Vec<String>,
    pub plan: PathDef,
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SortKeyDef {
    pub expr: String,
    #[serde(default = "default_asc")]
    pub asc: bool,
}

fn default_asc() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct HashJoinConditionDef {
    pub probe: String,
    pub build: String,
}

#[derive(Debug, Deserialize)]
pub struct MaterializeBlockDef {
    pub query: QueryDef,
    #[serde(default)]
    pub disable_deduplication: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathDef {
    TableScan {
        table: String,
    },
    IndexScan {
        table: String,
        key: String,
        #[serde(default)]
        reverse: bool,
    },
    Ref {
        table: String,
        key_column: String,
        key: String,
    },
    EqRef {
        table: String,
        key_column: String,
        key: String,
    },
    Mrr {
        table: String,
        key_column: String,
        key: String,
    },
    FakeSingleRow,
    ZeroRows {
        #[serde(default)]
        child: Option<Box<PathDef>>,
        #[serde(default)]
        cause: String,
    },
    NestedLoopJoin {
        outer: Box<PathDef>,
        inner: Box<PathDef>,
        #[serde(default)]
        join_type: JoinType,
    },
    HashJoin {
        outer: Box<PathDef>,
        inner: Box<PathDef>,
        #[serde(default)]
        join_type: JoinType,
        #[serde(default)]
        conditions: Vec<HashJoinConditionDef>,
        #[serde(default)]
        extra_condition: Option<String>,
        #[serde(default)]
        store_rowids: bool,
    },
    BatchedKeyAccessJoin {
        outer: Box<PathDef>,
        inner: Box<PathDef>,
        #[serde(default)]
        join_type: JoinType,
        #[serde(default)]
        store_rowids: bool,
    },
    Filter {
        child: Box<PathDef>,
        condition: String,
    },
    Sort {
        child: Box<PathDef>,
        order: Vec<SortKeyDef>,
        #[serde(default)]
        remove_duplicates: bool,
        #[serde(default)]
        use_row_ids: bool,
        #[serde(default)]
        limit: Option<u64>,
    },
    Aggregate {
        child: Box<PathDef>,
    },
    PrecomputedAggregate {
        child: Box<PathDef>,
    },
    LimitOffset {
        child: Box<PathDef>,
        #[serde(default)]
        limit: Option<u64>,
        #[serde(default)]
        offset: u64,
    },
    Window {
        child: Box<PathDef>,
        functions: Vec<String>,
        #[serde(default)]
        partition_by: Vec<String>,
        #[serde(default)]
        order_by: Vec<String>,
    },
    Weedout {
        child: Box<PathDef>,
        tables: Vec<String>,
    },
    RemoveDuplicates {
        child: Box<PathDef>,
        group_items: Vec<String>,
    },
    CacheInvalidator {
        child: Box<PathDef>,
        name: String,
    },
    Materialize {
        name: String,
        blocks: Vec<MaterializeBlockDef>,
        #[serde(default)]
        deduplicate: bool,
        #[serde(default)]
        rematerialize: bool,
        #[serde(default)]
        limit_rows: Option<u64>,
        #[serde(default)]
        invalidators: Vec<String>,
    },
    Append {
        children: Vec<PathDef>,
    },
}

impl PlanFile {
    pub fn from_json(text: &str) -> DBResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> DBResult<Self> {
        let path = path.as_ref();
        let mut plan = Self::from_json(&std::fs::read_to_string(path)?)?;
        plan.base_dir = path.parent().map(Path::to_path_buf);
        Ok(plan)
    }

    /// Load the tables and build the plan. `CRACKEXEC_*` environment
    /// variables override the file's config.
    pub fn prepare(self) -> DBResult<PreparedQuery> {
        let config = self.config.unwrap_or_default().with_env_overrides()?;
        let ctx = ExecContext::new(config);
        let mut loader = PlanLoader {
            ctx,
            tables: vec![],
            invalidators: HashMap::new(),
            next_select_number: 0,
        };
        for table in self.tables.iter() {
            loader.add_table(table, self.base_dir.as_deref())?;
        }
        let block = loader.load_query(&self.query)?;
        log::debug!(
            "loaded plan with {} tables and {} outputs",
            loader.tables.len(),
            block.outputs.len()
        );
        Ok(PreparedQuery::new(
            block.path,
            block.join,
            block.outputs,
            block.headers,
        ))
    }
}

struct LoadedBlock {
    path: AccessPath,
    join: Rc<JoinContext>,
    outputs: Vec<Expression>,
    headers: Vec<String>,
}

/// Grouping and slice items of the query block being loaded. The grouping
/// is parsed at the aggregate node, once the tables below it are known.
struct BlockState<'q> {
    def: &'q QueryDef,
    grouping: Option<(Vec<Expression>, Vec<AggregateSpec>)>,
    items: Vec<ScopeItem>,
}

struct PlanLoader {
    ctx: Rc<ExecContext>,
    /// Base tables and the temp tables of materializations loaded so far.
    tables: Vec<TableRef>,
    invalidators: HashMap<String, IteratorSlot>,
    next_select_number: usize,
}

impl PlanLoader {
    fn add_table(&mut self, def: &TableDef, base_dir: Option<&Path>) -> DBResult<()> {
        let storage = match &def.csv {
            Some(csv) => {
                let path = match base_dir {
                    Some(dir) => dir.join(csv),
                    None => PathBuf::from(csv),
                };
                CsvTable::load(&path.to_string_lossy())?
            }
            None => {
                let fields = def
                    .columns
                    .iter()
                    .map(|c| Ok(FieldInfo::new(c.name.clone(), parse_data_type(&c.data_type)?)))
                    .collect::<DBResult<Vec<_>>>()?;
                let rows = def
                    .rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .zip(fields.iter())
                            .map(|(value, field)| json_to_literal(value, field.data_type()))
                            .collect::<DBResult<Vec<_>>>()
                    })
                    .collect::<DBResult<Vec<_>>>()?;
                if let Some(row) = def.rows.iter().find(|row| row.len() != fields.len()) {
                    return Err(DBError::ParserError(format!(
                        "table {} has {} columns, got a row with {} values",
                        def.name,
                        fields.len(),
                        row.len()
                    )));
                }
                InMemTable::with_rows(RelationSchema::new(fields), rows)?
            }
        };
        let table = self
            .ctx
            .new_table(&def.name, Rc::new(RefCell::new(storage)));
        self.tables.push(table);
        Ok(())
    }

    fn table(&self, name: &str) -> DBResult<TableRef> {
        self.tables
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| DBError::TableNotFound(name.to_owned()))
    }

    fn load_query(&mut self, def: &QueryDef) -> DBResult<LoadedBlock> {
        self.next_select_number += 1;
        let select_number = self.next_select_number;
        let mut block = BlockState {
            def,
            grouping: None,
            items: vec![],
        };
        let path = self.load_path(&def.plan, &mut block)?;
        let (group_by, aggregates) = match block.grouping.take() {
            Some(grouping) => grouping,
            None => self.parse_grouping(def)?,
        };
        let join = Rc::new(
            JoinContext::new(&self.ctx, select_number)
                .with_group_by(group_by)
                .with_aggregates(aggregates),
        );
        let scope = ExprScope::new(&self.tables, &block.items);
        let (outputs, headers) = def
            .outputs
            .iter()
            .map(|output| parse_output(output, &scope))
            .collect::<DBResult<Vec<_>>>()?
            .into_iter()
            .unzip();
        Ok(LoadedBlock {
            path,
            join,
            outputs,
            headers,
        })
    }

    fn parse_grouping(&self, def: &QueryDef) -> DBResult<(Vec<Expression>, Vec<AggregateSpec>)> {
        let scope = ExprScope::new(&self.tables, &[]);
        let group_by = def
            .group_by
            .iter()
            .map(|g| parse_expression(g, &scope))
            .collect::<DBResult<Vec<_>>>()?;
        let aggregates = def
            .aggregates
            .iter()
            .map(|a| parse_aggregate(a, &scope))
            .collect::<DBResult<Vec<_>>>()?;
        Ok((group_by, aggregates))
    }

    fn expr(&self, sql: &str, block: &BlockState) -> DBResult<Expression> {
        parse_expression(sql, &ExprScope::new(&self.tables, &block.items))
    }

    fn exprs(&self, sqls: &[String], block: &BlockState) -> DBResult<Vec<Expression>> {
        sqls.iter().map(|sql| self.expr(sql, block)).collect()
    }

    fn key_column(&self, table: &TableRef, column: &str) -> DBResult<usize> {
        table.schema().index_of(column).ok_or_else(|| {
            DBError::ParserError(format!("unknown column {column} in table {}", table.name()))
        })
    }

    fn load_path(&mut self, def: &PathDef, block: &mut BlockState) -> DBResult<AccessPath> {
        let path = match def {
            PathDef::TableScan { table } => AccessPath::table_scan(&self.table(table)?),
            PathDef::IndexScan {
                table,
                key,
                reverse,
            } => {
                let table = self.table(table)?;
                let key_column = self.key_column(&table, key)?;
                AccessPath::index_scan(&table, key_column, *reverse)
            }
            PathDef::Ref {
                table,
                key_column,
                key,
            } => {
                let table = self.table(table)?;
                let key_column = self.key_column(&table, key_column)?;
                AccessPath::ref_lookup(&table, key_column, self.expr(key, block)?)
            }
            PathDef::EqRef {
                table,
                key_column,
                key,
            } => {
                let table = self.table(table)?;
                let key_column = self.key_column(&table, key_column)?;
                AccessPath::eq_ref(&table, key_column, self.expr(key, block)?)
            }
            PathDef::Mrr {
                table,
                key_column,
                key,
            } => {
                let table = self.table(table)?;
                let key_column = self.key_column(&table, key_column)?;
                AccessPath::mrr(&table, key_column, self.expr(key, block)?)
            }
            PathDef::FakeSingleRow => AccessPath::fake_single_row(),
            PathDef::ZeroRows { child, cause } => {
                let child = match child {
                    Some(child) => Some(self.load_path(child, block)?),
                    None => None,
                };
                AccessPath::zero_rows(child, cause)
            }
            PathDef::NestedLoopJoin {
                outer,
                inner,
                join_type,
            } => {
                let outer = self.load_path(outer, block)?;
                let inner = self.load_path(inner, block)?;
                AccessPath::nested_loop(outer, inner, *join_type)
            }
            PathDef::HashJoin {
                outer,
                inner,
                join_type,
                conditions,
                extra_condition,
                store_rowids,
            } => {
                let outer = self.load_path(outer, block)?;
                let inner = self.load_path(inner, block)?;
                let conditions = conditions
                    .iter()
                    .map(|c| {
                        Ok(HashJoinCondition {
                            probe: self.expr(&c.probe, block)?,
                            build: self.expr(&c.build, block)?,
                        })
                    })
                    .collect::<DBResult<Vec<_>>>()?;
                let extra_condition = match extra_condition {
                    Some(condition) => Some(self.expr(condition, block)?),
                    None => None,
                };
                let path =
                    AccessPath::hash_join(outer, inner, *join_type, conditions, extra_condition);
                if *store_rowids {
                    path.with_store_rowids()
                } else {
                    path
                }
            }
            PathDef::BatchedKeyAccessJoin {
                outer,
                inner,
                join_type,
                store_rowids,
            } => {
                let outer = self.load_path(outer, block)?;
                let inner = self.load_path(inner, block)?;
                let path = AccessPath::bka_join(outer, inner, *join_type);
                if *store_rowids {
                    path.with_store_rowids()
                } else {
                    path
                }
            }
            PathDef::Filter { child, condition } => {
                let child = self.load_path(child, block)?;
                AccessPath::filter(child, self.expr(condition, block)?)
            }
            PathDef::Sort {
                child,
                order,
                remove_duplicates,
                use_row_ids,
                limit,
            } => {
                let child = self.load_path(child, block)?;
                let order = order
                    .iter()
                    .map(|key| {
                        let expr = self.expr(&key.expr, block)?;
                        Ok(if key.asc {
                            SortKey::asc(expr)
                        } else {
                            SortKey::desc(expr)
                        })
                    })
                    .collect::<DBResult<Vec<_>>>()?;
                let mut path = AccessPath::sort(child, order);
                if let PathKind::Sort {
                    remove_duplicates: r,
                    use_row_ids: u,
                    limit: l,
                    ..
                } = &mut path.kind
                {
                    *r = *remove_duplicates;
                    *u = *use_row_ids;
                    *l = limit.unwrap_or(NO_LIMIT);
                }
                path
            }
            PathDef::Aggregate { child } | PathDef::PrecomputedAggregate { child } => {
                let child = self.load_path(child, block)?;
                let (group_by, aggregates) = self.parse_grouping(block.def)?;
                block.items = group_by
                    .iter()
                    .map(|g| ScopeItem::new(&g.to_string(), g.data_type()))
                    .chain(
                        aggregates
                            .iter()
                            .map(|a| ScopeItem::new(&a.name, a.data_type())),
                    )
                    .collect();
                block.grouping = Some((group_by, aggregates));
                if matches!(def, PathDef::Aggregate { .. }) {
                    AccessPath::aggregate(child, REF_SLICE_AGGREGATE)
                } else {
                    AccessPath::precomputed_aggregate(child, REF_SLICE_AGGREGATE)
                }
            }
            PathDef::LimitOffset {
                child,
                limit,
                offset,
            } => {
                let child = self.load_path(child, block)?;
                AccessPath::limit_offset(child, limit.unwrap_or(NO_LIMIT), *offset)
            }
            PathDef::Window {
                child,
                functions,
                partition_by,
                order_by,
            } => {
                let child = self.load_path(child, block)?;
                let scope = ExprScope::new(&self.tables, &block.items);
                let functions = functions
                    .iter()
                    .map(|f| parse_window_function(f, &scope))
                    .collect::<DBResult<Vec<_>>>()?;
                let partition_by = self.exprs(partition_by, block)?;
                let order_by = self.exprs(order_by, block)?;
                block.items.extend(functions.iter().map(|f| {
                    let data_type = match f {
                        WindowFunction::Aggregate(spec) => spec.data_type(),
                        WindowFunction::RowNumber | WindowFunction::Rank => DataType::UInt64,
                    };
                    ScopeItem::new(&f.to_string(), data_type)
                }));
                AccessPath::window(child, functions, partition_by, order_by, REF_SLICE_WINDOW)
            }
            PathDef::Weedout { child, tables } => {
                let child = self.load_path(child, block)?;
                let ids = tables
                    .iter()
                    .map(|name| self.table(name).map(|t| t.id()))
                    .collect::<DBResult<Vec<_>>>()?;
                AccessPath::weedout(child, TableMap::from_ids(ids))
            }
            PathDef::RemoveDuplicates { child, group_items } => {
                let child = self.load_path(child, block)?;
                AccessPath::remove_duplicates(child, self.exprs(group_items, block)?)
            }
            PathDef::CacheInvalidator { child, name } => {
                let child = self.load_path(child, block)?;
                let path = AccessPath::cache_invalidator(child, name);
                self.invalidators.insert(name.clone(), path.slot());
                path
            }
            PathDef::Materialize {
                name,
                blocks,
                deduplicate,
                rematerialize,
                limit_rows,
                invalidators,
            } => {
                let mut query_blocks = vec![];
                for block_def in blocks {
                    let loaded = self.load_query(&block_def.query)?;
                    let mut query_block =
                        MaterializeBlock::new(loaded.path, loaded.join, loaded.outputs);
                    query_block.disable_deduplication = block_def.disable_deduplication;
                    query_blocks.push(query_block);
                }
                let mut params = MaterializeParams::new(&self.ctx, name, query_blocks, *deduplicate);
                params.rematerialize = *rematerialize;
                params.limit_rows = limit_rows.unwrap_or(NO_LIMIT);
                params.invalidators = invalidators
                    .iter()
                    .map(|name| {
                        self.invalidators.get(name).cloned().ok_or_else(|| {
                            DBError::ParserError(format!("unknown cache invalidator {name}"))
                        })
                    })
                    .collect::<DBResult<Vec<_>>>()?;
                self.tables.push(Rc::clone(&params.table));
                AccessPath::materialize(params)
            }
            PathDef::Append { children } => {
                let children = children
                    .iter()
                    .map(|child| self.load_path(child, block))
                    .collect::<DBResult<Vec<_>>>()?;
                AccessPath::append(children)
            }
        };
        Ok(path)
    }
}

fn json_to_literal(value: &serde_json::Value, data_type: &DataType) -> DBResult<Literal> {
    match value {
        serde_json::Value::Null => Ok(Literal::Null),
        serde_json::Value::String(s) => Literal::parse_as(s, data_type),
        serde_json::Value::Bool(b) if *data_type == DataType::Boolean => Ok(Literal::Bool(*b)),
        serde_json::Value::Number(n) => Literal::parse_as(&n.to_string(), data_type),
        v => Err(DBError::ParserError(format!(
            "cannot store {v} in a {data_type} column"
        ))),
    }
}
