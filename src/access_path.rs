mod analysis;
mod walk;

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt::Display;
use std::rc::Rc;

use serde::Deserialize;

use crate::{
    context::{ExecContext, JoinContext},
    expressions::Expression,
    iterators::{HashJoinCondition, IteratorProfiler, SortKey, WindowFunction, NO_LIMIT},
    tables::{FieldInfo, RelationSchema, TableMap, TableRef, TempTable},
};

pub use analysis::{
    find_tables_to_get_rowid_for, get_used_table_refs, get_used_tables, should_enable_batch_mode,
};
pub use walk::{walk_access_paths, WalkPolicy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    Inner,
    Outer,
    Semi,
    Anti,
}

impl Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinType::Inner => "inner".fmt(f),
            JoinType::Outer => "left".fmt(f),
            JoinType::Semi => "semi".fmt(f),
            JoinType::Anti => "anti".fmt(f),
        }
    }
}

/// What the compiler leaves behind on a plan node for later lookups. It
/// never owns the iterator.
#[derive(Clone, Default)]
pub struct IteratorLink {
    pub profiler: Option<Rc<dyn IteratorProfiler>>,
    /// Set on cache invalidators; bumped for every row they pass.
    pub generation: Option<Rc<Cell<u64>>>,
}

impl std::fmt::Debug for IteratorLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IteratorLink")
            .field("profiled", &self.profiler.is_some())
            .field("generation", &self.generation.as_ref().map(|g| g.get()))
            .finish()
    }
}

/// Back-link slot of one plan node, written once by the compiler.
pub type IteratorSlot = Rc<OnceCell<IteratorLink>>;

/// One query block written into a materialized temp table.
pub struct MaterializeBlock {
    pub subquery_path: Box<AccessPath>,
    pub join: Rc<JoinContext>,
    /// Expressions over the block's rows, one per temp table column.
    pub copy_fields: Vec<Expression>,
    pub disable_deduplication: bool,
}

impl MaterializeBlock {
    pub fn new(subquery_path: AccessPath, join: Rc<JoinContext>, copy_fields: Vec<Expression>) -> Self {
        Self {
            subquery_path: Box::new(subquery_path),
            join,
            copy_fields,
            disable_deduplication: false,
        }
    }
}

pub struct MaterializeParams {
    pub query_blocks: Vec<MaterializeBlock>,
    pub table: TableRef,
    pub temp_table: Rc<RefCell<TempTable>>,
    pub table_path: Box<AccessPath>,
    pub rematerialize: bool,
    pub limit_rows: u64,
    /// Slots of the cache invalidators whose rows force rematerialization.
    pub invalidators: Vec<IteratorSlot>,
}

impl MaterializeParams {
    /// Materialize `query_blocks` into a new temp table named `name`. The
    /// columns take names and types from the first block's copy fields.
    pub fn new(
        ctx: &ExecContext,
        name: &str,
        query_blocks: Vec<MaterializeBlock>,
        deduplicate: bool,
    ) -> Self {
        let fields = query_blocks
            .first()
            .map(|block| {
                block
                    .copy_fields
                    .iter()
                    .map(|expr| FieldInfo::new(column_name(expr), expr.data_type()))
                    .collect()
            })
            .unwrap_or_default();
        let temp_table = Rc::new(RefCell::new(TempTable::new(
            name,
            RelationSchema::new(fields),
            deduplicate,
            ctx.config().max_in_memory_temp_rows,
        )));
        let table = ctx.new_table(name, temp_table.clone());
        let table_path = Box::new(AccessPath::table_scan(&table));
        Self {
            query_blocks,
            table,
            temp_table,
            table_path,
            rematerialize: false,
            limit_rows: NO_LIMIT,
            invalidators: vec![],
        }
    }
}

fn column_name(expr: &Expression) -> String {
    match expr {
        Expression::FieldRef { name, .. } => name.clone(),
        // a grouped column item keeps its bare column name
        Expression::ItemRef { name, .. } => match name.rsplit_once('.') {
            Some((_, column)) if !name.contains(['(', ' ']) => column.to_owned(),
            _ => name.clone(),
        },
        Expression::Alias { alias, .. } => alias.clone(),
        _ => expr.to_string(),
    }
}

pub enum PathKind {
    TableScan {
        table: TableRef,
    },
    IndexScan {
        table: TableRef,
        key_column: usize,
        reverse: bool,
    },
    Ref {
        table: TableRef,
        key_column: usize,
        key: Expression,
    },
    EqRef {
        table: TableRef,
        key_column: usize,
        key: Expression,
    },
    Mrr {
        table: TableRef,
        key_column: usize,
        key: Expression,
    },
    FakeSingleRow,
    ZeroRows {
        /// The subtree the plan proved empty, kept for its tables.
        child: Option<Box<AccessPath>>,
        cause: String,
    },
    NestedLoopJoin {
        outer: Box<AccessPath>,
        inner: Box<AccessPath>,
        join_type: JoinType,
    },
    HashJoin {
        outer: Box<AccessPath>,
        inner: Box<AccessPath>,
        join_type: JoinType,
        conditions: Vec<HashJoinCondition>,
        extra_condition: Option<Expression>,
        store_rowids: bool,
    },
    BatchedKeyAccessJoin {
        outer: Box<AccessPath>,
        inner: Box<AccessPath>,
        join_type: JoinType,
        store_rowids: bool,
    },
    Filter {
        child: Box<AccessPath>,
        condition: Expression,
    },
    Sort {
        child: Box<AccessPath>,
        order: Vec<SortKey>,
        remove_duplicates: bool,
        use_row_ids: bool,
        limit: u64,
    },
    Aggregate {
        child: Box<AccessPath>,
        output_slice: usize,
    },
    PrecomputedAggregate {
        child: Box<AccessPath>,
        output_slice: usize,
    },
    LimitOffset {
        child: Box<AccessPath>,
        limit: u64,
        offset: u64,
        count_all_rows: bool,
        skipped_rows: Option<Rc<Cell<u64>>>,
    },
    Window {
        child: Box<AccessPath>,
        functions: Vec<WindowFunction>,
        partition_by: Vec<Expression>,
        order_by: Vec<Expression>,
        output_slice: usize,
    },
    Weedout {
        child: Box<AccessPath>,
        tables: TableMap,
    },
    RemoveDuplicates {
        child: Box<AccessPath>,
        group_items: Vec<Expression>,
    },
    CacheInvalidator {
        child: Box<AccessPath>,
        name: String,
    },
    Materialize(Box<MaterializeParams>),
    Append {
        children: Vec<AccessPath>,
    },
}

/// A node of the physical plan. Immutable once built; the compiler only
/// fills the back-link slot.
pub struct AccessPath {
    pub kind: PathKind,
    link: IteratorSlot,
}

impl AccessPath {
    pub fn new(kind: PathKind) -> Self {
        Self {
            kind,
            link: Rc::new(OnceCell::new()),
        }
    }

    pub fn slot(&self) -> IteratorSlot {
        Rc::clone(&self.link)
    }

    pub fn link(&self) -> Option<&IteratorLink> {
        self.link.get()
    }

    pub(crate) fn set_link(&self, link: IteratorLink) {
        if self.link.set(link).is_err() {
            panic!("access path compiled twice: {}", self.description());
        }
    }

    pub fn table_scan(table: &TableRef) -> Self {
        Self::new(PathKind::TableScan {
            table: Rc::clone(table),
        })
    }

    pub fn index_scan(table: &TableRef, key_column: usize, reverse: bool) -> Self {
        Self::new(PathKind::IndexScan {
            table: Rc::clone(table),
            key_column,
            reverse,
        })
    }

    pub fn ref_lookup(table: &TableRef, key_column: usize, key: Expression) -> Self {
        Self::new(PathKind::Ref {
            table: Rc::clone(table),
            key_column,
            key,
        })
    }

    pub fn eq_ref(table: &TableRef, key_column: usize, key: Expression) -> Self {
        Self::new(PathKind::EqRef {
            table: Rc::clone(table),
            key_column,
            key,
        })
    }

    pub fn mrr(table: &TableRef, key_column: usize, key: Expression) -> Self {
        Self::new(PathKind::Mrr {
            table: Rc::clone(table),
            key_column,
            key,
        })
    }

    pub fn fake_single_row() -> Self {
        Self::new(PathKind::FakeSingleRow)
    }

    pub fn zero_rows(child: Option<AccessPath>, cause: &str) -> Self {
        Self::new(PathKind::ZeroRows {
            child: child.map(Box::new),
            cause: cause.to_owned(),
        })
    }

    pub fn nested_loop(outer: AccessPath, inner: AccessPath, join_type: JoinType) -> Self {
        Self::new(PathKind::NestedLoopJoin {
            outer: Box::new(outer),
            inner: Box::new(inner),
            join_type,
        })
    }

    pub fn hash_join(
        outer: AccessPath,
        inner: AccessPath,
        join_type: JoinType,
        conditions: Vec<HashJoinCondition>,
        extra_condition: Option<Expression>,
    ) -> Self {
        Self::new(PathKind::HashJoin {
            outer: Box::new(outer),
            inner: Box::new(inner),
            join_type,
            conditions,
            extra_condition,
            store_rowids: false,
        })
    }

    pub fn bka_join(outer: AccessPath, inner: AccessPath, join_type: JoinType) -> Self {
        Self::new(PathKind::BatchedKeyAccessJoin {
            outer: Box::new(outer),
            inner: Box::new(inner),
            join_type,
            store_rowids: false,
        })
    }

    /// Ask a hash or batched key access join to keep row ids of the rows
    /// it buffers.
    pub fn with_store_rowids(mut self) -> Self {
        match &mut self.kind {
            PathKind::HashJoin { store_rowids, .. }
            | PathKind::BatchedKeyAccessJoin { store_rowids, .. } => *store_rowids = true,
            _ => panic!("only buffering joins store row ids: {}", self.description()),
        }
        self
    }

    pub fn filter(child: AccessPath, condition: Expression) -> Self {
        Self::new(PathKind::Filter {
            child: Box::new(child),
            condition,
        })
    }

    pub fn sort(child: AccessPath, order: Vec<SortKey>) -> Self {
        Self::new(PathKind::Sort {
            child: Box::new(child),
            order,
            remove_duplicates: false,
            use_row_ids: false,
            limit: NO_LIMIT,
        })
    }

    pub fn aggregate(child: AccessPath, output_slice: usize) -> Self {
        Self::new(PathKind::Aggregate {
            child: Box::new(child),
            output_slice,
        })
    }

    pub fn precomputed_aggregate(child: AccessPath, output_slice: usize) -> Self {
        Self::new(PathKind::PrecomputedAggregate {
            child: Box::new(child),
            output_slice,
        })
    }

    pub fn limit_offset(child: AccessPath, limit: u64, offset: u64) -> Self {
        Self::new(PathKind::LimitOffset {
            child: Box::new(child),
            limit,
            offset,
            count_all_rows: false,
            skipped_rows: None,
        })
    }

    pub fn window(
        child: AccessPath,
        functions: Vec<WindowFunction>,
        partition_by: Vec<Expression>,
        order_by: Vec<Expression>,
        output_slice: usize,
    ) -> Self {
        Self::new(PathKind::Window {
            child: Box::new(child),
            functions,
            partition_by,
            order_by,
            output_slice,
        })
    }

    pub fn weedout(child: AccessPath, tables: TableMap) -> Self {
        Self::new(PathKind::Weedout {
            child: Box::new(child),
            tables,
        })
    }

    pub fn remove_duplicates(child: AccessPath, group_items: Vec<Expression>) -> Self {
        Self::new(PathKind::RemoveDuplicates {
            child: Box::new(child),
            group_items,
        })
    }

    pub fn cache_invalidator(child: AccessPath, name: &str) -> Self {
        Self::new(PathKind::CacheInvalidator {
            child: Box::new(child),
            name: name.to_owned(),
        })
    }

    pub fn materialize(params: MaterializeParams) -> Self {
        Self::new(PathKind::Materialize(Box::new(params)))
    }

    pub fn append(children: Vec<AccessPath>) -> Self {
        Self::new(PathKind::Append { children })
    }

    pub fn description(&self) -> String {
        match &self.kind {
            PathKind::TableScan { table } => format!("Table scan on {}", table.name()),
            PathKind::IndexScan {
                table,
                key_column,
                reverse,
            } => format!(
                "Index scan on {} using {}{}",
                table.name(),
                key_name(table, *key_column),
                if *reverse { " (reverse)" } else { "" }
            ),
            PathKind::Ref {
                table,
                key_column,
                key,
            } => format!(
                "Index lookup on {} using {} ({}={key})",
                table.name(),
                key_name(table, *key_column),
                key_name(table, *key_column)
            ),
            PathKind::EqRef {
                table,
                key_column,
                key,
            } => format!(
                "Single-row index lookup on {} using {} ({}={key})",
                table.name(),
                key_name(table, *key_column),
                key_name(table, *key_column)
            ),
            PathKind::Mrr {
                table,
                key_column,
                key,
            } => format!(
                "Multi-range index lookup on {} using {} ({}={key})",
                table.name(),
                key_name(table, *key_column),
                key_name(table, *key_column)
            ),
            PathKind::FakeSingleRow => "Rows fetched before execution".to_owned(),
            PathKind::ZeroRows { cause, .. } => format!("Zero rows ({cause})"),
            PathKind::NestedLoopJoin { join_type, .. } => match join_type {
                JoinType::Inner | JoinType::Outer => format!("Nested loop {join_type} join"),
                JoinType::Semi | JoinType::Anti => format!("Nested loop {join_type}join"),
            },
            PathKind::HashJoin {
                join_type,
                conditions,
                extra_condition,
                ..
            } => {
                let mut conds: Vec<String> = conditions
                    .iter()
                    .map(|c| format!("{} = {}", c.probe, c.build))
                    .collect();
                if let Some(extra) = extra_condition {
                    conds.push(format!("extra conditions: {extra}"));
                }
                let head = match join_type {
                    JoinType::Inner => "Inner hash join".to_owned(),
                    JoinType::Outer => "Left hash join".to_owned(),
                    JoinType::Semi | JoinType::Anti => format!("Hash {join_type}join"),
                };
                format!("{head} ({})", conds.join(", "))
            }
            PathKind::BatchedKeyAccessJoin { join_type, .. } => match join_type {
                JoinType::Inner | JoinType::Outer => {
                    format!("Batched key access {join_type} join")
                }
                JoinType::Semi | JoinType::Anti => format!("Batched key access {join_type}join"),
            },
            PathKind::Filter { condition, .. } => format!("Filter: {condition}"),
            PathKind::Sort {
                order,
                remove_duplicates,
                limit,
                ..
            } => {
                let keys: Vec<String> = order
                    .iter()
                    .map(|k| {
                        if k.asc {
                            k.expr.to_string()
                        } else {
                            format!("{} DESC", k.expr)
                        }
                    })
                    .collect();
                let mut s = if *remove_duplicates {
                    format!("Sort with duplicate removal: {}", keys.join(", "))
                } else {
                    format!("Sort: {}", keys.join(", "))
                };
                if *limit != NO_LIMIT {
                    s.push_str(&format!(", limit input to {limit} row(s)"));
                }
                s
            }
            PathKind::Aggregate { .. } => "Aggregate".to_owned(),
            PathKind::PrecomputedAggregate { .. } => {
                "Group aggregate (computed in earlier step)".to_owned()
            }
            PathKind::LimitOffset { limit, offset, .. } => {
                if *offset == 0 {
                    format!("Limit: {limit} row(s)")
                } else {
                    format!("Limit/Offset: {}/{offset} row(s)", limit.saturating_sub(*offset))
                }
            }
            PathKind::Window { functions, .. } => {
                let names: Vec<String> = functions.iter().map(|f| f.to_string()).collect();
                format!("Window aggregate: {}", names.join(", "))
            }
            PathKind::Weedout { tables, .. } => {
                format!("Remove duplicate {tables} rows using temporary table (weedout)")
            }
            PathKind::RemoveDuplicates { group_items, .. } => {
                let items: Vec<String> = group_items.iter().map(|e| e.to_string()).collect();
                format!("Remove duplicates from input grouped on {}", items.join(", "))
            }
            PathKind::CacheInvalidator { name, .. } => {
                format!("Invalidate materialized tables (row from {name})")
            }
            PathKind::Materialize(params) => {
                if params.temp_table.borrow().deduplicates() {
                    format!("Materialize with deduplication into {}", params.table.name())
                } else {
                    format!("Materialize into {}", params.table.name())
                }
            }
            PathKind::Append { .. } => "Append".to_owned(),
        }
    }
}

fn key_name(table: &TableRef, key_column: usize) -> String {
    table
        .schema()
        .get_fields()
        .get(key_column)
        .map(|f| f.name().to_owned())
        .unwrap_or_else(|| format!("#{key_column}"))
}

impl std::fmt::Debug for AccessPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPath")
            .field("description", &self.description())
            .field("link", &self.link.get())
            .finish()
    }
}
