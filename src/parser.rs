use sqlparser::{
    ast::{
        BinaryOperator, Expr, Function, FunctionArg, FunctionArgExpr, SelectItem, UnaryOperator,
        Value,
    },
    dialect::GenericDialect,
    parser::Parser,
};

use crate::{
    aggregators::{AggregateKind, AggregateSpec},
    data_types::DataType,
    expressions::{BinaryOp, Expression, Literal, UnaryOp},
    iterators::WindowFunction,
    tables::TableRef,
    DBError, DBResult,
};

/// A named item of the active ref slice, e.g. a group value or an
/// aggregate result published by an aggregate iterator.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeItem {
    pub name: String,
    pub data_type: DataType,
}

impl ScopeItem {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_owned(),
            data_type,
        }
    }
}

/// What names in expression text resolve to: columns of `tables`, and the
/// items of the active slice by their printed name.
pub struct ExprScope<'a> {
    tables: &'a [TableRef],
    items: &'a [ScopeItem],
}

impl<'a> ExprScope<'a> {
    pub fn new(tables: &'a [TableRef], items: &'a [ScopeItem]) -> Self {
        Self { tables, items }
    }

    /// Replace `expr` by a reference to the slice item printed the same way.
    fn bind_item(&self, expr: Expression) -> Expression {
        if self.items.is_empty() || matches!(expr, Expression::Literal(_)) {
            return expr;
        }
        let name = expr.to_string();
        match self.items.iter().position(|item| item.name == name) {
            Some(slot) => Expression::item(&name, slot, self.items[slot].data_type.clone()),
            None => expr,
        }
    }

    fn resolve_column(&self, name: &str) -> DBResult<Expression> {
        if let Some(slot) = self.items.iter().position(|item| item.name == name) {
            return Ok(Expression::item(name, slot, self.items[slot].data_type.clone()));
        }
        let mut found = self
            .tables
            .iter()
            .filter_map(|table| table.schema().index_of(name).map(|index| (table, index)));
        match (found.next(), found.next()) {
            (Some((table, index)), None) => Ok(Expression::field(table, index)),
            (Some(_), Some(_)) => Err(DBError::ParserError(format!(
                "column {name} is ambiguous"
            ))),
            (None, _) => Err(DBError::ParserError(format!("unknown column {name}"))),
        }
    }

    fn resolve_qualified(&self, table_name: &str, name: &str) -> DBResult<Expression> {
        let table = self
            .tables
            .iter()
            .find(|table| table.name().eq_ignore_ascii_case(table_name))
            .ok_or_else(|| DBError::TableNotFound(table_name.to_owned()))?;
        match table.schema().index_of(name) {
            Some(index) => Ok(self.bind_item(Expression::field(table, index))),
            None => Err(DBError::ParserError(format!(
                "unknown column {name} in table {table_name}"
            ))),
        }
    }
}

fn parse_ast(sql: &str) -> DBResult<Expr> {
    let dialect = GenericDialect {};
    Ok(Parser::new(&dialect).try_with_sql(sql)?.parse_expr()?)
}

/// Parse expression text like `t1.a + 1 > t2.b` against `scope`.
pub fn parse_expression(sql: &str, scope: &ExprScope) -> DBResult<Expression> {
    ast_expr_to_plan_expr(&parse_ast(sql)?, scope)
}

/// Parse an output column, optionally aliased as in `sum(t.b) AS total`.
/// Returns the expression and its column header.
pub fn parse_output(sql: &str, scope: &ExprScope) -> DBResult<(Expression, String)> {
    let dialect = GenericDialect {};
    match Parser::new(&dialect).try_with_sql(sql)?.parse_select_item()? {
        SelectItem::UnnamedExpr(expr) => {
            Ok((ast_expr_to_plan_expr(&expr, scope)?, sql.trim().to_owned()))
        }
        SelectItem::ExprWithAlias { expr, alias } => {
            let child = ast_expr_to_plan_expr(&expr, scope)?;
            let output = Expression::Alias {
                alias: alias.value.clone(),
                child: Box::new(child),
            };
            Ok((output, alias.value))
        }
        item => Err(DBError::ParserError(format!("unsupported output {item}"))),
    }
}

pub fn parse_aggregate(sql: &str, scope: &ExprScope) -> DBResult<AggregateSpec> {
    match parse_ast(sql)? {
        Expr::Function(function) => match ast_function_to_aggregate(&function, scope)? {
            Some(spec) => Ok(spec),
            None => Err(DBError::ParserError(format!(
                "{} is not an aggregate function",
                function.name
            ))),
        },
        expr => Err(DBError::ParserError(format!(
            "expected an aggregate function, got {expr}"
        ))),
    }
}

/// Parse a window function: `row_number()`, `rank()` or an aggregate.
pub fn parse_window_function(sql: &str, scope: &ExprScope) -> DBResult<WindowFunction> {
    let Expr::Function(function) = parse_ast(sql)? else {
        return Err(DBError::ParserError(format!(
            "expected a window function, got {sql}"
        )));
    };
    match function.name.to_string().to_lowercase().as_str() {
        "row_number" => Ok(WindowFunction::RowNumber),
        "rank" => Ok(WindowFunction::Rank),
        _ => match ast_function_to_aggregate(&function, scope)? {
            Some(spec) => Ok(WindowFunction::Aggregate(spec)),
            None => Err(DBError::ParserError(format!(
                "unsupported window function {}",
                function.name
            ))),
        },
    }
}

pub fn parse_data_type(sql: &str) -> DBResult<DataType> {
    let dialect = GenericDialect {};
    let data_type = Parser::new(&dialect).try_with_sql(sql)?.parse_data_type()?;
    match DataType::from(data_type) {
        DataType::Unknown => Err(DBError::ParserError(format!("unsupported column type {sql}"))),
        data_type => Ok(data_type),
    }
}

fn ast_function_to_aggregate(
    function: &Function,
    scope: &ExprScope,
) -> DBResult<Option<AggregateSpec>> {
    let Some(kind) = AggregateKind::from_name(&function.name.to_string()) else {
        return Ok(None);
    };
    let arg = match function.args.as_slice() {
        [] => None,
        [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)] if kind == AggregateKind::Count => None,
        [FunctionArg::Unnamed(FunctionArgExpr::Expr(expr))] => {
            // the argument is evaluated per input row, below the aggregate
            let base = ExprScope::new(scope.tables, &[]);
            Some(ast_expr_to_plan_expr(expr, &base)?)
        }
        _ => {
            return Err(DBError::ParserError(format!(
                "unsupported arguments of {}",
                function.name
            )))
        }
    };
    if arg.is_none() && kind != AggregateKind::Count {
        return Err(DBError::ParserError(format!("{kind} needs an argument")));
    }
    Ok(Some(AggregateSpec::new(kind, arg)))
}

fn ast_binary_op_to_plan_binary_op(op: &BinaryOperator) -> DBResult<BinaryOp> {
    match op {
        BinaryOperator::Plus => Ok(BinaryOp::Plus),
        BinaryOperator::Minus => Ok(BinaryOp::Minus),
        BinaryOperator::Multiply => Ok(BinaryOp::Multiply),
        BinaryOperator::Divide => Ok(BinaryOp::Divide),
        BinaryOperator::Gt => Ok(BinaryOp::Gt),
        BinaryOperator::Lt => Ok(BinaryOp::Lt),
        BinaryOperator::GtEq => Ok(BinaryOp::Gte),
        BinaryOperator::LtEq => Ok(BinaryOp::Lte),
        BinaryOperator::Eq => Ok(BinaryOp::Eq),
        BinaryOperator::NotEq => Ok(BinaryOp::NotEq),
        BinaryOperator::And => Ok(BinaryOp::And),
        BinaryOperator::Or => Ok(BinaryOp::Or),
        op => Err(DBError::ParserError(format!("unsupported operator {op}"))),
    }
}

fn ast_unary_op_to_plan_unary_op(op: &UnaryOperator) -> DBResult<UnaryOp> {
    match op {
        UnaryOperator::Minus => Ok(UnaryOp::Neg),
        UnaryOperator::Not => Ok(UnaryOp::Not),
        op => Err(DBError::ParserError(format!("unsupported operator {op}"))),
    }
}

fn ast_value_to_literal(value: &Value) -> DBResult<Literal> {
    match value {
        Value::Number(v, _) if v.contains(['.', 'e', 'E']) => Ok(Literal::Float64(v.parse()?)),
        Value::Number(v, _) => match v.parse::<i64>() {
            Ok(v) => Ok(i32::try_from(v).map_or(Literal::Int64(v), Literal::Int32)),
            Err(_) => Ok(Literal::UInt64(v.parse()?)),
        },
        Value::SingleQuotedString(v) | Value::DoubleQuotedString(v) => {
            Ok(Literal::String(v.to_string()))
        }
        Value::Boolean(v) => Ok(Literal::Bool(*v)),
        Value::Null => Ok(Literal::Null),
        v => Err(DBError::ParserError(format!("unsupported value {v}"))),
    }
}

fn ast_expr_to_plan_expr(expr: &Expr, scope: &ExprScope) -> DBResult<Expression> {
    let plan_expr = match expr {
        Expr::BinaryOp { left, op, right } => Expression::binary(
            ast_binary_op_to_plan_binary_op(op)?,
            ast_expr_to_plan_expr(left, scope)?,
            ast_expr_to_plan_expr(right, scope)?,
        ),
        Expr::UnaryOp { op, expr } => Expression::UnaryOp {
            op: ast_unary_op_to_plan_unary_op(op)?,
            input: Box::new(ast_expr_to_plan_expr(expr, scope)?),
        },
        Expr::Nested(expr) => ast_expr_to_plan_expr(expr, scope)?,
        Expr::IsNull(expr) => Expression::IsNull {
            negated: false,
            input: Box::new(ast_expr_to_plan_expr(expr, scope)?),
        },
        Expr::IsNotNull(expr) => Expression::IsNull {
            negated: true,
            input: Box::new(ast_expr_to_plan_expr(expr, scope)?),
        },
        Expr::Identifier(identifier) => scope.resolve_column(&identifier.value)?,
        Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [table, column] => scope.resolve_qualified(&table.value, &column.value)?,
            _ => {
                return Err(DBError::ParserError(format!(
                    "unsupported identifier {expr}"
                )))
            }
        },
        Expr::Value(value) => Expression::Literal(ast_value_to_literal(value)?),
        Expr::Function(function) if function.name.to_string().eq_ignore_ascii_case("item") => {
            // item(n): slot n of the active slice
            match function.args.as_slice() {
                [FunctionArg::Unnamed(FunctionArgExpr::Expr(Expr::Value(Value::Number(n, _))))] => {
                    Expression::item(&format!("item({n})"), n.parse()?, DataType::Unknown)
                }
                _ => {
                    return Err(DBError::ParserError(format!(
                        "item() takes a slot number: {expr}"
                    )))
                }
            }
        }
        Expr::Function(function)
            if scope
                .items
                .iter()
                .any(|item| item.name.eq_ignore_ascii_case(&function.to_string())) =>
        {
            // window functions like row_number() are only readable as items
            let name = function.to_string();
            let slot = scope
                .items
                .iter()
                .position(|item| item.name.eq_ignore_ascii_case(&name))
                .unwrap_or_default();
            Expression::item(&name, slot, scope.items[slot].data_type.clone())
        }
        Expr::Function(function) => match ast_function_to_aggregate(function, scope)? {
            Some(spec) => {
                match scope.items.iter().position(|item| item.name == spec.name) {
                    Some(slot) => Expression::item(&spec.name, slot, spec.data_type()),
                    None => {
                        return Err(DBError::ParserError(format!(
                            "aggregate {} is not computed in this query block",
                            spec.name
                        )))
                    }
                }
            }
            None => {
                return Err(DBError::ParserError(format!(
                    "unknown function {}",
                    function.name
                )))
            }
        },
        _ => {
            return Err(DBError::ParserError(format!(
                "unsupported expression {expr}"
            )))
        }
    };
    Ok(scope.bind_item(plan_expr))
}
