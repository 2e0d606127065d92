use std::fmt;

use serde_json::Value;

use super::JoinKind;
use crate::backend::relational::{table_name, URI_COLUMN};
use crate::model::expr::{qualified, quote_ident, sql_literal, sql_value};
use crate::model::{Expr, GraphModel};

/// Comparison operator of a `WHERE` condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    /// Case-insensitive substring match, rendered `ILIKE '%value%'`.
    Contains,
}

impl SqlOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlOperator::Eq => "=",
            SqlOperator::NotEq => "<>",
            SqlOperator::Lt => "<",
            SqlOperator::LtEq => "<=",
            SqlOperator::Gt => ">",
            SqlOperator::GtEq => ">=",
            SqlOperator::Like => "LIKE",
            SqlOperator::Contains => "ILIKE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Connector {
    And,
    Or,
}

#[derive(Clone, Debug)]
struct TableRef {
    table: String,
    alias: Option<String>,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote_ident(&self.table))?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", alias)?;
        }
        Ok(())
    }
}

/// Incremental `SELECT` builder.
///
/// ```
/// use uri_store::{JoinKind, SqlOperator, SqlQueryBuilder};
///
/// let sql = SqlQueryBuilder::new()
///     .from("plot", Some("p"))
///     .join(JoinKind::Left, "site", Some("s"), "p.\"site\" = s.\"uri\"")
///     .and_where(Some("p"), "name", SqlOperator::Contains, "north")
///     .limit(10)
///     .build();
/// assert_eq!(
///     sql,
///     "SELECT * FROM \"plot\" AS p LEFT JOIN \"site\" AS s ON p.\"site\" = s.\"uri\" \
///      WHERE p.\"name\" ILIKE '%north%' LIMIT 10"
/// );
/// ```
#[derive(Clone, Debug, Default)]
pub struct SqlQueryBuilder {
    columns: Vec<String>,
    count: bool,
    distinct: bool,
    from: Vec<TableRef>,
    joins: Vec<String>,
    conditions: Vec<(Connector, String)>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SqlQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select raw column expressions.
    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Select a quoted column, qualified by `alias` when given.
    pub fn select_column(&mut self, alias: Option<&str>, column: &str) -> &mut Self {
        self.columns.push(qualified(alias, column));
        self
    }

    /// Wrap the selection in `count(...)`.
    pub fn count(&mut self) -> &mut Self {
        self.count = true;
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    pub fn from(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        self.from.push(TableRef {
            table: table.to_string(),
            alias: alias.map(str::to_string),
        });
        self
    }

    /// `FROM` the table holding `M`'s graph prefix.
    pub fn from_model<M: GraphModel>(&mut self, alias: Option<&str>) -> &mut Self {
        self.from(&table_name(M::GRAPH_PREFIX), alias)
    }

    /// Append a join. `on` is ignored for natural joins.
    pub fn join(&mut self, kind: JoinKind, table: &str, alias: Option<&str>, on: &str) -> &mut Self {
        let target = TableRef {
            table: table.to_string(),
            alias: alias.map(str::to_string),
        };
        let clause = if kind.takes_constraint() {
            format!("{} {} ON {}", kind, target, on)
        } else {
            format!("{} {}", kind, target)
        };
        self.joins.push(clause);
        self
    }

    pub fn join_model<M: GraphModel>(&mut self, kind: JoinKind, alias: Option<&str>, on: &str) -> &mut Self {
        self.join(kind, &table_name(M::GRAPH_PREFIX), alias, on)
    }

    pub fn and_where(
        &mut self,
        alias: Option<&str>,
        column: &str,
        op: SqlOperator,
        value: impl Into<Value>,
    ) -> &mut Self {
        let condition = comparison(alias, column, op, &value.into());
        self.push(Connector::And, condition)
    }

    pub fn or_where(
        &mut self,
        alias: Option<&str>,
        column: &str,
        op: SqlOperator,
        value: impl Into<Value>,
    ) -> &mut Self {
        let condition = comparison(alias, column, op, &value.into());
        self.push(Connector::Or, condition)
    }

    /// Compare two columns, typically across joined tables.
    pub fn and_where_columns(
        &mut self,
        alias: Option<&str>,
        column: &str,
        op: SqlOperator,
        other_alias: Option<&str>,
        other_column: &str,
    ) -> &mut Self {
        let condition = format!(
            "{} {} {}",
            qualified(alias, column),
            op.as_sql(),
            qualified(other_alias, other_column)
        );
        self.push(Connector::And, condition)
    }

    pub fn is_null(&mut self, alias: Option<&str>, column: &str) -> &mut Self {
        let condition = format!("{} IS NULL", qualified(alias, column));
        self.push(Connector::And, condition)
    }

    /// `column IN (...)`; a single value becomes `=`, no value never matches.
    pub fn where_in<I, V>(&mut self, alias: Option<&str>, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let condition = match values.as_slice() {
            [] => "FALSE".to_string(),
            [one] => comparison(alias, column, SqlOperator::Eq, one),
            many => {
                let items: Vec<String> = many.iter().map(sql_value).collect();
                format!("{} IN ({})", qualified(alias, column), items.join(", "))
            }
        };
        self.push(Connector::And, condition)
    }

    /// AND a backend-neutral predicate, with URIs in the `uri` column.
    pub fn where_expr(&mut self, alias: Option<&str>, expr: &Expr) -> &mut Self {
        if matches!(expr, Expr::All) {
            return self;
        }
        let condition = expr.to_sql(alias, URI_COLUMN);
        self.push(Connector::And, condition)
    }

    pub fn order_by(&mut self, alias: Option<&str>, column: &str, order: Order) -> &mut Self {
        let direction = match order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };
        self.order_by.push(format!("{} {}", qualified(alias, column), direction));
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    fn push(&mut self, connector: Connector, condition: String) -> &mut Self {
        self.conditions.push((connector, condition));
        self
    }

    pub fn build(&self) -> String {
        let selection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let selection = if self.count {
            format!("count({})", selection)
        } else {
            selection
        };
        let mut sql = if self.distinct {
            format!("SELECT DISTINCT {}", selection)
        } else {
            format!("SELECT {}", selection)
        };

        if !self.from.is_empty() {
            let tables: Vec<String> = self.from.iter().map(ToString::to_string).collect();
            sql.push_str(" FROM ");
            sql.push_str(&tables.join(", "));
        }
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        for (i, (connector, condition)) in self.conditions.iter().enumerate() {
            sql.push_str(match (i, connector) {
                (0, _) => " WHERE ",
                (_, Connector::And) => " AND ",
                (_, Connector::Or) => " OR ",
            });
            sql.push_str(condition);
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }
}

impl fmt::Display for SqlQueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

fn comparison(alias: Option<&str>, column: &str, op: SqlOperator, value: &Value) -> String {
    let rendered = match (op, value) {
        (SqlOperator::Contains, Value::String(s)) => sql_literal(&format!("%{}%", s)),
        (SqlOperator::Contains, other) => sql_literal(&format!("%{}%", other)),
        (_, other) => sql_value(other),
    };
    format!("{} {} {}", qualified(alias, column), op.as_sql(), rendered)
}
