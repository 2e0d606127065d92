use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Number, Value};
use tracing::{debug, instrument};

use super::{Backend, BackendError, Record, Scope, StorageBackend, Stored};
use crate::context::RequestContext;
use crate::model::Expr;
use crate::uri::{normalize_segment, Uri};

/// Primary key column of every table.
pub const URI_COLUMN: &str = "uri";
const CLASS_COLUMN: &str = "class";

/// A typed cell value.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Arrays and objects are kept as a JSON column.
    Json(Value),
}

impl From<&Value> for Column {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Column::Null,
            Value::Bool(b) => Column::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Column::Int(i),
                None => match n.as_f64() {
                    Some(f) if n.is_f64() => Column::Float(f),
                    _ => Column::Json(value.clone()),
                },
            },
            Value::String(s) => Column::Text(s.clone()),
            other => Column::Json(other.clone()),
        }
    }
}

impl From<Column> for Value {
    fn from(column: Column) -> Self {
        match column {
            Column::Null => Value::Null,
            Column::Bool(b) => Value::Bool(b),
            Column::Int(i) => Value::Number(i.into()),
            Column::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            Column::Text(s) => Value::String(s),
            Column::Json(v) => v,
        }
    }
}

/// Table holding the classes of a graph prefix.
pub(crate) fn table_name(graph_prefix: &str) -> String {
    normalize_segment(graph_prefix).replace(['-', '.'], "_")
}

#[derive(Clone, Debug)]
struct Row {
    class: String,
    cells: BTreeMap<String, Column>,
    version: u64,
}

/// In-memory relational store. One table per graph prefix, primary key
/// `uri`, one column per record field.
#[derive(Clone, Default)]
pub struct InMemoryRelationalStore {
    tables: Arc<RwLock<HashMap<String, BTreeMap<String, Row>>>>,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table name for a scope.
    pub fn table_name(scope: &Scope) -> String {
        table_name(scope.graph_prefix)
    }

    fn to_row(scope: &Scope, record: &Record) -> Row {
        Row {
            class: scope.class.to_string(),
            cells: record
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), Column::from(v)))
                .collect(),
            version: 1,
        }
    }

    fn to_stored(uri: &str, row: &Row) -> Stored {
        let fields: Map<String, Value> = row
            .cells
            .iter()
            .map(|(k, c)| (k.clone(), Value::from(c.clone())))
            .collect();
        Stored {
            record: Record {
                uri: Uri::from_trusted(uri.to_string()),
                fields,
            },
            version: row.version,
        }
    }

    /// Rows of a table as `(uri, cells)`, ordered by primary key. The class
    /// discriminator is reported as the `class` cell.
    pub fn rows(&self, table: &str) -> Result<Vec<(Uri, BTreeMap<String, Column>)>, BackendError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| BackendError::Poisoned("rows"))?;
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(uri, row)| {
                        let mut cells = row.cells.clone();
                        cells.insert(CLASS_COLUMN.to_string(), Column::Text(row.class.clone()));
                        (Uri::from_trusted(uri.clone()), cells)
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl StorageBackend for InMemoryRelationalStore {
    fn kind(&self) -> Backend {
        Backend::Relational
    }

    #[instrument(skip(self, ctx, scope), fields(backend = "relational", table = scope.graph_prefix))]
    fn fetch(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<Option<Stored>, BackendError> {
        ctx.check("relational fetch")?;
        let tables = self
            .tables
            .read()
            .map_err(|_| BackendError::Poisoned("fetch"))?;
        Ok(tables
            .get(&Self::table_name(scope))
            .and_then(|rows| rows.get(uri.as_str()))
            .filter(|row| row.class == scope.class)
            .map(|row| Self::to_stored(uri.as_str(), row)))
    }

    #[instrument(skip(self, ctx, scope, record), fields(backend = "relational", uri = %record.uri))]
    fn insert(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError> {
        ctx.check("relational insert")?;
        if record.fields.contains_key(URI_COLUMN) || record.fields.contains_key(CLASS_COLUMN) {
            return Err(BackendError::Unsupported(format!(
                "{} fields may not be named {:?} or {:?}",
                scope.class, URI_COLUMN, CLASS_COLUMN
            )));
        }
        let mut tables = self
            .tables
            .write()
            .map_err(|_| BackendError::Poisoned("insert"))?;
        let table = Self::table_name(scope);
        let rows = tables.entry(table.clone()).or_default();
        if rows.contains_key(record.uri.as_str()) {
            return Err(BackendError::Conflict {
                graph: table,
                uri: record.uri.clone(),
            });
        }
        rows.insert(record.uri.to_string(), Self::to_row(scope, record));
        Ok(1)
    }

    #[instrument(skip(self, ctx, scope, record), fields(backend = "relational", uri = %record.uri))]
    fn replace(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError> {
        ctx.check("relational replace")?;
        let mut tables = self
            .tables
            .write()
            .map_err(|_| BackendError::Poisoned("replace"))?;
        let table = Self::table_name(scope);
        let row = tables
            .get_mut(&table)
            .and_then(|rows| rows.get_mut(record.uri.as_str()))
            .filter(|row| row.class == scope.class)
            .ok_or_else(|| BackendError::Missing {
                graph: table.clone(),
                uri: record.uri.clone(),
            })?;
        let version = row.version + 1;
        *row = Self::to_row(scope, record);
        row.version = version;
        Ok(version)
    }

    #[instrument(skip(self, ctx, scope), fields(backend = "relational", table = scope.graph_prefix))]
    fn delete(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<bool, BackendError> {
        ctx.check("relational delete")?;
        let mut tables = self
            .tables
            .write()
            .map_err(|_| BackendError::Poisoned("delete"))?;
        let Some(rows) = tables.get_mut(&Self::table_name(scope)) else {
            return Ok(false);
        };
        if !rows.get(uri.as_str()).is_some_and(|row| row.class == scope.class) {
            return Ok(false);
        }
        Ok(rows.remove(uri.as_str()).is_some())
    }

    fn find(&self, ctx: &RequestContext, scope: &Scope, expr: &Expr) -> Result<Vec<Stored>, BackendError> {
        ctx.check("relational find")?;
        let table = Self::table_name(scope);
        debug!(
            sql = %format!("SELECT * FROM {} WHERE {}", table, expr.to_sql(None, URI_COLUMN)),
            "relational find"
        );
        let tables = self
            .tables
            .read()
            .map_err(|_| BackendError::Poisoned("find"))?;
        let Some(rows) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|(_, row)| row.class == scope.class)
            .map(|(uri, row)| Self::to_stored(uri, row))
            .filter(|stored| expr.matches(&stored.record))
            .collect())
    }
}
