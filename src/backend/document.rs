use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{Backend, BackendError, Record, Scope, StorageBackend, Stored};
use crate::context::RequestContext;
use crate::model::Expr;
use crate::uri::Uri;

/// Document key holding the URI.
pub const ID_FIELD: &str = "_id";
/// Document key holding the class name.
pub const CLASS_FIELD: &str = "_class";

#[derive(Clone, Debug)]
struct Document {
    body: Map<String, Value>,
    version: u64,
}

/// In-memory document store. One collection per named graph; documents are
/// keyed by URI and carry their class in `_class`.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, BTreeMap<String, Document>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn to_document(scope: &Scope, record: &Record) -> Map<String, Value> {
        let mut body = record.fields.clone();
        body.insert(ID_FIELD.to_string(), Value::String(record.uri.to_string()));
        body.insert(CLASS_FIELD.to_string(), Value::String(scope.class.to_string()));
        body
    }

    fn is_instance(scope: &Scope, doc: &Document) -> bool {
        doc.body.get(CLASS_FIELD).and_then(Value::as_str) == Some(scope.class)
    }

    fn to_stored(uri: &str, doc: &Document) -> Stored {
        let mut fields = doc.body.clone();
        fields.remove(ID_FIELD);
        fields.remove(CLASS_FIELD);
        Stored {
            record: Record {
                uri: Uri::from_trusted(uri.to_string()),
                fields,
            },
            version: doc.version,
        }
    }

    /// Raw documents of a collection, `_id` and `_class` included.
    pub fn documents(&self, collection: &Uri) -> Result<Vec<Value>, BackendError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| BackendError::Poisoned("documents"))?;
        Ok(collections
            .get(collection.as_str())
            .map(|docs| docs.values().map(|d| Value::Object(d.body.clone())).collect())
            .unwrap_or_default())
    }

    pub fn collection_len(&self, collection: &Uri) -> Result<usize, BackendError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| BackendError::Poisoned("collection len"))?;
        Ok(collections.get(collection.as_str()).map_or(0, BTreeMap::len))
    }
}

impl StorageBackend for InMemoryDocumentStore {
    fn kind(&self) -> Backend {
        Backend::Document
    }

    #[instrument(skip(self, ctx, scope), fields(backend = "document", collection = %scope.graph))]
    fn fetch(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<Option<Stored>, BackendError> {
        ctx.check("document fetch")?;
        let collections = self
            .collections
            .read()
            .map_err(|_| BackendError::Poisoned("fetch"))?;
        Ok(collections
            .get(scope.graph.as_str())
            .and_then(|docs| docs.get(uri.as_str()))
            .filter(|doc| Self::is_instance(scope, doc))
            .map(|doc| Self::to_stored(uri.as_str(), doc)))
    }

    #[instrument(skip(self, ctx, scope, record), fields(backend = "document", uri = %record.uri))]
    fn insert(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError> {
        ctx.check("document insert")?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| BackendError::Poisoned("insert"))?;
        let docs = collections.entry(scope.graph.to_string()).or_default();
        if docs.contains_key(record.uri.as_str()) {
            return Err(BackendError::Conflict {
                graph: scope.graph.to_string(),
                uri: record.uri.clone(),
            });
        }
        docs.insert(
            record.uri.to_string(),
            Document {
                body: Self::to_document(scope, record),
                version: 1,
            },
        );
        Ok(1)
    }

    #[instrument(skip(self, ctx, scope, record), fields(backend = "document", uri = %record.uri))]
    fn replace(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError> {
        ctx.check("document replace")?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| BackendError::Poisoned("replace"))?;
        let doc = collections
            .get_mut(scope.graph.as_str())
            .and_then(|docs| docs.get_mut(record.uri.as_str()))
            .filter(|doc| Self::is_instance(scope, doc))
            .ok_or_else(|| BackendError::Missing {
                graph: scope.graph.to_string(),
                uri: record.uri.clone(),
            })?;
        doc.body = Self::to_document(scope, record);
        doc.version += 1;
        Ok(doc.version)
    }

    #[instrument(skip(self, ctx, scope), fields(backend = "document", collection = %scope.graph))]
    fn delete(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<bool, BackendError> {
        ctx.check("document delete")?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| BackendError::Poisoned("delete"))?;
        let Some(docs) = collections.get_mut(scope.graph.as_str()) else {
            return Ok(false);
        };
        if !docs.get(uri.as_str()).is_some_and(|doc| Self::is_instance(scope, doc)) {
            return Ok(false);
        }
        Ok(docs.remove(uri.as_str()).is_some())
    }

    fn find(&self, ctx: &RequestContext, scope: &Scope, expr: &Expr) -> Result<Vec<Stored>, BackendError> {
        ctx.check("document find")?;
        debug!(filter = %expr.to_document(ID_FIELD), collection = %scope.graph, "document find");
        let collections = self
            .collections
            .read()
            .map_err(|_| BackendError::Poisoned("find"))?;
        let Some(docs) = collections.get(scope.graph.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, doc)| Self::is_instance(scope, doc))
            .map(|(uri, doc)| Self::to_stored(uri, doc))
            .filter(|stored| expr.matches(&stored.record))
            .collect())
    }
}
