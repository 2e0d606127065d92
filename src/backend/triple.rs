//! InMemoryTripleStore - named graphs of RDF-style triples.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use tracing::instrument;

use super::{Backend, BackendError, Record, Scope, StorageBackend, Stored};
use crate::context::RequestContext;
use crate::model::Expr;
use crate::uri::Uri;

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Object position of a triple.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    Iri(String),
    Literal(Value),
}

impl Term {
    fn from_value(value: &Value) -> Option<Term> {
        match value {
            Value::Null => None,
            Value::String(s) if Uri::is_uri_like(s) => Some(Term::Iri(s.clone())),
            other => Some(Term::Literal(other.clone())),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Term::Iri(iri) => Value::String(iri),
            Term::Literal(value) => value,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

struct Resource {
    properties: Vec<(String, Term)>,
    version: u64,
}

type Graph = BTreeMap<String, Resource>;

/// In-memory triple store.
///
/// A record becomes one `rdf:type` triple plus one triple per non-null
/// field, in the named graph of its scope. Predicates are
/// `{graph}#{field}`. Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct InMemoryTripleStore {
    graphs: Arc<RwLock<HashMap<String, Graph>>>,
}

impl InMemoryTripleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn class_iri(scope: &Scope) -> String {
        format!("{}#{}", scope.graph, scope.class)
    }

    fn predicate(scope: &Scope, field: &str) -> String {
        format!("{}#{}", scope.graph, field)
    }

    fn to_properties(scope: &Scope, record: &Record) -> Vec<(String, Term)> {
        let mut properties = vec![(RDF_TYPE.to_string(), Term::Iri(Self::class_iri(scope)))];
        for (field, value) in &record.fields {
            if let Some(term) = Term::from_value(value) {
                properties.push((Self::predicate(scope, field), term));
            }
        }
        properties
    }

    fn is_instance(scope: &Scope, resource: &Resource) -> bool {
        let class = Self::class_iri(scope);
        resource
            .properties
            .iter()
            .any(|(p, o)| p == RDF_TYPE && *o == Term::Iri(class.clone()))
    }

    fn to_stored(scope: &Scope, subject: &str, resource: &Resource) -> Stored {
        let prefix = format!("{}#", scope.graph);
        let mut fields = Map::new();
        for (predicate, object) in &resource.properties {
            if let Some(field) = predicate.strip_prefix(&prefix) {
                fields.insert(field.to_string(), object.clone().into_value());
            }
        }
        Stored {
            record: Record {
                uri: Uri::from_trusted(subject.to_string()),
                fields,
            },
            version: resource.version,
        }
    }

    /// All triples of a named graph, ordered by subject.
    pub fn triples(&self, graph: &Uri) -> Result<Vec<Triple>, BackendError> {
        let graphs = self
            .graphs
            .read()
            .map_err(|_| BackendError::Poisoned("triples"))?;
        let mut triples = Vec::new();
        if let Some(resources) = graphs.get(graph.as_str()) {
            for (subject, resource) in resources {
                for (predicate, object) in &resource.properties {
                    triples.push(Triple {
                        subject: subject.clone(),
                        predicate: predicate.clone(),
                        object: object.clone(),
                    });
                }
            }
        }
        Ok(triples)
    }

    /// Drop every triple of a named graph.
    pub fn clear_graph(&self, graph: &Uri) -> Result<(), BackendError> {
        let mut graphs = self
            .graphs
            .write()
            .map_err(|_| BackendError::Poisoned("clear graph"))?;
        graphs.remove(graph.as_str());
        Ok(())
    }

    /// True if the URI appears as a subject or an IRI object in any graph.
    pub fn uri_exists(&self, uri: &Uri) -> Result<bool, BackendError> {
        let graphs = self
            .graphs
            .read()
            .map_err(|_| BackendError::Poisoned("uri exists"))?;
        Ok(graphs.values().any(|resources| {
            resources.contains_key(uri.as_str())
                || resources.values().any(|r| {
                    r.properties
                        .iter()
                        .any(|(_, o)| matches!(o, Term::Iri(iri) if iri == uri.as_str()))
                })
        }))
    }
}

impl StorageBackend for InMemoryTripleStore {
    fn kind(&self) -> Backend {
        Backend::Triple
    }

    #[instrument(skip(self, ctx, scope), fields(backend = "triple", graph = %scope.graph))]
    fn fetch(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<Option<Stored>, BackendError> {
        ctx.check("triple fetch")?;
        let graphs = self
            .graphs
            .read()
            .map_err(|_| BackendError::Poisoned("fetch"))?;
        Ok(graphs
            .get(scope.graph.as_str())
            .and_then(|g| g.get(uri.as_str()))
            .filter(|r| Self::is_instance(scope, r))
            .map(|r| Self::to_stored(scope, uri.as_str(), r)))
    }

    #[instrument(skip(self, ctx, scope, record), fields(backend = "triple", uri = %record.uri))]
    fn insert(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError> {
        ctx.check("triple insert")?;
        let mut graphs = self
            .graphs
            .write()
            .map_err(|_| BackendError::Poisoned("insert"))?;
        let graph = graphs.entry(scope.graph.to_string()).or_default();
        if graph.contains_key(record.uri.as_str()) {
            return Err(BackendError::Conflict {
                graph: scope.graph.to_string(),
                uri: record.uri.clone(),
            });
        }
        graph.insert(
            record.uri.to_string(),
            Resource {
                properties: Self::to_properties(scope, record),
                version: 1,
            },
        );
        Ok(1)
    }

    #[instrument(skip(self, ctx, scope, record), fields(backend = "triple", uri = %record.uri))]
    fn replace(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError> {
        ctx.check("triple replace")?;
        let mut graphs = self
            .graphs
            .write()
            .map_err(|_| BackendError::Poisoned("replace"))?;
        let resource = graphs
            .get_mut(scope.graph.as_str())
            .and_then(|g| g.get_mut(record.uri.as_str()))
            .filter(|r| Self::is_instance(scope, r))
            .ok_or_else(|| BackendError::Missing {
                graph: scope.graph.to_string(),
                uri: record.uri.clone(),
            })?;
        resource.properties = Self::to_properties(scope, record);
        resource.version += 1;
        Ok(resource.version)
    }

    #[instrument(skip(self, ctx, scope), fields(backend = "triple", graph = %scope.graph))]
    fn delete(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<bool, BackendError> {
        ctx.check("triple delete")?;
        let mut graphs = self
            .graphs
            .write()
            .map_err(|_| BackendError::Poisoned("delete"))?;
        let Some(graph) = graphs.get_mut(scope.graph.as_str()) else {
            return Ok(false);
        };
        // subjects of another class sharing the graph are left alone
        if !graph.get(uri.as_str()).is_some_and(|r| Self::is_instance(scope, r)) {
            return Ok(false);
        }
        Ok(graph.remove(uri.as_str()).is_some())
    }

    fn find(&self, ctx: &RequestContext, scope: &Scope, expr: &Expr) -> Result<Vec<Stored>, BackendError> {
        ctx.check("triple find")?;
        let graphs = self
            .graphs
            .read()
            .map_err(|_| BackendError::Poisoned("find"))?;
        let Some(graph) = graphs.get(scope.graph.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(graph
            .iter()
            .filter(|(_, r)| Self::is_instance(scope, r))
            .map(|(subject, r)| Self::to_stored(scope, subject, r))
            .filter(|stored| expr.matches(&stored.record))
            .collect())
    }
}
