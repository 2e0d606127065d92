//! Graph-scoped models - domain structs identified by a URI.
//!
//! A model declares the graph prefix that scopes its URIs, the backend that
//! owns its persistence, and the fields that disambiguate its identity.
//! Most models derive the trait:
//!
//! ```ignore
//! #[derive(Clone, Serialize, Deserialize, GraphModel)]
//! #[model(graph = "plot", backend = "rdf")]
//! struct Plot {
//!     #[model(identity)]
//!     uri: Identity,
//!     #[model(segment)]
//!     name: Option<String>,
//!     description: Option<String>,
//! }
//! ```

pub(crate) mod expr;
mod identity;
mod record;

use serde::{de::DeserializeOwned, Serialize};

use crate::backend::Backend;
use crate::error::StoreError;
use crate::uri::Uri;

pub use expr::Expr;
pub use identity::Identity;
pub(crate) use record::{from_record, to_record};

/// What persist does when a generated URI is already taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Collision {
    /// The existing instance is the same logical entity; merge into it.
    #[default]
    Merge,
    /// Homonyms are legitimate; retry with `-1`, `-2`, ... suffixes.
    Suffix,
}

/// Trait for types that can be stored behind a URI.
pub trait GraphModel: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Class name. Keys the per-class cache and the dispatcher route.
    const NAME: &'static str;

    /// Namespace partition scoping URI generation and backend storage.
    const GRAPH_PREFIX: &'static str;

    /// Backend that owns the persistence of this class.
    const BACKEND: Backend;

    /// Optional secondary backend that receives a copy of every write.
    const MIRROR: Option<Backend> = None;

    const ON_COLLISION: Collision = Collision::Merge;

    /// Name of the field holding the [`Identity`], as it appears once serialized.
    const IDENTITY_FIELD: &'static str = "uri";

    fn identity(&self) -> &Identity;

    fn identity_mut(&mut self) -> &mut Identity;

    /// Disambiguating values, in order. `None` marks a missing required value.
    fn uri_segments(&self) -> Vec<Option<String>>;

    /// Merge every field present on `other` into `self`, keeping `self`'s URI.
    fn update(&mut self, other: Self) -> &mut Self;

    fn uri(&self) -> Option<&Uri> {
        self.identity().uri()
    }

    /// Fails with `ImmutableIdentity` once the instance has been persisted.
    fn set_uri(&mut self, uri: Uri) -> Result<(), StoreError> {
        self.identity_mut().set_uri(uri)
    }

    fn graph_prefix(&self) -> &'static str {
        Self::GRAPH_PREFIX
    }

    /// Predicate selecting the single instance identified by `uri`.
    fn uri_expr(uri: &Uri) -> Expr {
        Expr::uri_eq(uri.clone())
    }
}
