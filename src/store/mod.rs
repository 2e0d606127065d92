//! The store facade: typed, lock-serialized, cache-fronted access to
//! graph-scoped models.

mod builder;
mod page;
mod repository;
mod uri_store;

pub use builder::UriStoreBuilder;
pub use page::{Page, Paged};
pub use repository::{ModelRepository, ModelsExt};
pub use uri_store::UriStore;
