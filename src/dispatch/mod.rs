//! Routing of model classes to the backend that owns them.

mod builder;
mod dispatcher;

use std::fmt;

use crate::backend::{Backend, Scope};

pub use builder::DispatcherBuilder;
pub use dispatcher::BackendDispatcher;

/// Write operation, as reported by `PartialPersist`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Replace,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteOp::Insert => "insert",
            WriteOp::Replace => "replace",
            WriteOp::Delete => "delete",
        })
    }
}

/// Where a registered class is stored, resolved once at registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub scope: Scope,
    pub primary: Backend,
    pub mirror: Option<Backend>,
}

impl Route {
    pub fn class(&self) -> &'static str {
        self.scope.class
    }
}
