//! Query fragments for stores that speak SQL.
//!
//! [`JoinKind`] is the fixed join vocabulary; [`SqlQueryBuilder`] composes it
//! with tables derived from model graph prefixes. Nothing here validates the
//! resulting SQL: a malformed query is reported by whatever executes it.

mod join;
mod sql;

pub use join::JoinKind;
pub use sql::{Order, SqlOperator, SqlQueryBuilder};
