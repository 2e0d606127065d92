use thiserror::Error;

use crate::backend::{Backend, BackendError};
use crate::config::ConfigError;
use crate::dispatch::WriteOp;
use crate::lock::LockError;
use crate::uri::Uri;

/// Error type for every store operation.
///
/// The store never retries on its own; [`StoreError::is_retryable`] tells the
/// caller which failures are worth another attempt.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The disambiguating fields are not enough to derive a unique URI.
    #[error("cannot derive a URI for {class}: {reason}")]
    AmbiguousIdentity { class: String, reason: String },

    /// Attempt to change the URI of an instance that has been persisted.
    #[error("URI of a persisted instance cannot change (current {current}, requested {requested})")]
    ImmutableIdentity { current: Uri, requested: Uri },

    /// The URI is absent from the backend that owns the class.
    #[error("{class} not found: {uri}")]
    NotFound { class: String, uri: Uri },

    /// An instance was inserted with an explicit URI that is already taken.
    #[error("{class} already exists: {uri}")]
    AlreadyExists { class: String, uri: Uri },

    /// Transient backend failure.
    #[error("{backend} backend unavailable: {message}")]
    BackendUnavailable { backend: Backend, message: String },

    /// A write reached the primary backend but not the mirror.
    #[error(
        "partial {op} of {uri}: {succeeded} succeeded, {failed} failed ({source})"
    )]
    PartialPersist {
        uri: Uri,
        op: WriteOp,
        succeeded: Backend,
        failed: Backend,
        #[source]
        source: BackendError,
    },

    /// The request deadline elapsed.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The request was cancelled by its caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The class was never registered with the dispatcher.
    #[error("model class {0} is not registered")]
    UnregisteredModel(&'static str),

    /// The class declares an affinity for a backend the dispatcher does not have.
    #[error("no {backend} backend configured for {class}")]
    BackendNotConfigured { class: &'static str, backend: Backend },

    #[error("invalid URI {value:?}: {reason}")]
    InvalidUri { value: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(BackendError),

    #[error(transparent)]
    Lock(LockError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl StoreError {
    /// Whether the caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::BackendUnavailable { .. } | StoreError::Timeout(_) => true,
            StoreError::Backend(e) => e.is_retryable(),
            StoreError::Lock(e) => matches!(e, LockError::TimedOut(_)),
            _ => false,
        }
    }

    /// `NotFound` is an expected negative result, not a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub(crate) fn ambiguous(class: &str, reason: impl Into<String>) -> Self {
        StoreError::AmbiguousIdentity {
            class: class.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(class: &str, uri: &Uri) -> Self {
        StoreError::NotFound {
            class: class.to_string(),
            uri: uri.clone(),
        }
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable { backend, message } => {
                StoreError::BackendUnavailable { backend, message }
            }
            BackendError::Timeout(msg) => StoreError::Timeout(msg),
            BackendError::Cancelled => StoreError::Cancelled,
            other => StoreError::Backend(other),
        }
    }
}

impl From<LockError> for StoreError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::TimedOut(key) => StoreError::Timeout(format!("waiting for lock {}", key)),
            other => StoreError::Lock(other),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
