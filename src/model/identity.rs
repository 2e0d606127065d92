use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;
use crate::uri::Uri;

/// URI slot of a model plus whether the instance has been persisted.
///
/// Serializes as the bare (optional) URI. The persisted flag is runtime
/// state: it is set when the store writes or loads the instance, and from
/// then on the URI cannot change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    uri: Option<Uri>,
    persisted: bool,
}

impl Identity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uri(uri: Uri) -> Self {
        Identity {
            uri: Some(uri),
            persisted: false,
        }
    }

    pub fn uri(&self) -> Option<&Uri> {
        self.uri.as_ref()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn set_uri(&mut self, uri: Uri) -> Result<(), StoreError> {
        if self.persisted {
            if let Some(current) = &self.uri {
                return Err(StoreError::ImmutableIdentity {
                    current: current.clone(),
                    requested: uri,
                });
            }
        }
        self.uri = Some(uri);
        Ok(())
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = true;
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.uri.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let uri = Option::<Uri>::deserialize(deserializer)?;
        Ok(Identity {
            uri,
            persisted: false,
        })
    }
}
