mod generator;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use generator::{normalize_segment, UriGenerator, MAX_GENERATION_ATTEMPTS};

/// An absolute URI identifying one logical entity.
///
/// Only the shape is validated (a scheme followed by a non-empty,
/// whitespace-free remainder); two `Uri`s are the same entity exactly when
/// their strings are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uri(String);

impl Uri {
    pub fn parse(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        validate(&value).map_err(|reason| StoreError::InvalidUri {
            value: value.clone(),
            reason: reason.to_string(),
        })?;
        Ok(Uri(value))
    }

    pub(crate) fn from_trusted(value: String) -> Self {
        Uri(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// True when `value` looks like an absolute URI. Used by backends to tell
    /// IRIs from plain literals.
    pub fn is_uri_like(value: &str) -> bool {
        validate(value).is_ok()
    }
}

fn validate(value: &str) -> Result<(), &'static str> {
    let (scheme, rest) = value.split_once(':').ok_or("missing scheme")?;
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err("scheme must start with a letter"),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return Err("invalid scheme character");
    }
    if rest.is_empty() {
        return Err("empty URI after scheme");
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("URI contains whitespace");
    }
    Ok(())
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Uri {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Uri::parse(value)
    }
}

impl TryFrom<&str> for Uri {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Uri::parse(value)
    }
}

impl From<Uri> for String {
    fn from(uri: Uri) -> Self {
        uri.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_uris() {
        assert!(Uri::parse("http://example.org/plot1").is_ok());
        assert!(Uri::parse("urn:uuid:1234").is_ok());
        assert!(Uri::parse("test-scheme+x:abc").is_ok());
    }

    #[test]
    fn rejects_malformed_uris() {
        for bad in ["", "plot1", ":nothing", "1http://x", "http:", "http://a b"] {
            let err = Uri::parse(bad).unwrap_err();
            assert!(matches!(err, StoreError::InvalidUri { .. }), "{bad}");
        }
    }

    #[test]
    fn serde_validates_on_the_way_in() {
        let uri: Uri = serde_json::from_str("\"http://example.org/a\"").unwrap();
        assert_eq!(uri.as_str(), "http://example.org/a");
        assert!(serde_json::from_str::<Uri>("\"not a uri\"").is_err());
        assert_eq!(serde_json::to_string(&uri).unwrap(), "\"http://example.org/a\"");
    }
}
