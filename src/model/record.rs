use serde_json::{Map, Value};

use crate::backend::Record;
use crate::error::StoreError;
use crate::uri::Uri;

use super::GraphModel;

/// Flatten a model into a backend record. The identity field is carried by
/// `Record::uri`, not by the field map.
pub(crate) fn to_record<M: GraphModel>(model: &M, uri: &Uri) -> Result<Record, StoreError> {
    let mut fields = match serde_json::to_value(model)? {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::Serialization(format!(
                "{} must serialize to an object, got {}",
                M::NAME,
                kind_of(&other)
            )))
        }
    };
    fields.remove(M::IDENTITY_FIELD);
    Ok(Record {
        uri: uri.clone(),
        fields,
    })
}

/// Rebuild a model from a backend record; the result is marked persisted.
pub(crate) fn from_record<M: GraphModel>(record: Record) -> Result<M, StoreError> {
    let Record { uri, fields } = record;
    let mut object: Map<String, Value> = fields;
    object.insert(M::IDENTITY_FIELD.to_string(), Value::String(uri.into_string()));
    let mut model: M = serde_json::from_value(Value::Object(object))?;
    model.identity_mut().mark_persisted();
    Ok(model)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
