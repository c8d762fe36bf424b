//! Purpose: Key-type contract for every keyed store operation.
//! Exports: `Key`, conversions from text and from borrowed JSON values.
//! Role: Single checked seam between dynamic JSON callers and text keys.
//! Invariants: Only text resolves to a key; any other JSON shape is rejected
//! with a `KeyType` error naming the actual type.
use serde_json::Value;

use crate::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug)]
pub enum Key<'a> {
    Text(&'a str),
    Json(&'a Value),
}

impl<'a> Key<'a> {
    /// Resolve to the underlying text key, or fail with `KeyType`.
    pub fn as_text(self) -> Result<&'a str, Error> {
        match self {
            Key::Text(text) => Ok(text),
            Key::Json(Value::String(text)) => Ok(text),
            Key::Json(other) => Err(Error::new(ErrorKind::KeyType).with_message(format!(
                "all keys must be text, got \"{}\" instead",
                json_type_name(other)
            ))),
        }
    }
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(text: &'a str) -> Self {
        Key::Text(text)
    }
}

impl<'a> From<&'a String> for Key<'a> {
    fn from(text: &'a String) -> Self {
        Key::Text(text)
    }
}

impl<'a> From<&'a Value> for Key<'a> {
    fn from(value: &'a Value) -> Self {
        Key::Json(value)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
