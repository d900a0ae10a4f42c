//! Error types for ressync wire decoding.

use thiserror::Error;

/// Errors that can occur while decoding protocol messages or packed resources.
#[derive(Debug, Error)]
pub enum MessageError {
    /// A required field is absent or has the wrong type.
    #[error("malformed message: missing {missing}")]
    Malformed {
        /// Name of the missing field.
        missing: &'static str,
    },

    /// The payload is not a JSON object.
    #[error("expected an object, got {0}")]
    NotAnObject(&'static str),

    /// Verb tag outside the known set.
    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    /// JSON (de)serialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Short JSON kind name used in error messages.
pub(crate) fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
