//! Envelope - a packed resource as it travels through the pipeline.
//!
//! A resource is framed as `{name, meta, value}` before its final pass
//! through the processor chain. The `meta` mapping always carries the
//! resource type under [`TYPE_KEY`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::kind_of;
use crate::MessageError;

/// Meta key holding the resource type discriminator.
pub const TYPE_KEY: &str = "__type";

/// Resource metadata mapping.
pub type Meta = Map<String, Value>;

/// A packed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Resource identifier.
    pub name: String,
    /// Resource metadata, including [`TYPE_KEY`].
    #[serde(default)]
    pub meta: Meta,
    /// Resource value (`null` when unknown).
    #[serde(default)]
    pub value: Option<Value>,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(name: impl Into<String>, meta: Meta, value: Option<Value>) -> Self {
        Self {
            name: name.into(),
            meta,
            value,
        }
    }

    /// The resource type recorded in `meta`, if any.
    pub fn type_name(&self) -> Option<&str> {
        self.meta.get(TYPE_KEY).and_then(Value::as_str)
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), Value::String(self.name));
        map.insert("meta".into(), Value::Object(self.meta));
        map.insert("value".into(), self.value.unwrap_or(Value::Null));
        Value::Object(map)
    }

    /// Parse a JSON value produced by [`Envelope::into_value`].
    ///
    /// Anything other than an object is rejected.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        if !value.is_object() {
            return Err(MessageError::NotAnObject(kind_of(&value)));
        }
        Ok(serde_json::from_value(value)?)
    }
}
