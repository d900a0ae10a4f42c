//! Protocol messages for ressync.
//!
//! A message is a flat JSON object: the verb in `method`, the resource
//! identifier in `name`, and verb-specific payload fields beside them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::kind_of;
use crate::MessageError;

/// All protocol verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    /// Peer requests the current value of a resource
    Get,
    /// Peer pushes a new value for a resource
    Set,
    /// Reply to a `get`, carrying the value
    Got,
}

impl Verb {
    /// Wire spelling of the verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Set => "set",
            Verb::Got => "got",
        }
    }
}

impl FromStr for Verb {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(Verb::Get),
            "set" => Ok(Verb::Set),
            "got" => Ok(Verb::Got),
            other => Err(MessageError::UnknownVerb(other.to_string())),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol message.
///
/// `method` stays textual so that a message with an unknown verb still
/// decodes; the dispatcher decides what to do with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Verb tag
    pub method: String,
    /// Resource identifier
    pub name: String,
    /// Resource type, used with `name` to route inbound values
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Encoded resource (set / got)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Content fingerprint of the value the sender already holds (get)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Any other payload fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Create a message with no payload.
    pub fn new(verb: Verb, name: impl Into<String>) -> Self {
        Self {
            method: verb.as_str().to_string(),
            name: name.into(),
            type_name: None,
            data: None,
            hash: None,
            extra: Map::new(),
        }
    }

    /// Set the resource type.
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Set the encoded resource.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the content fingerprint.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// The verb, if it is one this protocol knows.
    pub fn verb(&self) -> Option<Verb> {
        self.method.parse().ok()
    }

    /// Convert into a JSON value.
    pub fn to_value(&self) -> Result<Value, MessageError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a message from a JSON value.
    ///
    /// The value must be an object carrying string `method` and `name`
    /// fields; anything else is [`MessageError::Malformed`].
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let map = match &value {
            Value::Object(map) => map,
            other => return Err(MessageError::NotAnObject(kind_of(other))),
        };
        if !map.get("method").is_some_and(Value::is_string) {
            return Err(MessageError::Malformed { missing: "method" });
        }
        if !map.get("name").is_some_and(Value::is_string) {
            return Err(MessageError::Malformed { missing: "name" });
        }
        Ok(serde_json::from_value(value)?)
    }
}
