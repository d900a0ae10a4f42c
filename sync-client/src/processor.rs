//! Processor stages.
//!
//! A processor is one step of a backend's pipeline: `pre` runs on the way
//! out (towards a store or peer) and `post` is its inverse on the way in.
//! Processors are shared by every resource a backend serves, so they hold
//! no per-resource state; the resource is passed in for stages that need
//! its name or meta.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use crate::error::ProcessorError;
use crate::resource::Resource;

/// Which half of a processor to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Outbound (encode).
    Pre,
    /// Inbound (decode).
    Post,
}

/// A pluggable forward/inverse transformation stage.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Forward conversion, applied before storing or sending.
    async fn pre(&self, resource: &Resource, value: Value) -> Result<Value, ProcessorError>;

    /// Inverse conversion, applied after loading or receiving.
    async fn post(&self, resource: &Resource, value: Value) -> Result<Value, ProcessorError>;

    /// Run the half selected by `direction`.
    async fn apply(
        &self,
        direction: Direction,
        resource: &Resource,
        value: Value,
    ) -> Result<Value, ProcessorError> {
        match direction {
            Direction::Pre => self.pre(resource, value).await,
            Direction::Post => self.post(resource, value).await,
        }
    }
}

/// Structural-text codec: values become JSON text and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProcessor;

#[async_trait]
impl Processor for JsonProcessor {
    async fn pre(&self, _resource: &Resource, value: Value) -> Result<Value, ProcessorError> {
        serde_json::to_string(&value)
            .map(Value::String)
            .map_err(ProcessorError::Encode)
    }

    async fn post(&self, _resource: &Resource, value: Value) -> Result<Value, ProcessorError> {
        let text = expect_string(value)?;
        serde_json::from_str(&text).map_err(ProcessorError::Decode)
    }
}

/// Armors text as standard base64.
///
/// Expects text input, so it belongs after a [`JsonProcessor`] in a `pre`
/// chain and before one in a `post` chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Processor;

#[async_trait]
impl Processor for Base64Processor {
    async fn pre(&self, _resource: &Resource, value: Value) -> Result<Value, ProcessorError> {
        let text = expect_string(value)?;
        Ok(Value::String(STANDARD.encode(text.as_bytes())))
    }

    async fn post(&self, _resource: &Resource, value: Value) -> Result<Value, ProcessorError> {
        let armored = expect_string(value)?;
        let bytes = STANDARD.decode(armored.as_bytes())?;
        Ok(Value::String(String::from_utf8(bytes)?))
    }
}

fn expect_string(value: Value) -> Result<String, ProcessorError> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(ProcessorError::UnexpectedInput {
            expected: "string",
            actual: kind_of(&other),
        }),
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
