//! Pipeline engine.
//!
//! [`runthrough`] threads a value through an ordered chain of processors.
//! [`Pipeline::preprocess`] and [`Pipeline::postprocess`] are the two full
//! passes every backend uses:
//!
//! ```text
//! preprocess:  marshal → pre chain → prestore → pack → pre chain
//! postprocess: post chain → unpack → poststore → post chain → unmarshal
//! ```
//!
//! Each stage is awaited in turn and the task yields to the scheduler
//! before every stage, so a long chain never starves other resources'
//! pipelines running on the same runtime.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::backend::SyncBackend;
use crate::error::{PipelineError, ProcessorError};
use crate::processor::{Direction, JsonProcessor, Processor};
use crate::resource::Resource;

/// Ordered list of processor stages.
pub type ProcessorChain = Vec<Arc<dyn Processor>>;

/// Feed `value` through every stage of `chain`, in order.
///
/// A missing or `null` input short-circuits to `None` without invoking any
/// stage. The first failing stage aborts the rest of the chain.
pub async fn runthrough(
    chain: &[Arc<dyn Processor>],
    direction: Direction,
    resource: &Resource,
    value: Option<Value>,
) -> Result<Option<Value>, ProcessorError> {
    let mut current = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    for stage in chain {
        tokio::task::yield_now().await;
        current = stage.apply(direction, resource, current).await?;
    }
    Ok(Some(current))
}

/// Text form of a processed payload: strings verbatim, anything else as JSON.
pub fn payload_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Processor chains and relay set of one backend.
///
/// Built once per backend and shared by every resource it serves.
#[derive(Clone, Default)]
pub struct Pipeline {
    /// Outbound stages.
    pub pre: ProcessorChain,
    /// Inbound stages.
    pub post: ProcessorChain,
    /// Backends that answer on behalf of transient resources created for
    /// inbound messages.
    pub relay: Vec<Arc<dyn SyncBackend>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("pre", &self.pre.len())
            .field("post", &self.post.len())
            .field(
                "relay",
                &self.relay.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline from explicit chains.
    pub fn new(pre: ProcessorChain, post: ProcessorChain) -> Self {
        Self {
            pre,
            post,
            relay: Vec::new(),
        }
    }

    /// A single [`JsonProcessor`] in both directions.
    pub fn json() -> Self {
        let json: Arc<dyn Processor> = Arc::new(JsonProcessor);
        Self::new(vec![Arc::clone(&json)], vec![json])
    }

    /// Set the relay backends.
    pub fn with_relay(mut self, relay: Vec<Arc<dyn SyncBackend>>) -> Self {
        self.relay = relay;
        self
    }

    /// Encode a resource value for storage or transmission.
    pub async fn preprocess(
        &self,
        resource: &Resource,
        value: Option<Value>,
    ) -> Result<Option<Value>, PipelineError> {
        let hooks = resource.hooks();
        let marshalled = hooks.marshal(resource, value).await?;
        let processed = runthrough(&self.pre, Direction::Pre, resource, marshalled).await?;
        let stored = hooks.prestore(resource, processed).await?;
        let packed = resource.pack(stored);
        Ok(runthrough(&self.pre, Direction::Pre, resource, Some(packed)).await?)
    }

    /// Decode a payload produced by [`Pipeline::preprocess`].
    ///
    /// Unpacking replaces the resource's meta with the packed meta.
    pub async fn postprocess(
        &self,
        resource: &Resource,
        payload: Option<Value>,
    ) -> Result<Option<Value>, PipelineError> {
        let hooks = resource.hooks();
        let packed = runthrough(&self.post, Direction::Post, resource, payload).await?;
        let unpacked = resource.unpack(packed)?;
        let stored = hooks.poststore(resource, unpacked).await?;
        let processed = runthrough(&self.post, Direction::Post, resource, stored).await?;
        hooks.unmarshal(resource, processed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::Base64Processor;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Appends its tag to string input and records the call order.
    struct Tagger {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Processor for Tagger {
        async fn pre(&self, _r: &Resource, value: Value) -> Result<Value, ProcessorError> {
            self.log.lock().unwrap().push(self.tag);
            let text = value.as_str().unwrap_or_default();
            Ok(Value::String(format!("{}{}", text, self.tag)))
        }

        async fn post(&self, r: &Resource, value: Value) -> Result<Value, ProcessorError> {
            self.pre(r, value).await
        }
    }

    /// Always fails.
    struct Broken;

    #[async_trait]
    impl Processor for Broken {
        async fn pre(&self, _r: &Resource, value: Value) -> Result<Value, ProcessorError> {
            Err(ProcessorError::UnexpectedInput {
                expected: "nothing",
                actual: crate::processor::kind_of(&value),
            })
        }

        async fn post(&self, r: &Resource, value: Value) -> Result<Value, ProcessorError> {
            self.pre(r, value).await
        }
    }

    fn resource() -> Arc<Resource> {
        Resource::new(Vec::new(), "todo", "note")
    }

    #[tokio::test]
    async fn stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: ProcessorChain = vec![
            Arc::new(Tagger { tag: "a", log: log.clone() }),
            Arc::new(Tagger { tag: "b", log: log.clone() }),
            Arc::new(Tagger { tag: "c", log: log.clone() }),
        ];

        let out = runthrough(&chain, Direction::Pre, &resource(), Some(json!(">")))
            .await
            .unwrap();

        assert_eq!(out, Some(json!(">abc")));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn null_short_circuits_without_running_stages() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: ProcessorChain = vec![Arc::new(Tagger { tag: "a", log: log.clone() })];

        let from_none = runthrough(&chain, Direction::Pre, &resource(), None).await.unwrap();
        let from_null = runthrough(&chain, Direction::Pre, &resource(), Some(Value::Null))
            .await
            .unwrap();

        assert_eq!(from_none, None);
        assert_eq!(from_null, None);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_chain_is_identity() {
        let out = runthrough(&[], Direction::Post, &resource(), Some(json!(5)))
            .await
            .unwrap();
        assert_eq!(out, Some(json!(5)));
    }

    #[tokio::test]
    async fn failing_stage_aborts_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: ProcessorChain = vec![
            Arc::new(Broken),
            Arc::new(Tagger { tag: "after", log: log.clone() }),
        ];

        let result = runthrough(&chain, Direction::Pre, &resource(), Some(json!("x"))).await;

        assert!(result.is_err());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn preprocess_packs_between_passes() {
        let pipeline = Pipeline::json();
        let r = resource();

        let encoded = pipeline
            .preprocess(&r, Some(json!({"done": true})))
            .await
            .unwrap()
            .unwrap();

        // Outer pass encodes the envelope, inner pass encoded the value.
        let envelope: Value = serde_json::from_str(encoded.as_str().unwrap()).unwrap();
        assert_eq!(envelope["name"], json!("todo"));
        assert_eq!(envelope["meta"]["__type"], json!("note"));
        assert_eq!(envelope["value"], json!("{\"done\":true}"));
    }

    #[tokio::test]
    async fn postprocess_mirrors_preprocess() {
        let pipeline = Pipeline::json();
        let r = resource();
        let value = json!({"items": [1, "two", null], "n": 3.5});

        let encoded = pipeline.preprocess(&r, Some(value.clone())).await.unwrap();
        let decoded = pipeline.postprocess(&r, encoded).await.unwrap();

        assert_eq!(decoded, Some(value));
    }

    #[tokio::test]
    async fn multi_stage_chain_mirrors() {
        let json: Arc<dyn Processor> = Arc::new(JsonProcessor);
        let b64: Arc<dyn Processor> = Arc::new(Base64Processor);
        let pipeline = Pipeline::new(
            vec![Arc::clone(&json), Arc::clone(&b64)],
            vec![b64, json],
        );
        let r = resource();

        let encoded = pipeline.preprocess(&r, Some(json!(["a"]))).await.unwrap();
        assert!(!payload_text(encoded.as_ref().unwrap()).contains('{'));

        let decoded = pipeline.postprocess(&r, encoded).await.unwrap();
        assert_eq!(decoded, Some(json!(["a"])));
    }

    #[tokio::test]
    async fn preprocess_of_nothing_still_packs() {
        let pipeline = Pipeline::json();
        let r = resource();

        let encoded = pipeline.preprocess(&r, None).await.unwrap().unwrap();
        let envelope: Value = serde_json::from_str(encoded.as_str().unwrap()).unwrap();

        assert_eq!(envelope["value"], Value::Null);
    }

    #[tokio::test]
    async fn postprocess_rejects_non_mapping() {
        let pipeline = Pipeline::json();
        let result = pipeline.postprocess(&resource(), Some(json!("42"))).await;
        assert!(matches!(result, Err(PipelineError::NotAnEnvelope(_))));
    }

    #[tokio::test]
    async fn postprocess_adopts_packed_meta() {
        let pipeline = Pipeline::json();
        let source = Resource::builder("todo", "note")
            .meta_entry("color", json!("red"))
            .build();
        let target = resource();

        let encoded = pipeline.preprocess(&source, Some(json!(1))).await.unwrap();
        pipeline.postprocess(&target, encoded).await.unwrap();

        assert_eq!(target.meta()["color"], json!("red"));
        assert_eq!(target.type_name().as_deref(), Some("note"));
    }

    #[test]
    fn payload_text_forms() {
        assert_eq!(payload_text(&json!("raw")), "raw");
        assert_eq!(payload_text(&json!({"a": 1})), "{\"a\":1}");
    }
}
