//! The backend contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PipelineError, SyncError};
use crate::pipeline::Pipeline;
use crate::resource::Resource;

/// A place resources are synchronized with.
///
/// Implementations handle the storage or transport (persistent store,
/// socket peer, mock). Values pass through the backend's [`Pipeline`] on
/// the way out and on the way back.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Backend instance name. Used as the store key prefix and in logs.
    fn name(&self) -> &str;

    /// Processor chains and relay set.
    fn pipeline(&self) -> &Pipeline;

    /// Fetch the resource's value.
    ///
    /// `Ok(None)` means the backend has nothing (yet). Connection-based
    /// backends always answer `None` here and deliver the value later
    /// through the resource's subscribers.
    async fn get(&self, resource: &Arc<Resource>) -> Result<Option<Value>, SyncError>;

    /// Store `value` as the resource's value.
    async fn set(&self, resource: &Arc<Resource>, value: &Value) -> Result<(), SyncError>;

    /// Encode a value with this backend's pipeline.
    async fn preprocess(
        &self,
        resource: &Resource,
        value: Option<Value>,
    ) -> Result<Option<Value>, PipelineError> {
        self.pipeline().preprocess(resource, value).await
    }

    /// Decode a payload with this backend's pipeline.
    async fn postprocess(
        &self,
        resource: &Resource,
        payload: Option<Value>,
    ) -> Result<Option<Value>, PipelineError> {
        self.pipeline().postprocess(resource, payload).await
    }
}
