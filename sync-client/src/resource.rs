//! Resource - a named, observable value bound to sync backends.
//!
//! A [`Resource`] holds a name, a meta mapping (always carrying the type
//! under [`TYPE_KEY`]) and an optional value. [`Resource::query`] pulls
//! from every attached backend, [`Resource::update`] pushes to them, and
//! subscribers registered through [`Resource::register`] and friends see
//! every value that lands.
//!
//! # Example
//!
//! ```ignore
//! let store: Arc<dyn SyncBackend> =
//!     Arc::new(StoreSync::new("local", Pipeline::json(), MemoryStore::new()));
//! let todo = Resource::new(vec![store], "todo", "note");
//!
//! todo.register(Arc::new(|v| println!("now {:?}", v)));
//! todo.update(json!({"done": false})).await?;
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::{join_all, select_all, try_join_all};
use ressync_types::{Envelope, Meta, TYPE_KEY};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::SyncBackend;
use crate::callbacks::{Callback, Callbacks};
use crate::error::{PipelineError, ResourceError};

/// Type used for inbound messages that do not name one.
pub const DEFAULT_TYPE: &str = "resource";

/// Per-resource hooks around the processor chains.
///
/// Every hook defaults to identity. Override them to compress, encrypt or
/// reshape a particular kind of resource without touching the backend's
/// shared chains.
#[async_trait]
pub trait ResourceHooks: Send + Sync {
    /// Runs before the first pre pass.
    async fn marshal(
        &self,
        _resource: &Resource,
        value: Option<Value>,
    ) -> Result<Option<Value>, PipelineError> {
        Ok(value)
    }

    /// Runs after the last post pass.
    async fn unmarshal(
        &self,
        _resource: &Resource,
        value: Option<Value>,
    ) -> Result<Option<Value>, PipelineError> {
        Ok(value)
    }

    /// Runs between the first pre pass and packing.
    async fn prestore(
        &self,
        _resource: &Resource,
        value: Option<Value>,
    ) -> Result<Option<Value>, PipelineError> {
        Ok(value)
    }

    /// Runs between unpacking and the second post pass.
    async fn poststore(
        &self,
        _resource: &Resource,
        value: Option<Value>,
    ) -> Result<Option<Value>, PipelineError> {
        Ok(value)
    }

    /// Checks a value arriving from a backend before it is stored.
    fn validate(&self, _resource: &Resource, value: Value) -> Result<Value, PipelineError> {
        Ok(value)
    }
}

/// Hooks that change nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityHooks;

impl ResourceHooks for IdentityHooks {}

/// How [`Resource::update`] decides that a write succeeded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdatePolicy {
    /// Race the backends; the first to settle decides. The others keep
    /// running and their outcome is not observed.
    #[default]
    FirstSettled,
    /// Wait for every backend; commit only if all succeed.
    All,
}

#[derive(Debug)]
struct State {
    name: String,
    meta: Meta,
    value: Option<Value>,
}

/// A named, typed, observable value.
///
/// Always handled through `Arc<Resource>`: backends keep references to the
/// resources they watch, and racing updates hand clones to spawned tasks.
pub struct Resource {
    syncs: Vec<Arc<dyn SyncBackend>>,
    hooks: Arc<dyn ResourceHooks>,
    policy: UpdatePolicy,
    state: Mutex<State>,
    callbacks: Callbacks<Value>,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Resource")
            .field("name", &state.name)
            .field("meta", &state.meta)
            .field("value", &state.value)
            .field(
                "syncs",
                &self.syncs.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl Resource {
    /// Create a resource with default hooks, no meta beyond the type, and
    /// no value.
    pub fn new(
        syncs: Vec<Arc<dyn SyncBackend>>,
        name: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Arc<Self> {
        Self::builder(name, type_name).syncs(syncs).build()
    }

    /// Start building a resource.
    pub fn builder(name: impl Into<String>, type_name: impl Into<String>) -> ResourceBuilder {
        ResourceBuilder {
            name: name.into(),
            type_name: type_name.into(),
            syncs: Vec::new(),
            meta: Meta::new(),
            value: None,
            hooks: Arc::new(IdentityHooks),
            policy: UpdatePolicy::default(),
        }
    }

    /// Resource name.
    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    /// Rename the resource.
    pub fn set_name(&self, name: impl Into<String>) {
        self.lock().name = name.into();
    }

    /// The type recorded in meta.
    pub fn type_name(&self) -> Option<String> {
        self.lock()
            .meta
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    /// Overwrite the type recorded in meta.
    pub fn set_type_name(&self, type_name: impl Into<String>) {
        self.lock()
            .meta
            .insert(TYPE_KEY.into(), Value::String(type_name.into()));
    }

    /// A copy of the meta mapping.
    pub fn meta(&self) -> Meta {
        self.lock().meta.clone()
    }

    /// The current value, if known.
    pub fn value(&self) -> Option<Value> {
        self.lock().value.clone()
    }

    /// Attached backends, in order.
    pub fn syncs(&self) -> &[Arc<dyn SyncBackend>] {
        &self.syncs
    }

    /// Pipeline hooks.
    pub fn hooks(&self) -> &dyn ResourceHooks {
        self.hooks.as_ref()
    }

    /// Update policy.
    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    /// Subscribe to every defined value.
    pub fn register(&self, callback: Callback<Value>) {
        self.callbacks.register(callback);
    }

    /// Subscribe to the next defined value only.
    pub fn oneshot(&self, callback: Callback<Value>) {
        self.callbacks.oneshot(callback);
    }

    /// Subscribe to every value, including "nothing found".
    pub fn onempty(&self, callback: Callback<Value>) {
        self.callbacks.onempty(callback);
    }

    /// Remove a subscriber (the most recent registration of it).
    pub fn unregister(&self, callback: &Callback<Value>) -> bool {
        self.callbacks.unregister(callback)
    }

    /// Number of subscribers.
    pub fn subscribers(&self) -> usize {
        self.callbacks.len()
    }

    /// Fetch from every backend concurrently.
    ///
    /// Each defined value is applied through [`Resource::on_update`] as it
    /// arrives; a backend with nothing fires the `onempty` subscribers.
    /// Every backend runs to completion, even after another has failed.
    /// Resolves to the per-backend results in backend order, or to the
    /// first error in that order.
    pub async fn query(self: &Arc<Self>) -> Result<Vec<Option<Value>>, ResourceError> {
        join_all(self.syncs.iter().map(|sync| self.fetch(sync)))
            .await
            .into_iter()
            .collect()
    }

    /// Fetch from the first backend only.
    pub async fn query_primary(self: &Arc<Self>) -> Result<Option<Value>, ResourceError> {
        match self.syncs.first() {
            Some(sync) => self.fetch(sync).await,
            None => Ok(None),
        }
    }

    async fn fetch(
        self: &Arc<Self>,
        sync: &Arc<dyn SyncBackend>,
    ) -> Result<Option<Value>, ResourceError> {
        match sync.get(self).await? {
            Some(value) if !value.is_null() => Ok(self.on_update(value)?),
            _ => {
                self.callbacks.fire(None);
                Ok(None)
            }
        }
    }

    /// Write `value` to the backends according to the update policy, then
    /// store it locally and notify subscribers.
    ///
    /// With no backends the value is committed at once.
    pub async fn update(self: &Arc<Self>, value: Value) -> Result<(), ResourceError> {
        if self.type_name().is_none() {
            return Err(ResourceError::MissingType);
        }

        if !self.syncs.is_empty() {
            match self.policy {
                UpdatePolicy::FirstSettled => self.race(&value).await?,
                UpdatePolicy::All => {
                    try_join_all(self.syncs.iter().map(|sync| sync.set(self, &value))).await?;
                }
            }
        }

        self.commit(Some(value));
        Ok(())
    }

    async fn race(self: &Arc<Self>, value: &Value) -> Result<(), ResourceError> {
        let tasks = self.syncs.iter().map(|sync| {
            let sync = Arc::clone(sync);
            let resource = Arc::clone(self);
            let value = value.clone();
            tokio::spawn(async move { sync.set(&resource, &value).await })
        });

        // Dropping the losing handles detaches them.
        let (first, index, _rest) = select_all(tasks).await;
        tracing::trace!("update of {} settled first on backend {}", self.name(), index);
        match first {
            Ok(outcome) => Ok(outcome?),
            Err(join) => Err(ResourceError::Task(join.to_string())),
        }
    }

    /// Apply a value that arrived from a backend: validate, store, notify.
    pub fn on_update(&self, value: Value) -> Result<Option<Value>, PipelineError> {
        let value = self.hooks.validate(self, value)?;
        let value = (!value.is_null()).then_some(value);
        self.commit(value.clone());
        Ok(value)
    }

    fn commit(&self, value: Option<Value>) {
        let value = value.filter(|v| !v.is_null());
        self.lock().value = value.clone();
        self.callbacks.fire(value.as_ref());
    }

    /// Notify subscribers without storing anything.
    pub fn run_callbacks(&self, value: Option<&Value>) {
        self.callbacks.fire(value.filter(|v| !v.is_null()));
    }

    /// Frame `value` as `{name, meta, value}`.
    pub fn pack(&self, value: Option<Value>) -> Value {
        let state = self.lock();
        Envelope::new(state.name.clone(), state.meta.clone(), value).into_value()
    }

    /// Undo [`Resource::pack`], adopting the packed meta.
    ///
    /// The resource keeps its own type if the packed meta has none.
    pub fn unpack(&self, payload: Option<Value>) -> Result<Option<Value>, PipelineError> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        let envelope = Envelope::from_value(payload).map_err(PipelineError::NotAnEnvelope)?;

        let mut meta = envelope.meta;
        let mut state = self.lock();
        if !meta.contains_key(TYPE_KEY) {
            if let Some(type_name) = state.meta.get(TYPE_KEY) {
                meta.insert(TYPE_KEY.into(), type_name.clone());
            }
        }
        state.meta = meta;
        Ok(envelope.value.filter(|v| !v.is_null()))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for [`Resource`].
pub struct ResourceBuilder {
    name: String,
    type_name: String,
    syncs: Vec<Arc<dyn SyncBackend>>,
    meta: Meta,
    value: Option<Value>,
    hooks: Arc<dyn ResourceHooks>,
    policy: UpdatePolicy,
}

impl ResourceBuilder {
    /// Attach backends (replaces any set before).
    pub fn syncs(mut self, syncs: Vec<Arc<dyn SyncBackend>>) -> Self {
        self.syncs = syncs;
        self
    }

    /// Attach one more backend.
    pub fn sync(mut self, sync: Arc<dyn SyncBackend>) -> Self {
        self.syncs.push(sync);
        self
    }

    /// Initial meta. The type is always written over [`TYPE_KEY`].
    pub fn meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Add a single meta entry.
    pub fn meta_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Initial value.
    pub fn value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Pipeline hooks.
    pub fn hooks(mut self, hooks: Arc<dyn ResourceHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Update policy.
    pub fn policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the resource.
    pub fn build(self) -> Arc<Resource> {
        let mut meta = self.meta;
        meta.insert(TYPE_KEY.into(), Value::String(self.type_name));
        Arc::new(Resource {
            syncs: self.syncs,
            hooks: self.hooks,
            policy: self.policy,
            state: Mutex::new(State {
                name: self.name,
                meta,
                value: self.value.filter(|v| !v.is_null()),
            }),
            callbacks: Callbacks::new(),
        })
    }
}
