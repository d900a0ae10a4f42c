//! Dict - a resource whose value is a list of child keys.
//!
//! The key list is stored like any other value (a JSON array of strings)
//! and kept free of duplicates, first occurrence winning. Each key names a
//! child [`Resource`] built on demand by a factory over the same backends
//! and cached for the life of the dict.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::try_join_all;
use serde_json::Value;

use crate::backend::SyncBackend;
use crate::callbacks::{Callback, Callbacks};
use crate::error::ResourceError;
use crate::resource::{Resource, DEFAULT_TYPE};

/// Builds the child resource for a key.
pub type ChildFactory = Arc<dyn Fn(Vec<Arc<dyn SyncBackend>>, &str) -> Arc<Resource> + Send + Sync>;

/// Resolved children, in key order.
pub type Children = Vec<(String, Arc<Resource>)>;

/// A composite resource.
pub struct Dict {
    resource: Arc<Resource>,
    factory: ChildFactory,
    subvalue: Mutex<HashMap<String, Arc<Resource>>>,
    callbacks: Callbacks<Children>,
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dict")
            .field("resource", &self.resource)
            .field("cached", &self.cache().len())
            .finish()
    }
}

impl Dict {
    /// Create a dict whose children are plain resources.
    pub fn new(
        syncs: Vec<Arc<dyn SyncBackend>>,
        name: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self::with_child_type(syncs, name, type_name, DEFAULT_TYPE)
    }

    /// Create a dict whose children carry `child_type`.
    pub fn with_child_type(
        syncs: Vec<Arc<dyn SyncBackend>>,
        name: impl Into<String>,
        type_name: impl Into<String>,
        child_type: impl Into<String>,
    ) -> Self {
        let child_type = child_type.into();
        let factory: ChildFactory =
            Arc::new(move |syncs: Vec<Arc<dyn SyncBackend>>, key: &str| {
                Resource::new(syncs, key, child_type.clone())
            });
        Self::with_factory(syncs, name, type_name, factory)
    }

    /// Create a dict with a custom child factory.
    pub fn with_factory(
        syncs: Vec<Arc<dyn SyncBackend>>,
        name: impl Into<String>,
        type_name: impl Into<String>,
        factory: ChildFactory,
    ) -> Self {
        let resource = Resource::builder(name, type_name)
            .syncs(syncs)
            .value(Value::Array(Vec::new()))
            .build();
        Self {
            resource,
            factory,
            subvalue: Mutex::new(HashMap::new()),
            callbacks: Callbacks::new(),
        }
    }

    /// The underlying key-list resource.
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    /// Dict name.
    pub fn name(&self) -> String {
        self.resource.name()
    }

    /// Current keys. Entries that are not strings are skipped.
    pub fn keys(&self) -> Vec<String> {
        match self.resource.value() {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(key) => Some(key),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Check if `key` is listed.
    pub fn contains(&self, key: &str) -> bool {
        self.keys().iter().any(|k| k == key)
    }

    /// Cached children for the current keys, in key order.
    pub fn children(&self) -> Children {
        let cache = self.cache();
        self.keys()
            .into_iter()
            .filter_map(|key| cache.get(&key).map(|child| (key, Arc::clone(child))))
            .collect()
    }

    /// Subscribe to every resolved set of children.
    pub fn register(&self, callback: Callback<Children>) {
        self.callbacks.register(callback);
    }

    /// Subscribe to the next resolved set of children only.
    pub fn oneshot(&self, callback: Callback<Children>) {
        self.callbacks.oneshot(callback);
    }

    /// Subscribe, including notifications without children.
    pub fn onempty(&self, callback: Callback<Children>) {
        self.callbacks.onempty(callback);
    }

    /// Remove a subscriber.
    pub fn unregister(&self, callback: &Callback<Children>) -> bool {
        self.callbacks.unregister(callback)
    }

    /// Append `key`, optionally pinning an explicit child for it.
    ///
    /// An empty key is ignored.
    pub async fn add(
        &self,
        key: &str,
        child: Option<Arc<Resource>>,
    ) -> Result<Children, ResourceError> {
        if key.is_empty() {
            return Ok(self.children());
        }
        tracing::debug!("dict {}: adding {}", self.name(), key);
        let mut keys = self.keys();
        keys.push(key.to_owned());
        self.update(keys, child).await
    }

    /// Drop `key` and its cached child.
    ///
    /// An empty or unlisted key is ignored.
    pub async fn remove(&self, key: &str) -> Result<Children, ResourceError> {
        let mut keys = self.keys();
        let index = match keys.iter().position(|k| k == key) {
            Some(index) if !key.is_empty() => index,
            _ => return Ok(self.children()),
        };
        tracing::debug!("dict {}: removing {}", self.name(), key);
        self.cache().remove(key);
        keys.remove(index);
        self.update(keys, None).await
    }

    /// Write a new key list (duplicates collapsed) and resolve the children.
    pub async fn update(
        &self,
        keys: Vec<String>,
        child: Option<Arc<Resource>>,
    ) -> Result<Children, ResourceError> {
        let keys = dedup(keys);
        if let Some(child) = child {
            self.cache().insert(child.name(), child);
        }
        self.resource
            .update(Value::Array(keys.into_iter().map(Value::String).collect()))
            .await?;
        self.publish().await
    }

    /// Refresh the key list from every backend and resolve the children.
    pub async fn query(&self) -> Result<Children, ResourceError> {
        self.resource.query().await?;
        self.publish().await
    }

    /// Refresh the key list from the first backend and resolve the children.
    pub async fn query_primary(&self) -> Result<Children, ResourceError> {
        self.resource.query_primary().await?;
        self.publish().await
    }

    /// The child for `key`, built and queried on first use.
    ///
    /// Fails with [`ResourceError::UnresolvedKey`] if `key` is neither
    /// listed nor cached.
    pub async fn load_subvalue(&self, key: &str) -> Result<Arc<Resource>, ResourceError> {
        let cached = self.cache().get(key).cloned();
        if let Some(child) = cached {
            return Ok(child);
        }
        if !self.contains(key) {
            return Err(ResourceError::UnresolvedKey(key.to_owned()));
        }

        let child = (self.factory)(self.resource.syncs().to_vec(), key);
        child.query().await?;
        let child = Arc::clone(
            self.cache()
                .entry(child.name())
                .or_insert_with(|| Arc::clone(&child)),
        );
        Ok(child)
    }

    async fn publish(&self) -> Result<Children, ResourceError> {
        let keys = self.keys();
        let loaded = try_join_all(keys.iter().map(|key| self.load_subvalue(key))).await?;
        let children: Children = keys.into_iter().zip(loaded).collect();
        tracing::debug!("dict {}: {} children loaded", self.name(), children.len());
        self.callbacks.fire(Some(&children));
        Ok(children)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Arc<Resource>>> {
        self.subvalue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn dedup(keys: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keys.into_iter()
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dict() -> Dict {
        Dict::with_child_type(Vec::new(), "todos", "list", "todo")
    }

    #[test]
    fn starts_empty() {
        let d = dict();
        assert!(d.keys().is_empty());
        assert_eq!(d.resource().value(), Some(json!([])));
    }

    #[test]
    fn dedup_keeps_first_seen_order() {
        let keys = vec!["b", "a", "b", "c", "a"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedup(keys), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn add_twice_lists_key_once() {
        let d = dict();

        d.add("a", None).await.unwrap();
        let children = d.add("a", None).await.unwrap();

        assert_eq!(d.keys(), vec!["a"]);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].1.type_name().as_deref(), Some("todo"));
    }

    #[tokio::test]
    async fn add_empty_key_is_noop() {
        let d = dict();
        d.add("", None).await.unwrap();
        assert!(d.keys().is_empty());
    }

    #[tokio::test]
    async fn remove_absent_key_is_noop() {
        let d = dict();
        d.add("a", None).await.unwrap();

        let children = d.remove("zzz").await.unwrap();

        assert_eq!(d.keys(), vec!["a"]);
        assert_eq!(children.len(), 1);
    }

    #[tokio::test]
    async fn remove_evicts_child() {
        let d = dict();
        d.add("a", None).await.unwrap();
        d.add("b", None).await.unwrap();
        let first_a = d.load_subvalue("a").await.unwrap();

        d.remove("a").await.unwrap();
        assert_eq!(d.keys(), vec!["b"]);

        // Re-adding builds a fresh child.
        d.add("a", None).await.unwrap();
        let second_a = d.load_subvalue("a").await.unwrap();
        assert!(!Arc::ptr_eq(&first_a, &second_a));
        assert_eq!(d.keys(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn pinned_child_is_used() {
        let d = dict();
        let pinned = Resource::builder("a", "special")
            .value(json!("pinned"))
            .build();

        let children = d.add("a", Some(Arc::clone(&pinned))).await.unwrap();

        assert!(Arc::ptr_eq(&children[0].1, &pinned));
    }

    #[tokio::test]
    async fn children_are_cached() {
        let d = dict();
        d.add("a", None).await.unwrap();

        let first = d.load_subvalue("a").await.unwrap();
        let second = d.load_subvalue("a").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn unresolved_key_is_an_error() {
        let d = dict();
        let result = d.load_subvalue("ghost").await;
        assert!(matches!(result, Err(ResourceError::UnresolvedKey(k)) if k == "ghost"));
    }

    #[tokio::test]
    async fn subscribers_receive_children() {
        let d = dict();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        d.register(Arc::new(move |children: Option<&Children>| {
            let names: Vec<String> = children
                .map(|c| c.iter().map(|(k, _)| k.clone()).collect())
                .unwrap_or_default();
            s.lock().unwrap().push(names);
        }));

        d.add("x", None).await.unwrap();
        d.add("y", None).await.unwrap();
        d.query().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![vec!["x"], vec!["x", "y"], vec!["x", "y"]]
        );
    }

    #[tokio::test]
    async fn custom_factory_is_called_per_new_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let factory: ChildFactory = Arc::new(move |syncs: Vec<Arc<dyn SyncBackend>>, key: &str| {
            c.fetch_add(1, Ordering::SeqCst);
            Resource::new(syncs, key, "counted")
        });
        let d = Dict::with_factory(Vec::new(), "todos", "list", factory);

        d.add("a", None).await.unwrap();
        d.add("b", None).await.unwrap();
        d.query().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
