//! # sync-client
//!
//! Resource synchronization engine for ressync.
//!
//! Applications declare named, typed [`Resource`]s and bind them to one or
//! more backends. Values flow through each backend's processor
//! [`Pipeline`] on the way out and back.
//!
//! ## Features
//!
//! - **Observable resources**: `register` / `oneshot` / `onempty` subscribers
//! - **Composite resources**: [`Dict`] keeps an ordered, de-duplicated key
//!   list and resolves each key to a cached child
//! - **Pluggable backends**: persistent key-value store ([`StoreSync`]) and
//!   persistent links ([`ConnectionSync`] over a [`Connector`])
//! - **Pure state machine**: connection lifecycle, queue and watch table
//!   come from sync-core
//!
//! ## Example
//!
//! ```ignore
//! use ressync_client::{FileStore, Pipeline, Resource, StoreSync, SyncBackend};
//!
//! let store: Arc<dyn SyncBackend> =
//!     Arc::new(StoreSync::new("local", Pipeline::json(), FileStore::open("store.json")?));
//! let todo = Resource::new(vec![store], "todo", "note");
//!
//! todo.update(json!({"done": false})).await?;
//! todo.query().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod callbacks;
pub mod config;
pub mod connection;
pub mod dict;
pub mod error;
pub mod pipeline;
pub mod processor;
pub mod resource;
pub mod store;
pub mod transport;

pub use backend::SyncBackend;
pub use callbacks::{Callback, Callbacks};
pub use config::{ConfigError, ConnectionSettings, ResourceSettings, Settings, StoreSettings};
pub use connection::{ConnectionOptions, ConnectionSync};
pub use dict::{ChildFactory, Children, Dict};
pub use error::{PipelineError, ProcessorError, ResourceError, StoreError, SyncError, SyncResult};
pub use pipeline::{payload_text, runthrough, Pipeline, ProcessorChain};
pub use processor::{Base64Processor, Direction, JsonProcessor, Processor};
pub use resource::{IdentityHooks, Resource, ResourceBuilder, ResourceHooks, UpdatePolicy, DEFAULT_TYPE};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreSync};
pub use transport::{Connector, MockConnector, TransportError, WsConnector};
