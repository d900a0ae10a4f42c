//! # sync-core
//!
//! Bookkeeping for ressync's connection-based backends, free of I/O.
//!
//! - [`ConnectionState`] - connected / disconnected / reconnecting, driven
//!   by [`Event`]s and answering with [`Action`]s for the caller to perform
//! - [`OutgoingQueue`] - bounded FIFO of messages awaiting a connection
//! - [`WatchTable`] - resources awaiting answers, keyed by type then name
//! - [`fingerprint`] - content hash used to skip unchanged `got` replies
//!
//! Nothing here touches sockets, timers or stores; `sync-client` owns the
//! runtime and interprets the actions, so every test in this crate is
//! synchronous.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod fingerprint;
pub mod state;
pub mod watch;

pub use buffer::{BufferError, OutgoingQueue, DEFAULT_MAX_OUTGOING};
pub use fingerprint::fingerprint;
pub use state::{Action, Backoff, ConnectionState, Event, DEFAULT_RECONNECT_TIMEOUT};
pub use watch::WatchTable;
