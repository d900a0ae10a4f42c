//! Transport abstraction for ressync.
//!
//! A [`ConnectionSync`] owns the queueing, reconnection and verb dispatch
//! of a connection-based backend. What it does not know is how to reach the
//! peer: that is supplied by a [`Connector`] (WebSocket, mock for testing).
//!
//! # Design
//!
//! The connector is driven by the engine and drives it back:
//! - `connect()` opens the link and arranges for the engine's
//!   `opened()`, `closed()` and `delivery()` to be called as the link
//!   changes and frames arrive
//! - `deliver()` writes one processed outbound message
//! - `resource_event()` handles one decoded inbound message (defaults to
//!   the engine's built-in `get`/`set`/`got` handlers)
//!
//! # Example
//!
//! ```ignore
//! let connector = Arc::new(WsConnector::new("ws://127.0.0.1:9000"));
//! let link = ConnectionSync::new("ws", Pipeline::json(), connector, ConnectionOptions::default());
//! link.connect().await?;
//! ```

mod mock;
mod websocket;

pub use mock::MockConnector;
pub use websocket::WsConnector;

use std::sync::Arc;

use async_trait::async_trait;
use ressync_types::Message;
use serde_json::Value;
use thiserror::Error;

use crate::connection::ConnectionSync;
use crate::error::SyncError;
use crate::resource::Resource;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// The transport half of a connection-based backend.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open the link to the peer.
    ///
    /// On success the connector owns the link's lifecycle: it must call
    /// [`ConnectionSync::opened`] once the link is usable,
    /// [`ConnectionSync::closed`] when it goes away, and
    /// [`ConnectionSync::delivery`] for every inbound frame.
    async fn connect(&self, link: ConnectionSync) -> Result<(), TransportError>;

    /// Write one outbound message.
    ///
    /// `payload` is `message` after the backend's pre chain.
    async fn deliver(
        &self,
        resource: &Arc<Resource>,
        message: &Message,
        payload: Value,
    ) -> Result<(), TransportError>;

    /// Handle one decoded inbound message.
    async fn resource_event(
        &self,
        link: &ConnectionSync,
        resource: Arc<Resource>,
        message: Message,
    ) -> Result<(), SyncError> {
        link.dispatch(resource, message).await
    }
}
