//! WebSocket connector.
//!
//! Each processed outbound message is one text frame. Inbound text frames
//! (and binary frames holding UTF-8) are handed to the engine as strings.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use ressync_types::Message;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message as Frame};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{Connector, TransportError};
use crate::connection::ConnectionSync;
use crate::pipeline::payload_text;
use crate::resource::Resource;

type Sink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Frame>;

/// Connector for a `ws://` or `wss://` peer.
pub struct WsConnector {
    address: String,
    sink: Arc<Mutex<Option<Sink>>>,
}

impl fmt::Debug for WsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsConnector")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl WsConnector {
    /// Create a connector for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            sink: Arc::new(Mutex::new(None)),
        }
    }

    /// Peer address.
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, link: ConnectionSync) -> Result<(), TransportError> {
        let (socket, _response) = connect_async(self.address.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        tracing::debug!("websocket connected to {}", self.address);

        let (sink, mut stream) = socket.split();
        *self.sink.lock().await = Some(sink);

        let slot = Arc::clone(&self.sink);
        let address = self.address.clone();
        tokio::spawn(async move {
            if let Err(err) = link.opened().await {
                tracing::warn!("websocket {}: flush on open failed: {}", address, err);
            }

            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Frame::Text(text)) => text,
                    Ok(Frame::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::warn!("websocket {}: dropping non-UTF-8 frame", address);
                            continue;
                        }
                    },
                    Ok(Frame::Close(_)) => break,
                    Ok(_) => continue,
                    Err(
                        err @ (tungstenite::Error::ConnectionClosed
                        | tungstenite::Error::AlreadyClosed
                        | tungstenite::Error::Io(_)),
                    ) => {
                        tracing::warn!("websocket {}: {}", address, err);
                        break;
                    }
                    Err(err) => {
                        tracing::warn!("websocket {}: {}", address, err);
                        continue;
                    }
                };

                if let Err(err) = link.delivery(Value::String(text)).await {
                    tracing::warn!("websocket {}: inbound message failed: {}", address, err);
                }
            }

            slot.lock().await.take();
            link.closed();
        });
        Ok(())
    }

    async fn deliver(
        &self,
        _resource: &Arc<Resource>,
        _message: &Message,
        payload: Value,
    ) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(Frame::Text(payload_text(&payload)))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}
