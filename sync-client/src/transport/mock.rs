//! Mock connector for testing.
//!
//! Records connect attempts, delivered messages and inbound events, and
//! can be told to fail the next connect or deliver.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ressync_types::Message;
use serde_json::Value;

use super::{Connector, TransportError};
use crate::connection::ConnectionSync;
use crate::error::SyncError;
use crate::resource::Resource;

/// Mock connector for testing.
///
/// Clones share state, so a test can keep one handle while the engine
/// owns another.
#[derive(Debug, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<MockConnectorInner>>,
}

#[derive(Debug, Default)]
struct MockConnectorInner {
    connect_calls: usize,
    auto_open: bool,
    delivered: Vec<(Message, Value)>,
    events: Vec<Message>,
    fail_next_connect: Option<String>,
    fail_next_deliver: Option<String>,
}

impl MockConnector {
    /// Create a new mock connector. `connect()` succeeds without opening.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose `connect()` immediately reports the link open.
    pub fn auto_open() -> Self {
        let mock = Self::new();
        mock.lock().auto_open = true;
        mock
    }

    /// Number of `connect()` calls so far.
    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    /// Every delivered message with its processed payload, in order.
    pub fn delivered(&self) -> Vec<(Message, Value)> {
        self.lock().delivered.clone()
    }

    /// The methods of the delivered messages, in order.
    pub fn delivered_methods(&self) -> Vec<String> {
        self.lock()
            .delivered
            .iter()
            .map(|(m, _)| m.method.clone())
            .collect()
    }

    /// Get the last delivered message.
    pub fn last_delivered(&self) -> Option<(Message, Value)> {
        self.lock().delivered.last().cloned()
    }

    /// Every inbound message that reached `resource_event`.
    pub fn events(&self) -> Vec<Message> {
        self.lock().events.clone()
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.lock().fail_next_connect = Some(error.to_string());
    }

    /// Cause the next deliver() to fail with the given error.
    pub fn fail_next_deliver(&self, error: &str) {
        self.lock().fail_next_deliver = Some(error.to_string());
    }

    /// Clear all recorded state.
    pub fn reset(&self) {
        let auto_open = self.lock().auto_open;
        *self.lock() = MockConnectorInner {
            auto_open,
            ..Default::default()
        };
    }

    fn lock(&self) -> MutexGuard<'_, MockConnectorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for MockConnector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, link: ConnectionSync) -> Result<(), TransportError> {
        let auto_open = {
            let mut inner = self.lock();
            inner.connect_calls += 1;

            // Check for forced failure
            if let Some(error) = inner.fail_next_connect.take() {
                return Err(TransportError::ConnectionFailed(error));
            }
            inner.auto_open
        };

        if auto_open {
            if let Err(err) = link.opened().await {
                tracing::warn!("mock connector: flush on open failed: {}", err);
            }
        }
        Ok(())
    }

    async fn deliver(
        &self,
        _resource: &Arc<Resource>,
        message: &Message,
        payload: Value,
    ) -> Result<(), TransportError> {
        let mut inner = self.lock();

        // Check for forced failure
        if let Some(error) = inner.fail_next_deliver.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.delivered.push((message.clone(), payload));
        Ok(())
    }

    async fn resource_event(
        &self,
        link: &ConnectionSync,
        resource: Arc<Resource>,
        message: Message,
    ) -> Result<(), SyncError> {
        self.lock().events.push(message.clone());
        link.dispatch(resource, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionOptions;
    use crate::pipeline::Pipeline;
    use ressync_types::Verb;
    use serde_json::json;

    fn link(mock: &MockConnector) -> ConnectionSync {
        ConnectionSync::new(
            "mock",
            Pipeline::json(),
            Arc::new(mock.clone()),
            ConnectionOptions::default(),
        )
    }

    #[tokio::test]
    async fn records_connect_calls() {
        let mock = MockConnector::new();
        link(&mock).connect().await.unwrap();
        assert_eq!(mock.connect_calls(), 1);
    }

    #[tokio::test]
    async fn auto_open_connects_the_link() {
        let mock = MockConnector::auto_open();
        let link = link(&mock);

        link.connect().await.unwrap();

        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn forced_connect_failure() {
        let mock = MockConnector::new();
        mock.fail_next_connect("refused");

        let result = link(&mock).connect().await;

        assert!(matches!(result, Err(TransportError::ConnectionFailed(e)) if e == "refused"));
        assert_eq!(mock.connect_calls(), 1);
    }

    #[tokio::test]
    async fn forced_deliver_failure_is_one_shot() {
        let mock = MockConnector::new();
        let resource = Resource::new(Vec::new(), "r", "t");
        let message = Message::new(Verb::Get, "r");
        mock.fail_next_deliver("broken pipe");

        assert!(mock.deliver(&resource, &message, json!("x")).await.is_err());
        assert!(mock.deliver(&resource, &message, json!("y")).await.is_ok());
        assert_eq!(mock.delivered().len(), 1);
        assert_eq!(mock.last_delivered().unwrap().1, json!("y"));
    }

    #[tokio::test]
    async fn clones_share_state_and_reset_clears() {
        let mock = MockConnector::auto_open();
        let other = mock.clone();
        let resource = Resource::new(Vec::new(), "r", "t");

        other
            .deliver(&resource, &Message::new(Verb::Set, "r"), json!(1))
            .await
            .unwrap();
        assert_eq!(mock.delivered_methods(), vec!["set"]);

        mock.reset();
        assert!(other.delivered().is_empty());
        assert!(other.lock().auto_open);
    }
}
