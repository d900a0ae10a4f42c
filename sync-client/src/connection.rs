//! ConnectionSync - a backend reached over a persistent duplex link.
//!
//! Outbound operations are queued and flushed only while the link is
//! open. Inbound frames are decoded and dispatched by verb. The link
//! itself is owned by a [`Connector`]; this module interprets the
//! actions of the pure state machine from `ressync-core`.
//!
//! ```text
//! Resource → ConnectionSync → OutgoingQueue → Connector → Peer
//!                 ↑    ↓
//!        WatchTable    ressync-core (pure state machine)
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use ressync_core::{
    fingerprint, Action, Backoff, ConnectionState, Event, OutgoingQueue, WatchTable,
    DEFAULT_MAX_OUTGOING, DEFAULT_RECONNECT_TIMEOUT,
};
use ressync_types::{Message, Verb};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::backend::SyncBackend;
use crate::error::SyncError;
use crate::pipeline::{payload_text, runthrough, Pipeline};
use crate::processor::Direction;
use crate::resource::{Resource, DEFAULT_TYPE};
use crate::transport::{Connector, TransportError};

/// Tuning for a [`ConnectionSync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Fixed delay before reconnecting after a close.
    pub reconnect_timeout: Duration,
    /// Outgoing queue capacity.
    pub max_outgoing: usize,
    /// Fingerprint outbound `get`s and skip `got` replies the peer
    /// already has.
    pub fingerprint_replies: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
            max_outgoing: DEFAULT_MAX_OUTGOING,
            fingerprint_replies: false,
        }
    }
}

struct Outgoing {
    resource: Arc<Resource>,
    message: Message,
}

struct LinkState {
    connection: ConnectionState,
    outgoing: OutgoingQueue<Outgoing>,
    watch: WatchTable<Arc<Resource>>,
    reconnect: Option<JoinHandle<()>>,
    flushing: bool,
}

struct Inner {
    name: String,
    pipeline: Pipeline,
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    backoff: Backoff,
    state: Mutex<LinkState>,
}

/// A connection-based backend.
///
/// Cheap to clone; clones share the queue, watch table and link state.
/// Must be used from within a Tokio runtime (the reconnect timer is a
/// spawned task).
#[derive(Clone)]
pub struct ConnectionSync {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ConnectionSync")
            .field("name", &self.inner.name)
            .field("connection", &state.connection)
            .field("pending", &state.outgoing.len())
            .field("watched", &state.watch.len())
            .finish()
    }
}

/// Owns the flushing flag for one pass.
///
/// [`FlushGuard::finish`] releases the flag and inspects the queue in one
/// critical section. Drop only runs the release when the pass future was
/// cancelled mid-delivery.
struct FlushGuard<'a> {
    link: &'a ConnectionSync,
    armed: bool,
}

impl<'a> FlushGuard<'a> {
    fn new(link: &'a ConnectionSync) -> Self {
        Self { link, armed: true }
    }

    /// End the pass. Returns `true` if messages queued during it still
    /// wait on an open link.
    fn finish(mut self) -> bool {
        self.armed = false;
        let mut state = self.link.lock();
        state.flushing = false;
        state.connection.is_connected() && !state.outgoing.is_empty()
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.link.lock().flushing = false;
        }
    }
}

impl ConnectionSync {
    /// Create a disconnected backend.
    pub fn new(
        name: impl Into<String>,
        pipeline: Pipeline,
        connector: Arc<dyn Connector>,
        options: ConnectionOptions,
    ) -> Self {
        let backoff = Backoff::fixed(options.reconnect_timeout);
        let state = LinkState {
            connection: ConnectionState::new(),
            outgoing: OutgoingQueue::new(options.max_outgoing),
            watch: WatchTable::new(),
            reconnect: None,
            flushing: false,
        };
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                pipeline,
                connector,
                options,
                backoff,
                state: Mutex::new(state),
            }),
        }
    }

    /// This backend as a trait object, ready to attach to resources.
    pub fn backend(&self) -> Arc<dyn SyncBackend> {
        Arc::new(self.clone())
    }

    /// Options in effect.
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Check if the link is open.
    pub fn is_connected(&self) -> bool {
        self.lock().connection.is_connected()
    }

    /// Check if a reconnect is scheduled.
    pub fn is_reconnecting(&self) -> bool {
        self.lock().connection.is_reconnecting()
    }

    /// Number of queued outbound messages.
    pub fn pending(&self) -> usize {
        self.lock().outgoing.len()
    }

    /// Number of watched resources.
    pub fn watched(&self) -> usize {
        self.lock().watch.len()
    }

    /// Ask the connector to open the link.
    ///
    /// A failed attempt is treated as a close, so it schedules a
    /// reconnect.
    pub async fn connect(&self) -> Result<(), TransportError> {
        tracing::debug!("{}: connecting", self.inner.name);
        match self.inner.connector.connect(self.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!("{}: connect failed: {}", self.inner.name, err);
                self.closed();
                Err(err)
            }
        }
    }

    /// The link is open: cancel any pending reconnect and flush the queue.
    pub async fn opened(&self) -> Result<(), SyncError> {
        tracing::debug!("{}: opened", self.inner.name);
        let actions = self.apply(Event::Opened);
        self.execute(actions).await
    }

    /// The link went away: schedule a reconnect unless one is pending.
    pub fn closed(&self) {
        tracing::debug!("{}: closed", self.inner.name);
        for action in self.apply(Event::Closed) {
            match action {
                Action::StartReconnectTimer { delay } => self.start_reconnect_timer(delay),
                other => tracing::trace!("{}: {:?} not expected on close", self.inner.name, other),
            }
        }
    }

    fn apply(&self, event: Event) -> Vec<Action> {
        let mut state = self.lock();
        let (next, actions) = state.connection.on_event(event, &self.inner.backoff);
        state.connection = next;
        actions
    }

    async fn execute(&self, actions: Vec<Action>) -> Result<(), SyncError> {
        let mut first_err = None;
        for action in actions {
            let result = match action {
                Action::Connect => self.connect().await.map_err(SyncError::from),
                Action::Flush => self.process().await,
                Action::StartReconnectTimer { delay } => {
                    self.start_reconnect_timer(delay);
                    Ok(())
                }
                Action::CancelReconnect => {
                    self.cancel_reconnect();
                    Ok(())
                }
            };
            if let Err(err) = result {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn start_reconnect_timer(&self, delay: Duration) {
        tracing::debug!("{}: reconnecting in {:?}", self.inner.name, delay);
        let link = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            link.reconnect_timer_fired().await;
        });
        if let Some(previous) = self.lock().reconnect.replace(timer) {
            previous.abort();
        }
    }

    fn cancel_reconnect(&self) {
        if let Some(timer) = self.lock().reconnect.take() {
            tracing::debug!("{}: reconnect cancelled", self.inner.name);
            timer.abort();
        }
    }

    async fn reconnect_timer_fired(&self) {
        self.lock().reconnect = None;
        let actions = self.apply(Event::ReconnectTimer);
        if let Err(err) = self.execute(actions).await {
            tracing::debug!("{}: reconnect attempt failed: {}", self.inner.name, err);
        }
    }

    /// Queue `message` on behalf of `resource` and try to flush.
    pub async fn send(&self, resource: Arc<Resource>, message: Message) -> Result<(), SyncError> {
        self.lock()
            .outgoing
            .enqueue(Outgoing { resource, message })?;
        self.process().await
    }

    /// Deliver the messages queued right now, if the link is open.
    ///
    /// One call is one pass over a snapshot of the queue, in FIFO order.
    /// Messages queued during the pass wait for the next call. Only one
    /// pass runs at a time; a call made while another pass is running
    /// returns at once, and the running pass schedules a follow-up pass on
    /// the runtime when it ends with messages left over. A failed delivery
    /// does not stop the pass; the first error is returned at its end.
    pub async fn process(&self) -> Result<(), SyncError> {
        let batch = {
            let mut state = self.lock();
            if state.flushing || !state.connection.is_connected() {
                return Ok(());
            }
            let batch = state.outgoing.take_snapshot();
            if batch.is_empty() {
                return Ok(());
            }
            state.flushing = true;
            batch
        };
        let guard = FlushGuard::new(self);

        tracing::debug!("{}: flushing {} message(s)", self.inner.name, batch.len());
        let mut first_err = None;
        for Outgoing { resource, message } in batch {
            if let Err(err) = self.deliver_one(&resource, message).await {
                tracing::warn!("{}: delivery failed: {}", self.inner.name, err);
                first_err.get_or_insert(err);
            }
        }

        if guard.finish() {
            self.schedule_flush();
        }
        first_err.map_or(Ok(()), Err)
    }

    fn schedule_flush(&self) {
        tracing::trace!("{}: scheduling next pass", self.inner.name);
        let link = self.clone();
        tokio::spawn(async move {
            if let Err(err) = link.process().await {
                tracing::warn!("{}: follow-up pass failed: {}", link.inner.name, err);
            }
        });
    }

    async fn deliver_one(&self, resource: &Arc<Resource>, message: Message) -> Result<(), SyncError> {
        let raw = message.to_value()?;
        let payload = runthrough(&self.inner.pipeline.pre, Direction::Pre, resource, Some(raw))
            .await?
            .unwrap_or(Value::Null);
        self.inner
            .connector
            .deliver(resource, &message, payload)
            .await?;
        Ok(())
    }

    /// Inbound entry point for one raw frame.
    ///
    /// The frame is decoded with the post chain in the context of a
    /// throwaway resource bound to the relay backends. A frame without
    /// `method` and `name` is logged and dropped.
    pub async fn delivery(&self, raw: Value) -> Result<(), SyncError> {
        let resource = Resource::new(self.inner.pipeline.relay.clone(), "", DEFAULT_TYPE);
        let decoded = runthrough(&self.inner.pipeline.post, Direction::Post, &resource, Some(raw)).await?;

        let message = match decoded.map(Message::from_value) {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                tracing::warn!("{}: dropping inbound message: {}", self.inner.name, err);
                return Ok(());
            }
            None => {
                tracing::warn!("{}: dropping empty inbound message", self.inner.name);
                return Ok(());
            }
        };

        tracing::trace!("{}: received {} {}", self.inner.name, message.method, message.name);
        resource.set_name(message.name.clone());
        if let Some(type_name) = &message.type_name {
            resource.set_type_name(type_name.clone());
        }
        self.inner
            .connector
            .resource_event(self, resource, message)
            .await
    }

    /// Built-in verb table for inbound messages.
    ///
    /// Unknown verbs are ignored.
    pub async fn dispatch(&self, resource: Arc<Resource>, message: Message) -> Result<(), SyncError> {
        match message.verb() {
            Some(Verb::Get) => self.handle_get(resource, message).await,
            Some(Verb::Got | Verb::Set) => self.handle_update(message).await,
            None => {
                tracing::trace!("{}: ignoring method {:?}", self.inner.name, message.method);
                Ok(())
            }
        }
    }

    /// Peer asks for a value: look it up through the relay backends and
    /// reply with `got`.
    ///
    /// Only a value the relay query produces before it resolves is
    /// answered. A relay that supplies its value later, such as another
    /// [`ConnectionSync`] whose `get` resolves to `None` and answers with a
    /// `got` afterwards, gets no reply for that value.
    async fn handle_get(&self, resource: Arc<Resource>, message: Message) -> Result<(), SyncError> {
        let (tx, mut rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        resource.oneshot(Arc::new(move |value: Option<&Value>| {
            let sender = tx.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let (Some(value), Some(sender)) = (value, sender) {
                let _ = sender.send(value.clone());
            }
        }));

        if let Err(err) = resource.query().await {
            tracing::warn!("{}: lookup for {} failed: {}", self.inner.name, message.name, err);
        }
        let Ok(value) = rx.try_recv() else {
            tracing::trace!("{}: nothing to reply for {}", self.inner.name, message.name);
            return Ok(());
        };

        let Some(data) = self.preprocess(&resource, Some(value)).await? else {
            return Ok(());
        };
        if self.inner.options.fingerprint_replies {
            if let Some(hash) = &message.hash {
                if *hash == fingerprint(&payload_text(&data)) {
                    tracing::debug!("{}: {} unchanged, not replying", self.inner.name, message.name);
                    return Ok(());
                }
            }
        }

        let mut reply = Message::new(Verb::Got, resource.name()).with_data(data);
        if let Some(type_name) = resource.type_name() {
            reply = reply.with_type(type_name);
        }
        self.send(resource, reply).await
    }

    /// Peer pushes a value: decode it for the watched resource and apply.
    async fn handle_update(&self, message: Message) -> Result<(), SyncError> {
        let Some(data) = message.data else {
            return Ok(());
        };
        let type_name = message.type_name.as_deref().unwrap_or(DEFAULT_TYPE);
        let watched = self.lock().watch.get(type_name, &message.name).cloned();
        let Some(target) = watched else {
            tracing::trace!("{}: {}/{} is not watched", self.inner.name, type_name, message.name);
            return Ok(());
        };

        if let Some(value) = self.postprocess(&target, Some(data)).await? {
            target.on_update(value)?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SyncBackend for ConnectionSync {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// Watch the resource and ask the peer for its value.
    ///
    /// Always answers `None`; the value arrives later as a `got`. Asking
    /// again for a resource that is already watched sends nothing. The
    /// request is fully built before the resource is watched, so a call
    /// dropped part way leaves no watch entry behind.
    async fn get(&self, resource: &Arc<Resource>) -> Result<Option<Value>, SyncError> {
        let type_name = resource.type_name().unwrap_or_else(|| DEFAULT_TYPE.to_string());
        let name = resource.name();
        if self.lock().watch.contains(&type_name, &name) {
            return Ok(None);
        }

        let mut message = Message::new(Verb::Get, &name).with_type(&type_name);
        match resource.value() {
            Some(value) if self.inner.options.fingerprint_replies => {
                if let Some(encoded) = self.preprocess(resource, Some(value)).await? {
                    message = message.with_hash(fingerprint(&payload_text(&encoded)));
                }
            }
            _ => {
                if let Value::Object(packed) = resource.pack(None) {
                    message
                        .extra
                        .extend(packed.into_iter().filter(|(key, _)| key != "name"));
                }
            }
        }

        {
            let mut state = self.lock();
            if state.watch.contains(&type_name, &name) {
                return Ok(None);
            }
            state.outgoing.enqueue(Outgoing {
                resource: Arc::clone(resource),
                message,
            })?;
            state.watch.watch_new(&type_name, &name, Arc::clone(resource));
        }
        self.process().await?;
        Ok(None)
    }

    /// Watch the resource and push the value to the peer.
    async fn set(&self, resource: &Arc<Resource>, value: &Value) -> Result<(), SyncError> {
        let type_name = resource.type_name().unwrap_or_else(|| DEFAULT_TYPE.to_string());
        let name = resource.name();
        let data = self
            .preprocess(resource, Some(value.clone()))
            .await?
            .unwrap_or(Value::Null);
        let message = Message::new(Verb::Set, &name)
            .with_type(&type_name)
            .with_data(data);

        {
            let mut state = self.lock();
            state.outgoing.enqueue(Outgoing {
                resource: Arc::clone(resource),
                message,
            })?;
            state.watch.watch(&type_name, &name, Arc::clone(resource));
        }
        self.process().await
    }
}
