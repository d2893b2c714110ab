use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use serde_json::Value;

use super::connection::{CloseOutcome, ConnectionManager, Status};
use super::events;
use super::subscription::{Subscription, SubscriptionRegistry};
use crate::Result;
use crate::codec::{JsonCodec, MessageCodec};
use crate::config::Config;
use crate::error::Error;
use crate::event::{Emit as _, EventBus, HandlerId, Listen};
use crate::path::ChannelPath;
use crate::protocol::{Method, Request, Response};
use crate::transport::Transport;

/// Outcome of a correlated command: the response body, or the broker's error.
pub type Reply = std::result::Result<Value, BrokerError>;

/// One-shot completion for a command, resolved at most once.
pub type Callback = Box<dyn FnOnce(Reply) + Send>;

/// The broker answered a command with an error body.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerError {
    pub method: String,
    pub error: Value,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broker rejected {}: {}", self.method, self.error)
    }
}

impl std::error::Error for BrokerError {}

struct Outgoing {
    request: Request,
    callback: Option<Callback>,
}

impl Outgoing {
    fn new(request: Request) -> Self {
        Self {
            request,
            callback: None,
        }
    }
}

/// Client session: one logical connection to the broker, multiplexing every
/// channel subscription over it.
///
/// The session is sans-IO. It drives a [`Transport`] and is driven by the
/// transport's events:
///
/// ```text
/// transport opened   -> handle_open()
/// frame received     -> handle_frame(bytes)
/// transport closed   -> handle_close() -> Some(delay) -> (after delay) retry()
/// ```
///
/// # Pending callbacks
///
/// A callback passed to [`Session::publish_with`] and friends is invoked exactly once
/// with the broker's reply. If the transport drops or the session disconnects before
/// the reply arrives, the callback is dropped without being invoked. There is no
/// per-command timeout; race your own timer against the callback if you need one.
pub struct Session<T, C = JsonCodec> {
    config: Config,
    codec: C,
    connection: ConnectionManager<T>,
    subscriptions: SubscriptionRegistry,
    pending: HashMap<u64, Callback>,
    last_uid: u64,
    outbox: Vec<Outgoing>,
    batching: bool,
    batch: Vec<Outgoing>,
    events: EventBus<Value>,
}

impl<T: Transport> Session<T> {
    #[must_use]
    pub fn new(config: Config, transport: T) -> Self {
        Self::with_codec(config, transport, JsonCodec)
    }
}

impl<T: Transport, C: MessageCodec> Session<T, C> {
    #[must_use]
    pub fn with_codec(config: Config, transport: T, codec: C) -> Self {
        let connection = ConnectionManager::new(&config, transport);
        Self {
            config,
            codec,
            connection,
            subscriptions: SubscriptionRegistry::new(),
            pending: HashMap::new(),
            last_uid: 0,
            outbox: Vec::new(),
            batching: false,
            batch: Vec::new(),
            events: EventBus::new(),
        }
    }

    /// Open the transport. A transport that is still alive is closed first, which
    /// emits `disconnect` like any other close; its subscriptions are kept and
    /// replayed once the new transport opens. The retry budget starts over.
    pub fn connect(&mut self) {
        let was_live = self.connection.status().is_live();
        if was_live {
            self.subscriptions.reset_subscribed();
            self.abandon_pending();
        }
        self.connection.connect();
        if was_live {
            self.events.emit(events::DISCONNECT, &Value::Null);
        }
    }

    /// Tear the session down for good: no retry, no subscriptions, no pending callbacks.
    pub fn disconnect(&mut self) {
        let was_connected = self.connection.disconnect();

        self.subscriptions.clear();
        self.abandon_pending();
        self.outbox.clear();
        self.batch.clear();
        self.batching = false;

        if was_connected {
            self.events.emit(events::DISCONNECT, &Value::Null);
        }
    }

    /// Reconnect after the delay returned by [`Session::handle_close`].
    ///
    /// Returns `false` if a disconnect or a new connect happened in the meantime.
    pub fn retry(&mut self) -> bool {
        self.connection.retry()
    }

    /// The transport is open: send the handshake, replay every subscription, then
    /// flush commands queued while the transport was opening.
    pub fn handle_open(&mut self) -> Result<()> {
        if self.connection.status() != Status::Connecting {
            return Ok(());
        }
        self.connection.on_open();

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let handshake = Request::connect(&self.config, timestamp);
        self.write(vec![Outgoing::new(handshake)])?;

        // Replay covers every registry entry, so queued subscribes are redundant
        let keep = |outgoing: &Outgoing| outgoing.request.method != Method::Subscribe;
        self.outbox.retain(keep);
        self.batch.retain(keep);

        let paths = self.subscriptions.paths();
        if !paths.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!(count = paths.len(), "Replaying subscriptions");
        }
        for path in &paths {
            self.write(vec![Outgoing::new(Request::subscribe(path))])?;
        }

        for outgoing in std::mem::take(&mut self.outbox) {
            self.write(vec![outgoing])?;
        }
        Ok(())
    }

    /// Decode and dispatch one incoming frame.
    ///
    /// A malformed frame fails with [`Kind::Decode`](crate::error::Kind::Decode) and
    /// leaves the session untouched; the caller decides whether to log and carry on.
    pub fn handle_frame<B: AsRef<[u8]>>(&mut self, frame: B) -> Result<()> {
        let frame = frame.as_ref();
        if self.config.debug() {
            #[cfg(feature = "tracing")]
            tracing::trace!(frame = %String::from_utf8_lossy(frame), "Received frame");
        }

        for response in self.codec.decode(frame)? {
            self.dispatch(response);
        }
        Ok(())
    }

    /// The transport closed or failed to open.
    ///
    /// Returns the delay after which [`Session::retry`] should be called, or `None`
    /// when the session will not reconnect.
    pub fn handle_close(&mut self) -> Option<Duration> {
        let outcome = self.connection.on_close();
        if outcome == CloseOutcome::Ignored {
            return None;
        }

        self.subscriptions.reset_subscribed();
        self.abandon_pending();
        self.events.emit(events::DISCONNECT, &Value::Null);

        match outcome {
            CloseOutcome::Retry(delay) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(?delay, "Scheduling reconnect");
                Some(delay)
            }
            CloseOutcome::Exhausted => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Reconnect attempts exhausted");
                None
            }
            _ => None,
        }
    }

    /// Subscribe to `path`, or return the existing subscription unchanged.
    ///
    /// Only the first call for a path sends a subscribe command. While the transport
    /// is still opening nothing is sent; the subscription is replayed once it opens.
    ///
    /// # Errors
    ///
    /// `IllegalState` when the session is disconnected, `InvalidPath` when `path`
    /// does not parse.
    pub fn subscribe(&mut self, path: &str) -> Result<&mut Subscription> {
        self.ensure_live("subscribe")?;
        let path = self.config.path_format().parse(path)?;

        let known = self.subscriptions.contains(&path);
        if !known && self.connection.is_transport_open() {
            self.submit(Outgoing::new(Request::subscribe(&path)))?;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            channel = %self.config.path_format().display(&path),
            known,
            "Subscribe requested"
        );

        let (subscription, _) = self.subscriptions.get_or_insert(path);
        Ok(subscription)
    }

    /// [`Session::subscribe`], also attaching `on_message` to the subscription's
    /// `message` event.
    pub fn subscribe_with<F>(&mut self, path: &str, on_message: F) -> Result<&mut Subscription>
    where
        F: FnMut(&Value) + Send + 'static,
    {
        let subscription = self.subscribe(path)?;
        subscription.on(events::MESSAGE, on_message);
        Ok(subscription)
    }

    /// Remove the subscription for `path` locally, then tell the broker.
    ///
    /// No frame for the channel is dispatched after this returns, whatever the broker
    /// does with the command. A path that was never subscribed is a no-op.
    pub fn unsubscribe(&mut self, path: &str) -> Result<()> {
        let path = self.config.path_format().parse(path)?;
        let Some(mut subscription) = self.subscriptions.remove(&path) else {
            return Ok(());
        };

        subscription.set_subscribed(false);
        subscription.emit(events::UNSUBSCRIBE, &Value::Null);

        if self.connection.is_transport_open() {
            self.submit(Outgoing::new(Request::unsubscribe(&path)))?;
        }
        Ok(())
    }

    pub fn publish(&mut self, path: &str, data: Value) -> Result<()> {
        let path = self.subscribed_path("publish", path)?;
        self.submit(Outgoing::new(Request::publish(&path, data)))
    }

    /// Publish `data` into `path` and resolve `callback` with the broker's reply.
    pub fn publish_with<F>(&mut self, path: &str, data: Value, callback: F) -> Result<()>
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let path = self.subscribed_path("publish", path)?;
        self.submit(Outgoing {
            request: Request::publish(&path, data),
            callback: Some(Box::new(callback)),
        })
    }

    pub fn presence(&mut self, path: &str) -> Result<()> {
        let path = self.subscribed_path("request presence", path)?;
        self.submit(Outgoing::new(Request::presence(&path)))
    }

    pub fn presence_with<F>(&mut self, path: &str, callback: F) -> Result<()>
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let path = self.subscribed_path("request presence", path)?;
        self.submit(Outgoing {
            request: Request::presence(&path),
            callback: Some(Box::new(callback)),
        })
    }

    pub fn history(&mut self, path: &str) -> Result<()> {
        let path = self.subscribed_path("request history", path)?;
        self.submit(Outgoing::new(Request::history(&path)))
    }

    pub fn history_with<F>(&mut self, path: &str, callback: F) -> Result<()>
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let path = self.subscribed_path("request history", path)?;
        self.submit(Outgoing {
            request: Request::history(&path),
            callback: Some(Box::new(callback)),
        })
    }

    /// Send a keepalive. The broker's `ping` replies are ignored.
    pub fn ping(&mut self) -> Result<()> {
        self.ensure_live("ping")?;
        self.submit(Outgoing::new(Request::ping()))
    }

    /// Keepalive for drivers: goes straight to the wire, bypassing any batch in
    /// progress. Does nothing until the handshake has completed.
    pub fn heartbeat(&mut self) -> Result<()> {
        if !self.is_connected() || !self.connection.is_transport_open() {
            return Ok(());
        }
        self.write(vec![Outgoing::new(Request::ping())])
    }

    /// Collect commands instead of sending them, until [`Session::flush`].
    pub fn start_batching(&mut self) {
        self.batching = true;
    }

    /// Stop collecting. Commands already collected are sent now when `flush` is
    /// true, otherwise they wait for the next [`Session::flush`].
    pub fn stop_batching(&mut self, flush: bool) -> Result<()> {
        self.batching = false;
        if flush { self.flush() } else { Ok(()) }
    }

    /// Send every collected command as a single array frame.
    pub fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.batch);
        if self.connection.is_transport_open() {
            self.write(batch)
        } else {
            self.outbox.extend(batch);
            Ok(())
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.connection.status()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.status().is_connected()
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.connection.status() == Status::Disconnected
    }

    /// Whether a dropped transport will be followed by a reconnect.
    #[must_use]
    pub fn will_reconnect(&self) -> bool {
        self.connection.will_reconnect()
    }

    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.batching
    }

    /// Identity assigned by the broker on a successful handshake.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.connection.client_id()
    }

    /// The subscription for `path`, if any. Unparsable paths have none.
    #[must_use]
    pub fn subscription(&self, path: &str) -> Option<&Subscription> {
        let path = self.config.path_format().parse(path).ok()?;
        self.subscriptions.get(&path)
    }

    pub fn subscription_mut(&mut self, path: &str) -> Option<&mut Subscription> {
        let path = self.config.path_format().parse(path).ok()?;
        self.subscriptions.get_mut(&path)
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Callbacks awaiting a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        self.connection.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.connection.transport_mut()
    }

    fn ensure_live(&self, operation: &'static str) -> Result<()> {
        let status = self.connection.status();
        if status.is_live() {
            Ok(())
        } else {
            Err(Error::illegal_state(operation, status))
        }
    }

    fn subscribed_path(&self, operation: &'static str, path: &str) -> Result<ChannelPath> {
        self.ensure_live(operation)?;
        let parsed = self.config.path_format().parse(path)?;
        if self.subscriptions.contains(&parsed) {
            Ok(parsed)
        } else {
            Err(Error::not_subscribed(path))
        }
    }

    fn submit(&mut self, outgoing: Outgoing) -> Result<()> {
        if self.batching {
            self.batch.push(outgoing);
            Ok(())
        } else if self.connection.is_transport_open() {
            self.write(vec![outgoing])
        } else {
            self.outbox.push(outgoing);
            Ok(())
        }
    }

    /// Assign uids, encode as one frame, and only then register the callbacks.
    fn write(&mut self, outgoing: Vec<Outgoing>) -> Result<()> {
        let client_id = self.connection.client_id().map(ToOwned::to_owned);
        let mut commands = Vec::with_capacity(outgoing.len());
        let mut callbacks = Vec::new();

        for Outgoing { request, callback } in outgoing {
            self.last_uid += 1;
            let uid = self.last_uid;
            if let Some(callback) = callback {
                callbacks.push((uid, callback));
            }
            commands.push(request.into_command(uid, client_id.clone()));
        }

        let frame = match commands.as_slice() {
            [] => return Ok(()),
            [command] => self.codec.encode(command)?,
            _ => self.codec.encode_batch(&commands)?,
        };

        if self.config.debug() {
            #[cfg(feature = "tracing")]
            tracing::trace!(%frame, "Sending frame");
        }

        self.pending.extend(callbacks);
        self.connection.send(frame);
        Ok(())
    }

    fn abandon_pending(&mut self) {
        if !self.pending.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::warn!(count = self.pending.len(), "Abandoning pending callbacks");
            self.pending.clear();
        }
    }

    fn dispatch(&mut self, response: Response) {
        let Some(method) = response.kind() else {
            #[cfg(feature = "tracing")]
            tracing::trace!(method = %response.method, "Ignoring unknown method");
            return;
        };

        self.resolve(&response);

        if let Some(error) = &response.error {
            #[cfg(feature = "tracing")]
            tracing::warn!(%method, %error, "Broker returned an error");
            self.events.emit(events::ERROR, error);
        }

        match method {
            Method::Connect => self.on_connect(&response),
            Method::Disconnect => match &response.error {
                None => self.disconnect(),
                Some(error) => {
                    self.events.emit(events::DISCONNECT_ERROR, error);
                }
            },
            Method::Ping => {}
            _ => self.on_channel_response(method, &response),
        }
    }

    /// Invoke and drop the callback registered under the response's uid.
    fn resolve(&mut self, response: &Response) {
        let Some(callback) = response.uid().and_then(|uid| self.pending.remove(&uid)) else {
            return;
        };

        let reply = match &response.error {
            None => Ok(response.body.clone()),
            Some(error) => Err(BrokerError {
                method: response.method.clone(),
                error: error.clone(),
            }),
        };

        if catch_unwind(AssertUnwindSafe(|| callback(reply))).is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!(method = %response.method, "Reply callback panicked");
        }
    }

    fn on_connect(&mut self, response: &Response) {
        if let Some(error) = &response.error {
            self.events.emit(events::CONNECT_ERROR, error);
            return;
        }

        if self.connection.status() != Status::Connecting || !self.connection.is_transport_open() {
            #[cfg(feature = "tracing")]
            tracing::debug!(status = %self.connection.status(), "Ignoring stale handshake reply");
            return;
        }

        let client_id = response
            .body
            .as_str()
            .or_else(|| response.body.get("client").and_then(Value::as_str))
            .map(ToOwned::to_owned);
        self.connection.on_handshake(client_id);
        self.events.emit(events::CONNECT, &response.body);
    }

    fn on_channel_response(&mut self, method: Method, response: &Response) {
        let Some(path) = response.channel_path(self.config.path_format()) else {
            return;
        };
        let Some(subscription) = self.subscriptions.get_mut(&path) else {
            #[cfg(feature = "tracing")]
            tracing::trace!(
                %method,
                channel = %self.config.path_format().display(&path),
                "No subscription for response"
            );
            return;
        };

        let body = &response.body;
        match (method, &response.error) {
            (Method::Subscribe, None) => {
                subscription.set_subscribed(true);
                subscription.emit(events::SUBSCRIBE_SUCCESS, body);
                subscription.emit(events::READY, body);
            }
            (Method::Subscribe, Some(error)) => {
                subscription.emit(events::SUBSCRIBE_ERROR, error);
                subscription.emit(events::ERROR, error);
            }
            (Method::Publish, None) => {
                subscription.emit(events::PUBLISH_SUCCESS, body);
            }
            (Method::Publish, Some(error)) => {
                subscription.emit(events::PUBLISH_ERROR, error);
            }
            (Method::Presence, None) => {
                subscription.emit(events::PRESENCE, body);
                subscription.emit(events::PRESENCE_SUCCESS, body);
            }
            (Method::Presence, Some(error)) => {
                subscription.emit(events::PRESENCE_ERROR, error);
            }
            (Method::History, None) => {
                subscription.emit(events::HISTORY, body);
                subscription.emit(events::HISTORY_SUCCESS, body);
            }
            (Method::History, Some(error)) => {
                subscription.emit(events::HISTORY_ERROR, error);
            }
            (Method::Join, _) => {
                subscription.emit(events::JOIN, body);
            }
            (Method::Leave, _) => {
                subscription.emit(events::LEAVE, body);
            }
            (Method::Message, _) => {
                subscription.emit(events::MESSAGE, body);
            }
            // The entry was removed when unsubscribe was called, so an ack that
            // finds a subscription belongs to a later subscribe and is ignored.
            _ => {}
        }
    }
}

impl<T, C> Listen<Value> for Session<T, C> {
    fn on<S, F>(&mut self, event: S, handler: F) -> HandlerId
    where
        S: Into<String>,
        F: FnMut(&Value) + Send + 'static,
    {
        self.events.on(event, handler)
    }

    fn once<S, F>(&mut self, event: S, handler: F) -> HandlerId
    where
        S: Into<String>,
        F: FnMut(&Value) + Send + 'static,
    {
        self.events.once(event, handler)
    }

    fn off(&mut self, event: &str, id: HandlerId) -> bool {
        self.events.off(event, id)
    }
}
