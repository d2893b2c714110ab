use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use super::config::Config;
use super::connection::{ConnectionTask, Job, SocketOps};
use super::error::WsError;
use crate::Result;
use crate::error::Error;
use crate::event::{HandlerId, Listen as _};
use crate::session::{Callback, Reply, Session, Status};

/// WebSocket client for a Centrifuge broker.
///
/// A cheap, cloneable handle to a background task that owns the [`Session`] and the
/// socket. Every call is forwarded to that task, so handlers and callbacks run there
/// and must be `Send + 'static`.
///
/// # Example
///
/// ```rust, no_run
/// use centrifuge_client::Config;
/// use centrifuge_client::ws::Client;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::builder()
///         .url("ws://localhost:8000/connection/websocket")
///         .token("token")
///         .project("project")
///         .user("42")
///         .build()?;
///
///     let client = Client::new(config);
///     client.connect().await?;
///     client.wait_connected().await?;
///
///     let news = client
///         .subscribe_with("news:sport", |message| println!("{message}"))
///         .await?;
///     let reply = news.history().await?;
///     println!("{reply:?}");
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    jobs: mpsc::UnboundedSender<Job>,
    status_rx: watch::Receiver<Status>,
}

impl Client {
    /// Spawn the driver task with the default [`Config`].
    ///
    /// Must be called from within a tokio runtime. Nothing is opened until
    /// [`Client::connect`].
    #[must_use]
    pub fn new(config: crate::Config) -> Self {
        Self::with_config(config, Config::default())
    }

    #[must_use]
    pub fn with_config(config: crate::Config, ws_config: Config) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Status::Disconnected);

        let session = Session::new(config, SocketOps::default());
        let task = ConnectionTask::new(session, ws_config, jobs_rx, status_tx);
        tokio::spawn(task.run());

        Self {
            jobs: jobs_tx,
            status_rx,
        }
    }

    /// Run `f` against the session on the driver task and return its result.
    async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Session<SocketOps>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(Box::new(move |session| {
                _ = tx.send(f(session));
            }))
            .map_err(|_e| WsError::ConnectionClosed)?;
        rx.await.map_err(|_e| WsError::ConnectionClosed.into())
    }

    /// Forward a command whose reply is awaited. A session torn down before the
    /// reply arrives drops the callback, which surfaces as
    /// [`WsError::ConnectionClosed`].
    async fn request<F>(&self, f: F) -> Result<Reply>
    where
        F: FnOnce(&mut Session<SocketOps>, Callback) -> Result<()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.call(move |session| {
            f(
                session,
                Box::new(move |reply| {
                    _ = tx.send(reply);
                }),
            )
        })
        .await??;
        rx.await.map_err(|_e| WsError::ConnectionClosed.into())
    }

    /// Open the socket. Returns once the attempt has started; use
    /// [`Client::wait_connected`] to wait for the handshake.
    pub async fn connect(&self) -> Result<()> {
        self.call(Session::connect).await
    }

    /// Close the socket for good and drop every subscription.
    pub async fn disconnect(&self) -> Result<()> {
        self.call(Session::disconnect).await
    }

    /// Wait until the broker has accepted the handshake.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut status_rx = self.status_rx.clone();
        status_rx
            .wait_for(|status| status.is_connected())
            .await
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    #[must_use]
    pub fn status(&self) -> Status {
        *self.status_rx.borrow()
    }

    /// Receiver notified on every status change.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<Status> {
        self.status_rx.clone()
    }

    pub async fn client_id(&self) -> Result<Option<String>> {
        self.call(|session| session.client_id().map(ToOwned::to_owned))
            .await
    }

    pub async fn subscribe(&self, path: &str) -> Result<SubscriptionHandle> {
        let owned = path.to_owned();
        self.call(move |session| session.subscribe(&owned).map(|_| ()))
            .await??;
        Ok(self.handle(path))
    }

    /// Subscribe and attach `on_message` to the channel's `message` event.
    pub async fn subscribe_with<F>(&self, path: &str, on_message: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(&Value) + Send + 'static,
    {
        let owned = path.to_owned();
        self.call(move |session| session.subscribe_with(&owned, on_message).map(|_| ()))
            .await??;
        Ok(self.handle(path))
    }

    pub async fn unsubscribe(&self, path: &str) -> Result<()> {
        let path = path.to_owned();
        self.call(move |session| session.unsubscribe(&path)).await?
    }

    /// Publish into a subscribed channel and wait for the broker's reply.
    pub async fn publish(&self, path: &str, data: Value) -> Result<Reply> {
        let path = path.to_owned();
        self.request(move |session, callback| session.publish_with(&path, data, callback))
            .await
    }

    pub async fn presence(&self, path: &str) -> Result<Reply> {
        let path = path.to_owned();
        self.request(move |session, callback| session.presence_with(&path, callback))
            .await
    }

    pub async fn history(&self, path: &str) -> Result<Reply> {
        let path = path.to_owned();
        self.request(move |session, callback| session.history_with(&path, callback))
            .await
    }

    pub async fn ping(&self) -> Result<()> {
        self.call(Session::ping).await?
    }

    pub async fn start_batching(&self) -> Result<()> {
        self.call(Session::start_batching).await
    }

    pub async fn stop_batching(&self, flush: bool) -> Result<()> {
        self.call(move |session| session.stop_batching(flush))
            .await?
    }

    pub async fn flush(&self) -> Result<()> {
        self.call(Session::flush).await?
    }

    pub async fn subscription_count(&self) -> Result<usize> {
        self.call(|session| session.subscription_count()).await
    }

    /// Register a session-level handler (`connect`, `disconnect`, `error`, ...).
    pub async fn on<F>(&self, event: &str, handler: F) -> Result<HandlerId>
    where
        F: FnMut(&Value) + Send + 'static,
    {
        let event = event.to_owned();
        self.call(move |session| session.on(event, handler)).await
    }

    pub async fn once<F>(&self, event: &str, handler: F) -> Result<HandlerId>
    where
        F: FnMut(&Value) + Send + 'static,
    {
        let event = event.to_owned();
        self.call(move |session| session.once(event, handler)).await
    }

    pub async fn off(&self, event: &str, id: HandlerId) -> Result<bool> {
        let event = event.to_owned();
        self.call(move |session| session.off(&event, id)).await
    }

    fn handle(&self, path: &str) -> SubscriptionHandle {
        SubscriptionHandle {
            client: self.clone(),
            path: path.to_owned(),
        }
    }
}

/// A [`Client`] scoped to one subscribed channel.
#[derive(Clone)]
pub struct SubscriptionHandle {
    client: Client,
    path: String,
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SubscriptionHandle {
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn publish(&self, data: Value) -> Result<Reply> {
        self.client.publish(&self.path, data).await
    }

    pub async fn presence(&self) -> Result<Reply> {
        self.client.presence(&self.path).await
    }

    pub async fn history(&self) -> Result<Reply> {
        self.client.history(&self.path).await
    }

    /// Whether the broker has acknowledged the subscription on the current socket.
    pub async fn is_subscribed(&self) -> Result<bool> {
        let path = self.path.clone();
        self.client
            .call(move |session| {
                session
                    .subscription(&path)
                    .is_some_and(crate::Subscription::is_subscribed)
            })
            .await
    }

    /// Register a handler on this channel (`message`, `join`, `subscribe:success`, ...).
    pub async fn on<F>(&self, event: &str, handler: F) -> Result<HandlerId>
    where
        F: FnMut(&Value) + Send + 'static,
    {
        let path = self.path.clone();
        let event = event.to_owned();
        self.client
            .call(move |session| {
                session
                    .subscription_mut(&path)
                    .map(|subscription| subscription.on(event, handler))
                    .ok_or_else(|| Error::not_subscribed(path))
            })
            .await?
    }

    pub async fn off(&self, event: &str, id: HandlerId) -> Result<bool> {
        let path = self.path.clone();
        let event = event.to_owned();
        self.client
            .call(move |session| {
                session
                    .subscription_mut(&path)
                    .is_some_and(|subscription| subscription.off(&event, id))
            })
            .await
    }

    pub async fn unsubscribe(self) -> Result<()> {
        self.client.unsubscribe(&self.path).await
    }
}
