#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::collections::VecDeque;
use std::future::pending;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt as _, SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use url::Url;

use super::config::Config;
use super::error::WsError;
use crate::session::{Session, Status};
use crate::transport::Transport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Connecting = BoxFuture<'static, Result<WsStream, WsError>>;

const IDLE_HEARTBEAT_PERIOD: Duration = Duration::from_secs(3600);

/// Work executed on the driver task against its session.
pub(crate) type Job = Box<dyn FnOnce(&mut Session<SocketOps>) + Send>;

/// What the session asked its transport to do since the last drain.
#[derive(Debug)]
pub(crate) enum SocketOp {
    Open(Url),
    Send(String),
    Close,
}

/// [`Transport`] that queues socket operations for the driver task to perform
/// once the session call that produced them has returned.
#[derive(Debug, Default)]
pub(crate) struct SocketOps {
    queue: VecDeque<SocketOp>,
}

impl SocketOps {
    fn pop(&mut self) -> Option<SocketOp> {
        self.queue.pop_front()
    }
}

impl Transport for SocketOps {
    fn open(&mut self, url: &Url) {
        self.queue.push_back(SocketOp::Open(url.clone()));
    }

    fn send(&mut self, frame: String) {
        self.queue.push_back(SocketOp::Send(frame));
    }

    fn close(&mut self) {
        self.queue.push_back(SocketOp::Close);
    }
}

/// The driver task: the only place the session is ever touched.
///
/// Every mutation arrives as a [`Job`], so the single-threaded guarantees of
/// [`Session`] hold no matter how many [`Client`](super::Client) handles exist.
pub(crate) struct ConnectionTask {
    session: Session<SocketOps>,
    config: Config,
    jobs: mpsc::UnboundedReceiver<Job>,
    status_tx: watch::Sender<Status>,
    socket: Option<WsStream>,
    connecting: Option<Connecting>,
    retry_at: Option<Instant>,
}

impl ConnectionTask {
    pub(crate) fn new(
        session: Session<SocketOps>,
        config: Config,
        jobs: mpsc::UnboundedReceiver<Job>,
        status_tx: watch::Sender<Status>,
    ) -> Self {
        Self {
            session,
            config,
            jobs,
            status_tx,
            socket: None,
            connecting: None,
            retry_at: None,
        }
    }

    /// Run until every [`Client`](super::Client) handle has been dropped.
    pub(crate) async fn run(mut self) {
        let heartbeat_enabled = self.config.heartbeat_interval.is_some();
        // Never polled when heartbeats are disabled
        let period = self.config.heartbeat_interval.unwrap_or(IDLE_HEARTBEAT_PERIOD);
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                job = self.jobs.recv() => {
                    let Some(job) = job else {
                        self.session.disconnect();
                        self.apply_ops().await;
                        break;
                    };
                    job(&mut self.session);
                }

                result = next_connect(&mut self.connecting) => {
                    self.connecting = None;
                    match result {
                        Ok(stream) => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!("WebSocket opened");
                            self.socket = Some(stream);
                            if let Err(e) = self.session.handle_open() {
                                #[cfg(feature = "tracing")]
                                tracing::error!("Unable to send handshake: {e:?}");
                                #[cfg(not(feature = "tracing"))]
                                let _ = &e;
                            }
                        }
                        Err(e) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!("Unable to connect: {e}");
                            #[cfg(not(feature = "tracing"))]
                            let _ = &e;
                            self.on_closed();
                        }
                    }
                }

                message = next_message(&mut self.socket) => {
                    self.on_message(message);
                }

                () = sleep_until_some(self.retry_at) => {
                    self.retry_at = None;
                    self.session.retry();
                }

                _ = heartbeat.tick(), if heartbeat_enabled && self.session.is_connected() => {
                    if let Err(e) = self.session.heartbeat() {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Unable to send heartbeat: {e:?}");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                    }
                }
            }

            self.apply_ops().await;
            self.status_tx.send_if_modified(|status| {
                let current = self.session.status();
                let changed = *status != current;
                *status = current;
                changed
            });
        }
    }

    fn on_message(
        &mut self,
        message: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) {
        let frame = match message {
            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(Message::Binary(bytes))) => bytes.to_vec(),
            Some(Ok(Message::Close(_))) | None => {
                #[cfg(feature = "tracing")]
                tracing::debug!("WebSocket closed by peer");
                self.socket = None;
                self.on_closed();
                return;
            }
            Some(Err(e)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("WebSocket error: {e}");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                self.socket = None;
                self.on_closed();
                return;
            }
            // Control frames are answered by tungstenite
            Some(Ok(_)) => return,
        };

        if let Err(e) = self.session.handle_frame(&frame) {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "Dropping undecodable frame");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    fn on_closed(&mut self) {
        self.retry_at = self
            .session
            .handle_close()
            .map(|delay| Instant::now() + delay);
    }

    /// Perform the socket operations queued by the last session call.
    async fn apply_ops(&mut self) {
        while let Some(op) = self.session.transport_mut().pop() {
            match op {
                SocketOp::Open(url) => {
                    self.drop_socket().await;
                    self.retry_at = None;
                    let connect_timeout = self.config.connect_timeout;
                    self.connecting = Some(
                        async move {
                            match timeout(connect_timeout, connect_async(url.as_str())).await {
                                Ok(Ok((stream, _))) => Ok(stream),
                                Ok(Err(e)) => Err(WsError::Connection(e)),
                                Err(_) => Err(WsError::Timeout),
                            }
                        }
                        .boxed(),
                    );
                }
                SocketOp::Send(frame) => {
                    let Some(socket) = self.socket.as_mut() else {
                        continue;
                    };
                    if let Err(e) = socket.send(Message::Text(frame.into())).await {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Unable to send frame: {e}");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                        self.socket = None;
                        self.on_closed();
                    }
                }
                SocketOp::Close => self.drop_socket().await,
            }
        }
    }

    async fn drop_socket(&mut self) {
        self.connecting = None;
        if let Some(mut socket) = self.socket.take() {
            _ = socket.close(None).await;
        }
    }
}

async fn next_connect(connecting: &mut Option<Connecting>) -> Result<WsStream, WsError> {
    match connecting.as_mut() {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn next_message(
    socket: &mut Option<WsStream>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket.as_mut() {
        Some(socket) => socket.next().await,
        None => pending().await,
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
