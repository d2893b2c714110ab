//! The session and subscription protocol engine.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: transport lifecycle, status transitions, reconnect scheduling
//! - [`SubscriptionRegistry`]: one [`Subscription`] per channel path, replayed after reconnects
//! - [`Session`]: the facade composing both, correlating replies and dispatching frames
//!
//! Everything here is single-threaded and performs no I/O. All mutation happens
//! inside `&mut Session` calls, so a driver that introduces threads must serialize
//! access through one task, as [`ws::Client`](crate::ws::Client) does.

pub mod client;
pub mod connection;
pub mod subscription;

pub use client::{BrokerError, Callback, Reply, Session};
pub use connection::{CloseOutcome, ConnectionManager, Status};
pub use subscription::{Subscription, SubscriptionRegistry};

/// Names of the events emitted on the session and subscription buses.
pub mod events {
    /// Session: handshake accepted. Payload: response body (the client id).
    pub const CONNECT: &str = "connect";
    /// Session: handshake rejected. Payload: broker error.
    pub const CONNECT_ERROR: &str = "connect:error";
    /// Session: transport closed or explicit disconnect. Payload: `null`.
    pub const DISCONNECT: &str = "disconnect";
    /// Session: broker rejected a disconnect command. Payload: broker error.
    pub const DISCONNECT_ERROR: &str = "disconnect:error";
    /// Session and subscription: any broker error. Payload: broker error.
    pub const ERROR: &str = "error";

    pub const SUBSCRIBE_SUCCESS: &str = "subscribe:success";
    pub const SUBSCRIBE_ERROR: &str = "subscribe:error";
    /// Subscription: acknowledged by the broker. Emitted with `subscribe:success`.
    pub const READY: &str = "ready";
    /// Subscription: removed locally by an unsubscribe call.
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const PUBLISH_SUCCESS: &str = "publish:success";
    pub const PUBLISH_ERROR: &str = "publish:error";
    pub const PRESENCE: &str = "presence";
    pub const PRESENCE_SUCCESS: &str = "presence:success";
    pub const PRESENCE_ERROR: &str = "presence:error";
    pub const HISTORY: &str = "history";
    pub const HISTORY_SUCCESS: &str = "history:success";
    pub const HISTORY_ERROR: &str = "history:error";
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    /// Subscription: message pushed by the broker. Payload: response body.
    pub const MESSAGE: &str = "message";
}
