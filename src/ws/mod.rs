//! Tokio WebSocket driver.
//!
//! # Architecture
//!
//! - [`Client`]: cloneable handle forwarding every call to the driver task
//! - [`SubscriptionHandle`]: a [`Client`] scoped to one channel
//! - `ConnectionTask`: owns the [`Session`](crate::Session), the socket, the retry
//!   timer and the heartbeat, and is the only place the session is mutated
//!
//! Reconnect timing comes from the session's [`ReconnectPolicy`](crate::config::ReconnectPolicy);
//! [`config::Config`] only holds socket-level settings.

pub mod client;
pub mod config;
mod connection;
pub mod error;

pub use client::{Client, SubscriptionHandle};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
