//! Client for the Centrifuge real-time messaging broker.
//!
//! The crate is split into a transport-independent protocol engine and an optional
//! tokio WebSocket driver.
//!
//! - [`Session`] establishes the broker session, multiplexes channel
//!   [`Subscription`]s over it, correlates replies with commands and replays
//!   subscriptions after a dropped connection. It performs no I/O: it drives a
//!   [`Transport`](transport::Transport) and is fed the transport's events.
//! - [`ws::Client`] (feature `ws`, on by default) runs a [`Session`] on a background
//!   task over a `tokio-tungstenite` socket.
//!
//! # Features
//!
//! - `ws`: the WebSocket driver
//! - `tracing`: structured logs for status changes, replay, dropped frames and, when
//!   [`Config::debug`] is set, every raw frame
//!
//! # Example
//!
//! ```rust
//! use centrifuge_client::{Config, Session};
//! # use centrifuge_client::transport::Transport;
//! # struct Noop;
//! # impl Transport for Noop {
//! #     fn open(&mut self, _: &url::Url) {}
//! #     fn send(&mut self, _: String) {}
//! #     fn close(&mut self) {}
//! # }
//!
//! # fn main() -> centrifuge_client::Result<()> {
//! let config = Config::builder()
//!     .url("ws://localhost:8000/connection/websocket")
//!     .token("token")
//!     .project("project")
//!     .user("42")
//!     .build()?;
//!
//! let mut session = Session::new(config, Noop);
//! session.connect();
//! session.handle_open()?;
//! session.subscribe("news:sport")?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod path;
pub mod protocol;
pub mod session;
pub mod transport;
#[cfg(feature = "ws")]
pub mod ws;

pub use config::Config;
pub use error::Error;
pub use session::{Session, Status, Subscription};

pub type Result<T> = std::result::Result<T, Error>;
