#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::time::Duration;

use strum_macros::Display;
use url::Url;

use crate::config::{Config, RetryBackoff};
use crate::transport::Transport;

/// Session connection status.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    /// No transport, or the transport dropped
    Disconnected,
    /// Transport opening or handshake in flight
    Connecting,
    /// Handshake acknowledged by the broker
    Connected,
    /// Explicit teardown in progress
    Disconnecting,
}

impl Status {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether operations may be initiated in this status.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// What the connection manager decided after the transport closed.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Reconnect after the given delay.
    Retry(Duration),
    /// The reconnect policy ran out of attempts.
    Exhausted,
    /// Reconnection is disabled.
    Stopped,
    /// The close was already accounted for by an explicit disconnect or an earlier close.
    Ignored,
}

/// Owns the transport lifecycle and the status state machine:
/// `disconnected -> connecting -> connected -> disconnected`, plus
/// `disconnecting -> disconnected` for an explicit close.
pub struct ConnectionManager<T> {
    transport: T,
    url: Url,
    status: Status,
    reconnect: bool,
    transport_open: bool,
    client_id: Option<String>,
    backoff: RetryBackoff,
}

impl<T: Transport> ConnectionManager<T> {
    #[must_use]
    pub fn new(config: &Config, transport: T) -> Self {
        Self {
            transport,
            url: config.url().clone(),
            status: Status::Disconnected,
            reconnect: true,
            transport_open: false,
            client_id: None,
            backoff: config.reconnect().backoff(),
        }
    }

    /// Open a new transport, first tearing down any transport still alive.
    ///
    /// A caller-initiated connect starts with a fresh retry budget.
    pub fn connect(&mut self) {
        self.backoff.reset();
        self.open();
    }

    fn open(&mut self) {
        if self.status.is_live() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                status = %self.status,
                "Closing previous transport before reconnecting"
            );
            self.transport.close();
        }

        self.transport_open = false;
        self.client_id = None;
        self.reconnect = true;
        self.set_status(Status::Connecting);
        self.transport.open(&self.url);
    }

    /// The transport is usable. The handshake is the caller's to send.
    pub fn on_open(&mut self) {
        self.transport_open = true;
    }

    /// The broker accepted the handshake.
    pub fn on_handshake(&mut self, client_id: Option<String>) {
        self.client_id = client_id;
        self.backoff.reset();
        self.set_status(Status::Connected);
    }

    /// The transport dropped or failed to open.
    pub fn on_close(&mut self) -> CloseOutcome {
        if self.status == Status::Disconnected && !self.transport_open {
            return CloseOutcome::Ignored;
        }

        self.transport_open = false;
        self.client_id = None;
        self.set_status(Status::Disconnected);

        if !self.reconnect {
            return CloseOutcome::Stopped;
        }

        match self.backoff.next_delay() {
            Some(delay) => CloseOutcome::Retry(delay),
            None => {
                self.reconnect = false;
                CloseOutcome::Exhausted
            }
        }
    }

    /// Reconnect after a scheduled delay, unless an explicit disconnect happened since.
    pub fn retry(&mut self) -> bool {
        if self.reconnect && self.status == Status::Disconnected {
            self.open();
            true
        } else {
            false
        }
    }

    /// Explicit teardown. Never schedules a retry.
    ///
    /// Returns `false` if the manager was already disconnected.
    pub fn disconnect(&mut self) -> bool {
        self.reconnect = false;

        if self.status == Status::Disconnected {
            return false;
        }

        self.set_status(Status::Disconnecting);
        self.transport.close();
        self.transport_open = false;
        self.client_id = None;
        self.set_status(Status::Disconnected);
        true
    }

    pub fn send(&mut self, frame: String) {
        self.transport.send(frame);
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn is_transport_open(&self) -> bool {
        self.transport_open
    }

    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    #[must_use]
    pub fn will_reconnect(&self) -> bool {
        self.reconnect
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn set_status(&mut self, status: Status) {
        if self.status != status {
            #[cfg(feature = "tracing")]
            tracing::debug!(from = %self.status, to = %status, "Status changed");
            self.status = status;
        }
    }
}
