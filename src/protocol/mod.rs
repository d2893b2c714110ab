//! Wire records exchanged with the broker.
//!
//! Outgoing frames are [`request::Command`]s: `{"method", "params", "uid", "clientId"?}`.
//! Incoming frames are [`response::Response`]s, or JSON arrays of them.

pub mod request;
pub mod response;

use serde::Serialize;
use strum_macros::Display;

pub use request::{Command, Params, Request};
pub use response::Response;

/// Protocol methods understood by this client.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Method {
    Connect,
    Disconnect,
    Subscribe,
    Unsubscribe,
    Publish,
    Presence,
    History,
    /// Broker push: a client joined a channel
    Join,
    /// Broker push: a client left a channel
    Leave,
    /// Broker push: a message published into a channel
    Message,
    /// Keepalive, ignored when received
    Ping,
}

impl Method {
    /// Map a wire method name. Unknown names yield `None` so that methods added
    /// to the protocol later are ignored rather than rejected.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Some(match name {
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "subscribe" => Self::Subscribe,
            "unsubscribe" => Self::Unsubscribe,
            "publish" => Self::Publish,
            "presence" => Self::Presence,
            "history" => Self::History,
            "join" => Self::Join,
            "leave" => Self::Leave,
            "message" => Self::Message,
            "ping" => Self::Ping,
            _ => return None,
        })
    }

    /// Methods whose responses target one channel.
    #[must_use]
    pub const fn is_channel_scoped(self) -> bool {
        matches!(
            self,
            Self::Subscribe
                | Self::Unsubscribe
                | Self::Publish
                | Self::Presence
                | Self::History
                | Self::Join
                | Self::Leave
                | Self::Message
        )
    }
}
