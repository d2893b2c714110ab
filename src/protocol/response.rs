use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Method;
use crate::path::{ChannelPath, PathFormat};

/// Incoming wire record.
///
/// `error` is `None` both when the field is absent and when it is `null`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Response {
    pub method: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Response {
    /// Known method, or `None` for methods this client does not understand.
    #[must_use]
    pub fn kind(&self) -> Option<Method> {
        Method::from_wire(&self.method)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The correlation id echoed by the broker, if it is one this client could have issued.
    #[must_use]
    pub fn uid(&self) -> Option<u64> {
        self.uid.as_deref()?.parse().ok()
    }

    /// Channel this response refers to, read from `body` first and `params` second.
    #[must_use]
    pub fn channel_path(&self, format: &PathFormat) -> Option<ChannelPath> {
        [Some(&self.body), self.params.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|source| {
                let channel = source.get("channel")?.as_str()?;
                let namespace = source.get("namespace").and_then(Value::as_str);
                Some(ChannelPath::from_wire(namespace, channel, format))
            })
    }
}
