use secrecy::{ExposeSecret as _, SecretString};
use serde::{Serialize, Serializer};
use serde_json::Value;
use serde_with::{DisplayFromStr, serde_as};

use super::Method;
use crate::config::Config;
use crate::path::ChannelPath;

/// A command that has not been assigned a `uid` yet.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub params: Params,
}

impl Request {
    /// The handshake. `timestamp` is used when the config carries none.
    #[must_use]
    pub fn connect(config: &Config, timestamp: String) -> Self {
        Self {
            method: Method::Connect,
            params: Params::Connect(ConnectParams {
                token: config.token().clone(),
                user: config.user().to_owned(),
                project: config.project().to_owned(),
                timestamp: config.timestamp().map_or(timestamp, ToOwned::to_owned),
                info: config.info().map(ToOwned::to_owned),
            }),
        }
    }

    #[must_use]
    pub fn subscribe(path: &ChannelPath) -> Self {
        Self::channel(Method::Subscribe, path)
    }

    #[must_use]
    pub fn unsubscribe(path: &ChannelPath) -> Self {
        Self::channel(Method::Unsubscribe, path)
    }

    #[must_use]
    pub fn presence(path: &ChannelPath) -> Self {
        Self::channel(Method::Presence, path)
    }

    #[must_use]
    pub fn history(path: &ChannelPath) -> Self {
        Self::channel(Method::History, path)
    }

    #[must_use]
    pub fn publish(path: &ChannelPath, data: Value) -> Self {
        Self {
            method: Method::Publish,
            params: Params::Publish(PublishParams {
                namespace: path.namespace().map(ToOwned::to_owned),
                channel: path.channel().to_owned(),
                data,
            }),
        }
    }

    #[must_use]
    pub fn ping() -> Self {
        Self {
            method: Method::Ping,
            params: Params::Raw(Value::Object(serde_json::Map::new())),
        }
    }

    fn channel(method: Method, path: &ChannelPath) -> Self {
        Self {
            method,
            params: Params::Channel(ChannelParams {
                namespace: path.namespace().map(ToOwned::to_owned),
                channel: path.channel().to_owned(),
            }),
        }
    }

    /// Attach the correlation id and, once known, the broker-assigned client id.
    #[must_use]
    pub fn into_command(self, uid: u64, client_id: Option<String>) -> Command {
        Command {
            method: self.method,
            params: self.params,
            uid,
            client_id,
        }
    }
}

/// Outgoing wire command.
#[non_exhaustive]
#[serde_as]
#[derive(Clone, Debug, Serialize)]
pub struct Command {
    pub method: Method,
    pub params: Params,
    #[serde_as(as = "DisplayFromStr")]
    pub uid: u64,
    #[serde(rename = "clientId", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Params {
    Connect(ConnectParams),
    Channel(ChannelParams),
    Publish(PublishParams),
    Raw(Value),
}

/// Handshake parameters.
///
/// # Security
///
/// Serializing this struct reveals the token. It is only ever serialized into the
/// handshake frame; `Debug` output keeps it redacted.
#[non_exhaustive]
#[derive(Clone, Debug, Serialize)]
pub struct ConnectParams {
    #[serde(serialize_with = "expose")]
    pub token: SecretString,
    pub user: String,
    pub project: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

fn expose<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

#[non_exhaustive]
#[derive(Clone, Debug, Serialize)]
pub struct ChannelParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub channel: String,
}

#[non_exhaustive]
#[derive(Clone, Debug, Serialize)]
pub struct PublishParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub channel: String,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::path::PathFormat;

    fn path(text: &str) -> ChannelPath {
        PathFormat::default().parse(text).unwrap()
    }

    #[test]
    fn serialize_namespaced_subscribe() {
        let command = Request::subscribe(&path("news:sport")).into_command(1, None);

        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"method":"subscribe","params":{"namespace":"news","channel":"sport"},"uid":"1"}"#
        );
    }

    #[test]
    fn serialize_bare_channel_omits_namespace() {
        let command = Request::unsubscribe(&path("sport")).into_command(7, Some("c1".to_owned()));

        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"method":"unsubscribe","params":{"channel":"sport"},"uid":"7","clientId":"c1"}"#
        );
    }

    #[test]
    fn serialize_publish_carries_data() {
        let command =
            Request::publish(&path("news:sport"), json!({"score": [1, 0]})).into_command(3, None);
        let value = serde_json::to_value(&command).unwrap();

        assert_eq!(
            value,
            json!({
                "method": "publish",
                "params": {"namespace": "news", "channel": "sport", "data": {"score": [1, 0]}},
                "uid": "3"
            })
        );
    }

    #[test]
    fn serialize_connect_exposes_token_only_on_the_wire() {
        let config = Config::builder()
            .url("ws://h/c")
            .token("t0ken")
            .project("p")
            .user("u")
            .info(r#"{"name":"x"}"#)
            .build()
            .unwrap();
        let request = Request::connect(&config, "1700000000".to_owned());

        assert!(!format!("{request:?}").contains("t0ken"));

        let value = serde_json::to_value(request.into_command(1, None)).unwrap();
        assert_eq!(
            value["params"],
            json!({
                "token": "t0ken",
                "user": "u",
                "project": "p",
                "timestamp": "1700000000",
                "info": "{\"name\":\"x\"}"
            })
        );
    }

    #[test]
    fn configured_timestamp_wins_over_default() {
        let config = Config::builder()
            .url("ws://h/c")
            .token("t")
            .project("p")
            .user("u")
            .timestamp("42")
            .build()
            .unwrap();

        let Params::Connect(params) = Request::connect(&config, "99".to_owned()).params else {
            panic!("connect request should carry connect params");
        };
        assert_eq!(params.timestamp, "42");
    }

    #[test]
    fn serialize_ping_has_empty_params() {
        let command = Request::ping().into_command(2, None);

        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"method":"ping","params":{},"uid":"2"}"#
        );
    }
}
