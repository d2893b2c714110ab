#![cfg(feature = "ws")]
#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use centrifuge_client::config::ReconnectPolicy;
use centrifuge_client::error::Kind;
use centrifuge_client::session::events;
use centrifuge_client::ws::Client;
use centrifuge_client::ws::config::Config as WsConfig;
use centrifuge_client::{Config, Status};
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(2);

/// Mock broker answering every command the way a Centrifuge server would.
struct MockBroker {
    addr: SocketAddr,
    /// Push frames to ALL connected clients
    push_tx: broadcast::Sender<String>,
    /// Drop every live connection without a close frame
    kill_tx: broadcast::Sender<()>,
    /// Commands received from clients, batches unwrapped
    commands_rx: mpsc::UnboundedReceiver<Value>,
}

impl MockBroker {
    /// Start a mock broker on a random port.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (push_tx, _) = broadcast::channel::<String>(100);
        let (kill_tx, _) = broadcast::channel::<()>(4);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel::<Value>();

        let broadcast_tx = push_tx.clone();
        let kill = kill_tx.clone();

        tokio::spawn(async move {
            let mut connections = 0_u32;
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                connections += 1;
                let connection = connections;
                let (mut write, mut read) = ws_stream.split();
                let commands_tx = commands_tx.clone();
                let mut push_rx = broadcast_tx.subscribe();
                let mut kill_rx = kill.subscribe();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                let Some(Ok(msg)) = msg else { break };
                                let Message::Text(text) = msg else { continue };
                                let commands = match serde_json::from_str(&text).unwrap() {
                                    Value::Array(batch) => batch,
                                    single => vec![single],
                                };
                                for command in commands {
                                    let reply = reply_to(&command, connection);
                                    drop(commands_tx.send(command));
                                    if let Some(reply) = reply
                                        && write
                                            .send(Message::Text(reply.to_string().into()))
                                            .await
                                            .is_err()
                                    {
                                        return;
                                    }
                                }
                            }
                            msg = push_rx.recv() => {
                                let Ok(text) = msg else { break };
                                if write.send(Message::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                            _ = kill_rx.recv() => break,
                        }
                    }
                });
            }
        });

        Self {
            addr,
            push_tx,
            kill_tx,
            commands_rx,
        }
    }

    fn config(&self) -> Config {
        Config::builder()
            .url(format!("ws://{}/connection/websocket", self.addr))
            .token("t")
            .project("p")
            .user("u")
            .reconnect(ReconnectPolicy::fixed(Duration::from_millis(50)))
            .build()
            .unwrap()
    }

    fn push(&self, frame: &Value) {
        drop(self.push_tx.send(frame.to_string()));
    }

    fn drop_connections(&self) {
        drop(self.kill_tx.send(()));
    }

    /// Next command with the given method, skipping others.
    async fn next_command(&mut self, method: &str) -> Value {
        timeout(WAIT, async {
            loop {
                let command = self.commands_rx.recv().await.unwrap();
                if command["method"] == method {
                    return command;
                }
            }
        })
        .await
        .unwrap()
    }
}

/// The broker's answer to one command. `ping` gets none.
fn reply_to(command: &Value, connection: u32) -> Option<Value> {
    let method = command["method"].as_str()?;
    let params = &command["params"];
    let target = json!({"namespace": params["namespace"], "channel": params["channel"]});

    let (error, body) = match method {
        "connect" => (Value::Null, json!(format!("client-{connection}"))),
        "subscribe" if params["channel"] == "forbidden" => (json!("permission denied"), target),
        "subscribe" | "unsubscribe" => (Value::Null, target),
        "publish" => {
            let mut body = target;
            body["status"] = json!(true);
            (Value::Null, body)
        }
        "presence" => {
            let mut body = target;
            body["data"] = json!({"client-1": {"user": "u", "client": "client-1"}});
            (Value::Null, body)
        }
        "history" => {
            let mut body = target;
            body["data"] = json!([{"data": "earlier"}]);
            (Value::Null, body)
        }
        _ => return None,
    };

    Some(json!({"uid": command["uid"], "method": method, "error": error, "body": body}))
}

async fn connected_client(broker: &mut MockBroker, ws_config: WsConfig) -> Client {
    let client = Client::with_config(broker.config(), ws_config);
    client.connect().await.unwrap();
    timeout(WAIT, client.wait_connected()).await.unwrap().unwrap();
    broker.next_command("connect").await;
    client
}

mod connection {
    use super::*;

    #[tokio::test]
    async fn handshake_assigns_client_id() {
        let mut broker = MockBroker::start().await;
        let client = Client::new(broker.config());
        assert_eq!(client.status(), Status::Disconnected);

        client.connect().await.unwrap();
        timeout(WAIT, client.wait_connected()).await.unwrap().unwrap();

        let handshake = broker.next_command("connect").await;
        assert_eq!(handshake["params"]["token"], "t");
        assert_eq!(handshake["params"]["user"], "u");
        assert_eq!(client.status(), Status::Connected);
        assert_eq!(client.client_id().await.unwrap().as_deref(), Some("client-1"));
    }

    #[tokio::test]
    async fn unreachable_broker_exhausts_retries() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = Config::builder()
            .url(format!("ws://{addr}"))
            .token("t")
            .project("p")
            .user("u")
            .reconnect(ReconnectPolicy::fixed(Duration::from_millis(20)).with_max_attempts(2))
            .build()
            .unwrap();
        let client = Client::new(config);
        let mut status_rx = client.status_receiver();

        client.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(*status_rx.borrow_and_update(), Status::Disconnected);
        assert!(
            client
                .subscribe("a")
                .await
                .is_err_and(|error| error.kind() == Kind::IllegalState)
        );
    }

    #[tokio::test]
    async fn disconnect_stops_for_good() {
        let mut broker = MockBroker::start().await;
        let client = connected_client(&mut broker, WsConfig::default()).await;
        client.subscribe("a").await.unwrap();

        client.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(client.status(), Status::Disconnected);
        assert_eq!(client.subscription_count().await.unwrap(), 0);
        assert!(broker.commands_rx.try_recv().is_ok_and(|c| c["method"] == "subscribe"));
        assert!(broker.commands_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconnect_replays_subscriptions() {
        let mut broker = MockBroker::start().await;
        let client = connected_client(&mut broker, WsConfig::default()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        client
            .subscribe_with("news:sport", move |message: &Value| {
                drop(tx.send(message.clone()));
            })
            .await
            .unwrap();
        client.subscribe("gone").await.unwrap();
        client.unsubscribe("gone").await.unwrap();
        broker.next_command("subscribe").await;
        broker.next_command("unsubscribe").await;

        broker.drop_connections();

        let handshake = broker.next_command("connect").await;
        let replay = broker.next_command("subscribe").await;
        assert!(handshake["uid"].as_str().unwrap().parse::<u64>().unwrap() > 3);
        assert_eq!(replay["params"], json!({"namespace": "news", "channel": "sport"}));
        assert!(broker.commands_rx.try_recv().is_err());

        timeout(WAIT, client.wait_connected()).await.unwrap().unwrap();
        assert_eq!(client.client_id().await.unwrap().as_deref(), Some("client-2"));

        broker.push(&json!({
            "method": "message",
            "error": null,
            "body": {"namespace": "news", "channel": "sport", "data": {"goal": 1}}
        }));
        let message = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(message["data"], json!({"goal": 1}));
    }
}

mod channels {
    use super::*;

    #[tokio::test]
    async fn message_reaches_subscriber() {
        let mut broker = MockBroker::start().await;
        let client = connected_client(&mut broker, WsConfig::default()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = client
            .subscribe_with("news:sport", move |message: &Value| {
                drop(tx.send(message.clone()));
            })
            .await
            .unwrap();
        assert_eq!(handle.path(), "news:sport");

        let subscribe = broker.next_command("subscribe").await;
        assert_eq!(subscribe["clientId"], "client-1");

        broker.push(&json!({
            "method": "message",
            "error": null,
            "body": {"namespace": "news", "channel": "other", "data": 0}
        }));
        broker.push(&json!({
            "method": "message",
            "error": null,
            "body": {"namespace": "news", "channel": "sport", "data": 1}
        }));

        let message = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(message["data"], 1);
        assert!(handle.is_subscribed().await.unwrap());
    }

    #[tokio::test]
    async fn publish_presence_history_return_replies() {
        let mut broker = MockBroker::start().await;
        let client = connected_client(&mut broker, WsConfig::default()).await;
        let handle = client.subscribe("chat").await.unwrap();

        let published = handle.publish(json!({"text": "hi"})).await.unwrap().unwrap();
        assert_eq!(published["status"], true);

        let presence = handle.presence().await.unwrap().unwrap();
        assert_eq!(presence["data"]["client-1"]["user"], "u");

        let history = handle.history().await.unwrap().unwrap();
        assert_eq!(history["data"][0]["data"], "earlier");

        let publish = broker.next_command("publish").await;
        assert_eq!(publish["params"]["data"], json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn operations_without_subscription_fail_locally() {
        let mut broker = MockBroker::start().await;
        let client = connected_client(&mut broker, WsConfig::default()).await;

        let error = client.publish("nowhere", json!(1)).await.unwrap_err();
        assert_eq!(error.kind(), Kind::NotSubscribed);

        let error = client.subscribe("bad path").await.unwrap_err();
        assert_eq!(error.kind(), Kind::InvalidPath);
    }

    #[tokio::test]
    async fn subscribe_error_is_emitted_on_the_channel() {
        let mut broker = MockBroker::start().await;
        let client = connected_client(&mut broker, WsConfig::default()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session_tx = tx.clone();
        client
            .on(events::ERROR, move |error: &Value| {
                drop(session_tx.send(("session", error.clone())));
            })
            .await
            .unwrap();

        client.start_batching().await.unwrap();
        let handle = client.subscribe("forbidden").await.unwrap();
        handle
            .on(events::SUBSCRIBE_ERROR, move |error: &Value| {
                drop(tx.send(("channel", error.clone())));
            })
            .await
            .unwrap();
        client.stop_batching(true).await.unwrap();

        let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, ("session", json!("permission denied")));
        assert_eq!(second, ("channel", json!("permission denied")));
        assert!(!handle.is_subscribed().await.unwrap());
    }

    #[tokio::test]
    async fn heartbeat_sends_ping() {
        let mut broker = MockBroker::start().await;
        let ws_config =
            WsConfig::default().with_heartbeat_interval(Some(Duration::from_millis(50)));
        let _client = connected_client(&mut broker, ws_config).await;

        let ping = broker.next_command("ping").await;
        assert_eq!(ping["params"], json!({}));
        assert_eq!(ping["clientId"], "client-1");
    }
}
