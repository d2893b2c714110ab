#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::sync::{Arc, Mutex};

use centrifuge_client::config::ReconnectPolicy;
use centrifuge_client::transport::Transport;
use centrifuge_client::{Config, Session};
use serde_json::Value;
use url::Url;

pub const URL: &str = "ws://h/c";
pub const TOKEN: &str = "t";
pub const PROJECT: &str = "p";
pub const USER: &str = "u";
pub const TIMESTAMP: &str = "1700000000";

/// Transport double recording every request the session makes.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub opened: Vec<String>,
    pub sent: Vec<String>,
    pub closed: usize,
}

impl RecordingTransport {
    /// Sent frames parsed as JSON.
    #[must_use]
    pub fn frames(&self) -> Vec<Value> {
        self.sent
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    /// Sent frames with the given method, unwrapping batch frames.
    #[must_use]
    pub fn commands(&self, method: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .flat_map(|frame| match frame {
                Value::Array(batch) => batch,
                single => vec![single],
            })
            .filter(|command| command["method"] == method)
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn open(&mut self, url: &Url) {
        self.opened.push(url.to_string());
    }

    fn send(&mut self, frame: String) {
        self.sent.push(frame);
    }

    fn close(&mut self) {
        self.closed += 1;
    }
}

pub type TestSession = Session<RecordingTransport>;

#[must_use]
pub fn config() -> Config {
    Config::builder()
        .url(URL)
        .token(TOKEN)
        .project(PROJECT)
        .user(USER)
        .timestamp(TIMESTAMP)
        .build()
        .unwrap()
}

#[must_use]
pub fn config_with_policy(policy: ReconnectPolicy) -> Config {
    Config::builder()
        .url(URL)
        .token(TOKEN)
        .project(PROJECT)
        .user(USER)
        .timestamp(TIMESTAMP)
        .reconnect(policy)
        .build()
        .unwrap()
}

/// A session whose transport is open and whose handshake the broker accepted.
/// The handshake frame is cleared from the transport.
#[must_use]
pub fn connected(config: Config) -> TestSession {
    let mut session = Session::new(config, RecordingTransport::default());
    session.connect();
    session.handle_open().unwrap();
    let uid = session.transport().frames()[0]["uid"].as_str().unwrap().to_owned();
    session
        .handle_frame(format!(
            r#"{{"uid":"{uid}","method":"connect","error":null,"body":"client-1"}}"#
        ))
        .unwrap();
    session.transport_mut().sent.clear();
    session
}

/// Collects event payloads as `"<label> <json>"` lines.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    #[must_use]
    pub fn recorder(&self, label: &'static str) -> impl FnMut(&Value) + Send + 'static {
        let log = Arc::clone(&self.0);
        move |payload: &Value| log.lock().unwrap().push(format!("{label} {payload}"))
    }

    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}
