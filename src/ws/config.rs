#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(25);
const DEFAULT_CONNECT_TIMEOUT_DURATION: Duration = Duration::from_secs(10);

/// Configuration for the WebSocket driver.
///
/// Protocol behaviour (credentials, reconnect policy, channel path format) lives in
/// [`crate::Config`]; this only covers what the socket task needs.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between `ping` commands while connected. `None` disables them.
    pub heartbeat_interval: Option<Duration>,
    /// How long a socket may take to open before the attempt counts as a close
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL_DURATION),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_DURATION,
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
