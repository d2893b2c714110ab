//! Session configuration.
//!
//! [`Config`] is built once with [`Config::builder`] and never mutated afterwards.

use std::time::Duration;

use backoff::backoff::Backoff as _;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::bon;
use secrecy::SecretString;
use url::Url;

use crate::Result;
use crate::error::Error;
use crate::path::PathFormat;

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(3000);
const DEFAULT_EXPONENTIAL_MULTIPLIER: f64 = 2.0;

/// Immutable session configuration.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    url: Url,
    token: SecretString,
    project: String,
    user: String,
    timestamp: Option<String>,
    info: Option<String>,
    reconnect: ReconnectPolicy,
    path_format: PathFormat,
    debug: bool,
}

#[bon]
impl Config {
    /// Validate and build a configuration.
    ///
    /// Mandatory fields are checked in the order `url`, `token`, `project`, `user`;
    /// the first missing one is named in the returned [`ConfigError`](crate::error::ConfigError).
    #[builder]
    pub fn new(
        #[builder(into)] url: Option<String>,
        #[builder(into)] token: Option<String>,
        #[builder(into)] project: Option<String>,
        #[builder(into)] user: Option<String>,
        // Timestamp the token was signed with. Defaults to the handshake time.
        #[builder(into)]
        timestamp: Option<String>,
        // JSON-encoded connection info forwarded to the broker.
        #[builder(into)]
        info: Option<String>,
        #[builder(default)] reconnect: ReconnectPolicy,
        #[builder(default)] path_format: PathFormat,
        #[builder(default)] debug: bool,
    ) -> Result<Self> {
        let url = non_empty(url).ok_or_else(|| Error::missing_field("url"))?;
        let token = non_empty(token).ok_or_else(|| Error::missing_field("token"))?;
        let project = non_empty(project).ok_or_else(|| Error::missing_field("project"))?;
        let user = non_empty(user).ok_or_else(|| Error::missing_field("user"))?;

        let url = Url::parse(url.trim_end_matches('/'))?;

        Ok(Self {
            url,
            token: SecretString::from(token),
            project,
            user,
            timestamp,
            info,
            reconnect,
            path_format,
            debug,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl Config {
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    #[must_use]
    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    #[must_use]
    pub fn reconnect(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    #[must_use]
    pub fn path_format(&self) -> &PathFormat {
        &self.path_format
    }

    /// Whether raw frames are logged.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// How the delay between reconnection attempts evolves.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectStrategy {
    /// Always wait the same interval.
    Fixed { interval: Duration },
    /// Start at `initial`, grow by `step` per attempt, never exceed `max`.
    Linear {
        initial: Duration,
        step: Duration,
        max: Duration,
    },
    /// Randomized exponential growth between `initial` and `max`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

/// Reconnection policy applied after the transport drops.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub strategy: ReconnectStrategy,
    /// Maximum number of consecutive attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_INTERVAL)
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            strategy: ReconnectStrategy::Fixed { interval },
            max_attempts: None,
        }
    }

    #[must_use]
    pub const fn linear(initial: Duration, step: Duration, max: Duration) -> Self {
        Self {
            strategy: ReconnectStrategy::Linear { initial, step, max },
            max_attempts: None,
        }
    }

    #[must_use]
    pub const fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            strategy: ReconnectStrategy::Exponential {
                initial,
                max,
                multiplier: DEFAULT_EXPONENTIAL_MULTIPLIER,
            },
            max_attempts: None,
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Create the mutable delay generator for this policy.
    #[must_use]
    pub fn backoff(&self) -> RetryBackoff {
        let exponential = match self.strategy {
            ReconnectStrategy::Exponential {
                initial,
                max,
                multiplier,
            } => Some(
                ExponentialBackoffBuilder::default()
                    .with_initial_interval(initial)
                    .with_max_interval(max)
                    .with_multiplier(multiplier)
                    .with_max_elapsed_time(None) // max attempts are handled separately
                    .build(),
            ),
            _ => None,
        };

        RetryBackoff {
            strategy: self.strategy.clone(),
            max_attempts: self.max_attempts,
            attempt: 0,
            exponential,
        }
    }
}

/// Delay generator produced by [`ReconnectPolicy::backoff`].
pub struct RetryBackoff {
    strategy: ReconnectStrategy,
    max_attempts: Option<u32>,
    attempt: u32,
    exponential: Option<ExponentialBackoff>,
}

impl RetryBackoff {
    /// Delay before the next attempt, or `None` once `max_attempts` is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts
            && self.attempt >= max
        {
            return None;
        }

        let previous = self.attempt;
        self.attempt = self.attempt.saturating_add(1);

        match &self.strategy {
            ReconnectStrategy::Fixed { interval } => Some(*interval),
            ReconnectStrategy::Linear { initial, step, max } => {
                Some(initial.saturating_add(step.saturating_mul(previous)).min(*max))
            }
            ReconnectStrategy::Exponential { max, .. } => self
                .exponential
                .as_mut()
                .and_then(|backoff| backoff.next_backoff())
                .map(|delay| delay.min(*max)),
        }
    }

    /// Forget previous attempts. Called after a successful handshake.
    pub fn reset(&mut self) {
        self.attempt = 0;
        if let Some(exponential) = self.exponential.as_mut() {
            exponential.reset();
        }
    }

    /// Number of attempts scheduled since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
