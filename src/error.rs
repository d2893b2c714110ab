use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use crate::session::Status;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Missing or malformed construction parameters. The object is unusable.
    Config,
    /// Malformed channel path
    InvalidPath,
    /// Operation attempted while the session is disconnected
    IllegalState,
    /// Operation on a channel with no live subscription
    NotSubscribed,
    /// Malformed wire frame
    Decode,
    /// Error related to the underlying transport
    Transport,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn config<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError {
            field,
            reason: reason.into(),
        }
        .into()
    }

    pub fn missing_field(field: &'static str) -> Self {
        Self::config(field, "missing required field")
    }

    pub fn invalid_path<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        InvalidPathError {
            path: path.into(),
            reason: reason.into(),
        }
        .into()
    }

    #[must_use]
    pub fn illegal_state(operation: &'static str, status: Status) -> Self {
        IllegalStateError { operation, status }.into()
    }

    pub fn not_subscribed<S: Into<String>>(channel: S) -> Self {
        NotSubscribedError {
            channel: channel.into(),
        }
        .into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// A construction parameter is missing or unusable.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration `{}`: {}", self.field, self.reason)
    }
}

impl StdError for ConfigError {}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct InvalidPathError {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for InvalidPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid channel path {:?}: {}", self.path, self.reason)
    }
}

impl StdError for InvalidPathError {}

#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct IllegalStateError {
    pub operation: &'static str,
    pub status: Status,
}

impl fmt::Display for IllegalStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal state: cannot {} while {}",
            self.operation, self.status
        )
    }
}

impl StdError for IllegalStateError {}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct NotSubscribedError {
    pub channel: String,
}

impl fmt::Display for NotSubscribedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no live subscription for channel {:?}", self.channel)
    }
}

impl StdError for NotSubscribedError {}

/// An incoming frame could not be decoded. Carries the offending payload.
#[non_exhaustive]
#[derive(Debug)]
pub struct DecodeError {
    pub payload: String,
    pub source: serde_json::Error,
}

impl DecodeError {
    #[must_use]
    pub fn new(bytes: &[u8], source: serde_json::Error) -> Self {
        Self {
            payload: String::from_utf8_lossy(bytes).into_owned(),
            source,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unable to decode frame {:?}: {}",
            self.payload, self.source
        )
    }
}

impl StdError for DecodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::with_source(Kind::Config, err)
    }
}

impl From<InvalidPathError> for Error {
    fn from(err: InvalidPathError) -> Self {
        Error::with_source(Kind::InvalidPath, err)
    }
}

impl From<IllegalStateError> for Error {
    fn from(err: IllegalStateError) -> Self {
        Error::with_source(Kind::IllegalState, err)
    }
}

impl From<NotSubscribedError> for Error {
    fn from(err: NotSubscribedError) -> Self {
        Error::with_source(Kind::NotSubscribed, err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::with_source(Kind::Decode, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::config("url", e.to_string())
    }
}
