//! Channel paths.
//!
//! A channel path addresses a topic on the broker. It is either a bare channel
//! (`sport`) or a namespaced one (`news:sport`, or `news/sport` depending on the
//! deployed broker). Both segments use the alphabet `[A-Za-z0-9_@\-.]`.
//!
//! Parsing is the exact inverse of construction: for every path `p` accepted by
//! [`PathFormat::parse`], `format.make(parsed.namespace(), parsed.channel()) == p`.

use std::fmt;

use crate::Result;
use crate::error::Error;

/// Separator used by most broker revisions.
pub const DEFAULT_SEPARATOR: char = ':';

/// Returns `true` for characters allowed inside a namespace or channel segment.
#[must_use]
pub const fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '-' | '.')
}

fn validate_segment(path: &str, segment: &str, what: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::invalid_path(path, format!("empty {what}")));
    }
    if let Some(c) = segment.chars().find(|c| !is_segment_char(*c)) {
        return Err(Error::invalid_path(
            path,
            format!("illegal character {c:?} in {what}"),
        ));
    }
    Ok(())
}

/// Textual grammar of channel paths for one broker deployment.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathFormat {
    separator: char,
    namespace_optional: bool,
}

impl Default for PathFormat {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            namespace_optional: true,
        }
    }
}

impl PathFormat {
    /// Create a format with the given separator.
    ///
    /// Fails if `separator` could also appear inside a segment, since parsing would
    /// then be ambiguous.
    pub fn new(separator: char, namespace_optional: bool) -> Result<Self> {
        if is_segment_char(separator) || separator.is_whitespace() {
            return Err(Error::config(
                "path_format",
                format!("separator {separator:?} is not distinguishable from a channel character"),
            ));
        }

        Ok(Self {
            separator,
            namespace_optional,
        })
    }

    #[must_use]
    pub const fn separator(&self) -> char {
        self.separator
    }

    #[must_use]
    pub const fn namespace_optional(&self) -> bool {
        self.namespace_optional
    }

    /// Parse and validate a textual channel path.
    pub fn parse(&self, path: &str) -> Result<ChannelPath> {
        match path.split_once(self.separator) {
            Some((namespace, channel)) => {
                validate_segment(path, namespace, "namespace")?;
                validate_segment(path, channel, "channel")?;
                Ok(ChannelPath {
                    namespace: Some(namespace.to_owned()),
                    channel: channel.to_owned(),
                })
            }
            None if self.namespace_optional => {
                validate_segment(path, path, "channel")?;
                Ok(ChannelPath {
                    namespace: None,
                    channel: path.to_owned(),
                })
            }
            None => Err(Error::invalid_path(
                path,
                format!("namespace required (expected `namespace{}channel`)", self.separator),
            )),
        }
    }

    /// Build the textual path for a namespace/channel pair.
    pub fn make(&self, namespace: Option<&str>, channel: &str) -> Result<String> {
        let path = match namespace {
            Some(namespace) => format!("{namespace}{}{channel}", self.separator),
            None => channel.to_owned(),
        };

        // Validate through the parser so that `make` only ever produces parseable paths.
        self.parse(&path)?;
        Ok(path)
    }

    /// Render an already-validated path.
    #[must_use]
    pub fn display<'p>(&self, path: &'p ChannelPath) -> DisplayPath<'p> {
        DisplayPath {
            path,
            separator: self.separator,
        }
    }
}

/// A parsed channel path. Used as the subscription registry key.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelPath {
    namespace: Option<String>,
    channel: String,
}

impl ChannelPath {
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Reconstruct the path a broker response refers to.
    ///
    /// Responses carry either explicit `namespace`/`channel` fields or the whole
    /// path in `channel`. No validation happens here: the result is only used as a
    /// lookup key, and a key that was never registered simply matches nothing.
    #[must_use]
    pub fn from_wire(namespace: Option<&str>, channel: &str, format: &PathFormat) -> Self {
        match namespace {
            Some(namespace) => Self {
                namespace: Some(namespace.to_owned()),
                channel: channel.to_owned(),
            },
            None => format.parse(channel).unwrap_or_else(|_| Self {
                namespace: None,
                channel: channel.to_owned(),
            }),
        }
    }
}

/// [`fmt::Display`] adapter pairing a path with its separator.
#[derive(Debug, Clone, Copy)]
pub struct DisplayPath<'p> {
    path: &'p ChannelPath,
    separator: char,
}

impl fmt::Display for DisplayPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path.namespace {
            Some(namespace) => write!(f, "{namespace}{}{}", self.separator, self.path.channel),
            None => f.write_str(&self.path.channel),
        }
    }
}
