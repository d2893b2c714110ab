//! The byte-stream transport the session runs over.
//!
//! The session never performs I/O itself. It tells its [`Transport`] what to do and
//! is told, in turn, what happened through [`Session::handle_open`],
//! [`Session::handle_frame`] and [`Session::handle_close`].
//!
//! [`Session::handle_open`]: crate::Session::handle_open
//! [`Session::handle_frame`]: crate::Session::handle_frame
//! [`Session::handle_close`]: crate::Session::handle_close

use url::Url;

/// Outgoing half of a transport.
///
/// Implementations report the result of [`Transport::open`] asynchronously: either
/// `handle_open` once the socket is usable, or `handle_close` if it never becomes
/// usable. A transport torn down with [`Transport::close`] must not report a close
/// afterwards; the session has already accounted for it.
pub trait Transport {
    /// Start opening a new connection to `url`.
    fn open(&mut self, url: &Url);

    /// Write one text frame. Fire-and-forget: failures surface as a close.
    fn send(&mut self, frame: String);

    /// Tear the current connection down.
    fn close(&mut self);
}
