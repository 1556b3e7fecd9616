//! Transport abstraction for the event stream.
//!
//! A [`Transport`] dials the endpoint and yields a [`TransportSession`],
//! which hands out text frames until the peer closes or the link fails.
//! The connection manager is generic over the transport so the state
//! machine can be driven by scripted sessions in tests.

pub mod websocket;

use std::future::Future;

use mira_common::error::TransportError;
use tokio::time::Instant;

/// Dials the event stream.
pub trait Transport: Send + Sync + 'static {
    /// Live session type produced by a successful connect.
    type Session: TransportSession;

    /// Opens a new session to `url`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connect` if the session cannot be established.
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Session, TransportError>> + Send;
}

/// One live connection to the event stream.
pub trait TransportSession: Send + 'static {
    /// Waits for the next text frame.
    ///
    /// Returns `Ok(Some(text))` for a frame and `Ok(None)` once the peer has
    /// closed the session gracefully. Non-text frames are handled internally.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::AbruptClose` or `TransportError::Protocol`
    /// when the session breaks.
    fn next_frame(
        &mut self,
    ) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;

    /// Sends a ping to the peer.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the ping cannot be written.
    fn ping(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// When the session last received anything from the peer, including
    /// frames it handles internally such as pongs.
    fn last_seen(&self) -> Instant;

    /// Releases the session. Safe to call on an already closed session.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
