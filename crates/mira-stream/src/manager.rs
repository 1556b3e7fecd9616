//! Event stream connection state machine.
//!
//! ```text
//! Idle ──start──▶ Connecting ──ok──▶ Open ──close/error──▶ Closed / Failed
//!                     ▲  │ error                                  │
//!                     │  ▼                                        │
//!                     └─ Failed ◀──────── backoff delay ◀─────────┘
//! ```
//!
//! One spawned task owns the lifecycle between [`ConnectionManager::start`]
//! and [`ConnectionManager::stop`]. Each inbound frame is decoded and handed
//! to the handler inline, so frames are processed strictly one at a time and
//! in transport order.
//!
//! A connect attempt that outlasts the connect timeout counts as a failed
//! attempt. An open session that stays silent for one keepalive period is
//! pinged; if it is still silent one period after the ping, it is treated as
//! an abrupt close.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mira_common::config::StreamConfig;
use mira_common::error::TransportError;
use mira_common::types::ConnectionState;
use mira_events::decoder::decode;
use mira_events::pipeline::EventHandler;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::transport::{Transport, TransportSession};

/// Keeps one event stream session alive and feeds its events to a handler.
///
/// Dropping the manager cancels the session loop without waiting for it.
pub struct ConnectionManager<T: Transport, H: EventHandler + 'static> {
    transport: Arc<T>,
    url: String,
    handler: Arc<Mutex<H>>,
    backoff: Backoff,
    timeouts: Timeouts,
    state: Arc<watch::Sender<ConnectionState>>,
    lifecycle: Option<Lifecycle>,
}

/// Liveness limits for connect attempts and open sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Longest a connect attempt, handshake included, may take.
    pub connect: Duration,
    /// Silence after which an open session is pinged. `None` disables pings
    /// and the idle check.
    pub keepalive: Option<Duration>,
}

impl Timeouts {
    /// Creates connect and keepalive limits.
    #[must_use]
    pub const fn new(connect: Duration, keepalive: Option<Duration>) -> Self {
        Self { connect, keepalive }
    }

    /// Reads the limits from configuration.
    #[must_use]
    pub const fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.connect_timeout(), config.keepalive())
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

/// A running session loop.
struct Lifecycle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<T: Transport, H: EventHandler + 'static> ConnectionManager<T, H> {
    /// Creates an idle manager for the event stream at `url`.
    #[must_use]
    pub fn new(transport: T, url: impl Into<String>, handler: H) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            transport: Arc::new(transport),
            url: url.into(),
            handler: Arc::new(Mutex::new(handler)),
            backoff: Backoff::default(),
            timeouts: Timeouts::default(),
            state: Arc::new(state),
            lifecycle: None,
        }
    }

    /// Replaces the reconnect policy used by subsequent lifecycles.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces the connect timeout and keepalive used by subsequent
    /// lifecycles.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Returns the event stream URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Returns whether a session loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle
            .as_ref()
            .is_some_and(|lifecycle| !lifecycle.task.is_finished())
    }

    /// Runs `f` with exclusive access to the handler.
    ///
    /// Blocks the session loop for as long as `f` runs.
    pub fn with_handler<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut handler)
    }

    /// Starts connecting. Does nothing if a lifecycle is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            tracing::debug!(url = %self.url, "event stream already running");
            return;
        }

        let cancel = CancellationToken::new();
        let mut backoff = self.backoff.clone();
        backoff.reset();
        let session_loop = SessionLoop {
            transport: Arc::clone(&self.transport),
            url: self.url.clone(),
            handler: Arc::clone(&self.handler),
            backoff,
            timeouts: self.timeouts,
            state: Arc::clone(&self.state),
            cancel: cancel.clone(),
        };

        tracing::info!(url = %self.url, "starting event stream");
        session_loop.set_state(ConnectionState::Connecting);
        let task = tokio::spawn(session_loop.run());
        self.lifecycle = Some(Lifecycle { cancel, task });
    }

    /// Stops the stream and waits for the session to be released.
    ///
    /// Pending reconnects are cancelled and queued frames are discarded.
    /// Once this returns the handler is not called again until the next
    /// [`start`](Self::start).
    pub async fn stop(&mut self) {
        if let Some(lifecycle) = self.lifecycle.take() {
            lifecycle.cancel.cancel();
            if let Err(e) = lifecycle.task.await {
                tracing::warn!(error = %e, "event stream task ended abnormally");
            }
            tracing::info!(url = %self.url, "event stream stopped");
        }
        let _ = self.state.send_replace(ConnectionState::Closed);
    }
}

impl<T: Transport, H: EventHandler + 'static> Drop for ConnectionManager<T, H> {
    fn drop(&mut self) {
        if let Some(lifecycle) = &self.lifecycle {
            lifecycle.cancel.cancel();
        }
    }
}

/// How a session ended.
enum SessionEnd {
    /// `stop()` was called.
    Cancelled,
    /// The peer closed the session gracefully.
    Closed,
    /// The session broke.
    Failed(TransportError),
}

/// State owned by the spawned task for one lifecycle.
struct SessionLoop<T, H> {
    transport: Arc<T>,
    url: String,
    handler: Arc<Mutex<H>>,
    backoff: Backoff,
    timeouts: Timeouts,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
}

impl<T: Transport, H: EventHandler> SessionLoop<T, H> {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                result = self.connect() => result,
            };

            match connected {
                Ok(mut session) => {
                    self.set_state(ConnectionState::Open);
                    self.backoff.reset();
                    tracing::info!(url = %self.url, "event stream connected");

                    let end = self.pump(&mut session).await;
                    session.close().await;
                    match end {
                        SessionEnd::Cancelled => return,
                        SessionEnd::Closed => {
                            tracing::info!(url = %self.url, "event stream closed by peer");
                            self.set_state(ConnectionState::Closed);
                        }
                        SessionEnd::Failed(e) => {
                            tracing::warn!(url = %self.url, error = %e, "event stream failed");
                            self.set_state(ConnectionState::Failed);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "event stream connect failed");
                    self.set_state(ConnectionState::Failed);
                }
            }

            let delay = self.backoff.next_delay();
            tracing::info!(
                url = %self.url,
                attempt = self.backoff.attempt(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "scheduling reconnect"
            );
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect(&self) -> Result<T::Session, TransportError> {
        let limit = self.timeouts.connect;
        tokio::time::timeout(limit, self.transport.connect(&self.url))
            .await
            .unwrap_or_else(|_| {
                Err(TransportError::Connect {
                    url: self.url.clone(),
                    message: format!("timed out after {limit:?}"),
                })
            })
    }

    /// Reads frames until the session ends or the lifecycle is cancelled.
    async fn pump(&self, session: &mut T::Session) -> SessionEnd {
        let mut ping_sent: Option<Instant> = None;
        loop {
            let last_seen = session.last_seen();
            if ping_sent.is_some_and(|sent| last_seen >= sent) {
                ping_sent = None;
            }
            let deadline = self
                .timeouts
                .keepalive
                .and_then(|period| ping_sent.unwrap_or(last_seen).checked_add(period));

            let frame = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return SessionEnd::Cancelled,
                frame = session.next_frame() => frame,
                () = sleep_until(deadline) => {
                    // Pongs and other control frames are consumed inside
                    // `next_frame` and only show up in `last_seen`.
                    if session.last_seen() > last_seen {
                        continue;
                    }
                    if ping_sent.is_some() {
                        return SessionEnd::Failed(TransportError::AbruptClose {
                            message: "no traffic after keepalive ping".to_string(),
                        });
                    }
                    tracing::debug!(url = %self.url, "event stream idle, sending ping");
                    if let Err(e) = session.ping().await {
                        return SessionEnd::Failed(e);
                    }
                    ping_sent = Some(Instant::now());
                    continue;
                }
            };
            match frame {
                Ok(Some(text)) => {
                    if self.cancel.is_cancelled() {
                        return SessionEnd::Cancelled;
                    }
                    self.dispatch(&text);
                }
                Ok(None) => return SessionEnd::Closed,
                Err(e) => return SessionEnd::Failed(e),
            }
        }
    }

    fn dispatch(&self, raw: &str) {
        match decode(raw) {
            Ok(event) => {
                tracing::debug!(
                    container = %event.container_id,
                    kind = %event.kind,
                    status = %event.status,
                    "event received"
                );
                let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
                handler.handle(event);
            }
            Err(e) => tracing::warn!(error = %e, "dropping undecodable frame"),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "connection state changed");
        }
    }
}

/// Sleeps until `deadline`, or forever without one.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
