//! # mira-stream
//!
//! Keeps a container event stream connected and feeds decoded events to a
//! handler.
//!
//! - [`endpoint`]: derives the WebSocket URL from the REST API base URL.
//! - [`backoff`]: exponential reconnect delays with jitter.
//! - [`transport`]: the session seam and its WebSocket implementation.
//! - [`manager`]: the connection state machine.
//!
//! # Example
//!
//! ```rust,no_run
//! use mira_events::pipeline::NotificationPipeline;
//! use mira_events::sink::{DeliverySink, Notification};
//! use mira_stream::manager::ConnectionManager;
//! use mira_stream::transport::websocket::WebSocketTransport;
//!
//! struct Print;
//!
//! impl DeliverySink for Print {
//!     fn deliver(&mut self, notification: &Notification) {
//!         tracing::info!(text = %notification.text, "announce");
//!     }
//! }
//!
//! # async fn run() -> Result<(), mira_common::error::TransportError> {
//! let url = mira_stream::endpoint::events_url("http://localhost:8088/api/v1")?;
//! let mut manager =
//!     ConnectionManager::new(WebSocketTransport, url, NotificationPipeline::new(Print));
//! manager.start();
//! // ...
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backoff;
pub mod endpoint;
pub mod manager;
pub mod transport;
