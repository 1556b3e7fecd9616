//! # mira-events
//!
//! The synchronous half of the event core. Everything here is pure or
//! owns its state exclusively, so the connection manager can run it inline
//! for each inbound frame:
//!
//! - [`decoder`]: validates a raw frame into a [`ContainerEvent`](mira_common::types::ContainerEvent).
//! - [`dedup`]: suppresses repeats of the same logical event within a window.
//! - [`synthesizer`]: turns an event into a spoken-style [`Notification`](sink::Notification).
//! - [`sink`]: the delivery seam implemented by announcers.
//! - [`pipeline`]: wires dedup, synthesis, and delivery together.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod decoder;
pub mod dedup;
pub mod pipeline;
pub mod sink;
pub mod synthesizer;
