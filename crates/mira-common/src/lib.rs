//! # mira-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire Mira workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and provides the container event model that the decoder,
//! the connection manager, and the notification pipeline all agree on.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
