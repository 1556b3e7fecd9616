//! `mira endpoint` — Print the derived event stream URL.

use clap::Args;
use mira_common::config::MiraConfig;
use mira_stream::endpoint::events_url;

/// Arguments for the `endpoint` command.
#[derive(Args, Debug)]
pub struct EndpointArgs {}

/// Executes the `endpoint` command.
///
/// # Errors
///
/// Returns an error if the configured API base URL cannot be turned into a
/// WebSocket URL.
pub fn execute(_args: &EndpointArgs, config: &MiraConfig) -> anyhow::Result<()> {
    let url = events_url(&config.api_base_url)?;
    println!("{url}");
    Ok(())
}
