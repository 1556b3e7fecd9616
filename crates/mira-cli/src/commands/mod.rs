//! CLI command definitions and dispatch.

pub mod endpoint;
pub mod listen;
pub mod replay;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use mira_common::config::MiraConfig;
use mira_common::constants;

/// Mira — speaks up when your containers change.
#[derive(Parser, Debug)]
#[command(name = "mira", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to a JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the backend API (overrides the configuration file).
    #[arg(long, global = true, env = constants::API_BASE_URL_ENV)]
    pub api_url: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to the event stream and announce container changes.
    Listen(listen::ListenArgs),
    /// Print the event stream URL derived from the API base URL.
    Endpoint(endpoint::EndpointArgs),
    /// Run recorded event frames through the notification pipeline.
    Replay(replay::ReplayArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.api_url.as_deref())?;
    match cli.command {
        Command::Listen(args) => listen::execute(args, &config),
        Command::Endpoint(args) => endpoint::execute(&args, &config),
        Command::Replay(args) => replay::execute(args, &config),
    }
}

/// Builds the effective configuration: file (or defaults), then overrides.
fn load_config(path: Option<&Path>, api_url: Option<&str>) -> anyhow::Result<MiraConfig> {
    let mut config = match path {
        Some(path) => MiraConfig::load(path)?,
        None => MiraConfig::default(),
    };
    if let Some(url) = api_url {
        url.clone_into(&mut config.api_base_url);
        config.validate()?;
    }
    tracing::debug!(api_base_url = %config.api_base_url, "configuration resolved");
    Ok(config)
}
