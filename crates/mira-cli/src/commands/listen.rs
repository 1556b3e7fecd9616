//! `mira listen` — Announce container changes as they happen.

use std::sync::Arc;

use clap::{Args, ValueEnum};
use mira_common::config::MiraConfig;
use mira_events::pipeline::NotificationPipeline;
use mira_events::sink::DeliverySink;
use mira_stream::backoff::Backoff;
use mira_stream::endpoint::events_url;
use mira_stream::manager::{ConnectionManager, Timeouts};
use mira_stream::transport::websocket::WebSocketTransport;
use tokio::sync::Notify;

use crate::sinks::{CommandSink, LogSink, StdoutSink};

/// Where notifications are delivered.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Print to standard output.
    Stdout,
    /// Emit as log records.
    Log,
    /// Speak through the configured text-to-speech program.
    Speak,
}

/// Arguments for the `listen` command.
#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Delivery sink for notifications.
    #[arg(long, value_enum, default_value_t = SinkKind::Stdout)]
    pub sink: SinkKind,

    /// Print notifications as JSON (stdout sink only).
    #[arg(long)]
    pub json: bool,
}

/// Executes the `listen` command.
///
/// Runs until Ctrl+C, then stops the stream and waits for the session to
/// be released.
///
/// # Errors
///
/// Returns an error if the endpoint is invalid, the runtime cannot be
/// created, or the Ctrl+C handler cannot be installed.
pub fn execute(args: ListenArgs, config: &MiraConfig) -> anyhow::Result<()> {
    let url = events_url(&config.api_base_url)?;
    let sink = build_sink(&args, config);
    if !sink.is_available() {
        tracing::warn!(sink = ?args.sink, "sink unavailable, events will be dropped");
    }

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || signal.notify_one())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| anyhow::anyhow!("failed to start async runtime: {e}"))?;

    let pipeline = NotificationPipeline::from_config(config, sink);
    let backoff = Backoff::from_config(&config.backoff);
    let timeouts = Timeouts::from_config(&config.stream);
    runtime.block_on(async move {
        let mut manager = ConnectionManager::new(WebSocketTransport, url, pipeline)
            .with_backoff(backoff)
            .with_timeouts(timeouts);
        let reporter = tokio::spawn(report_states(manager.subscribe()));

        eprintln!("Listening on {} (Ctrl+C to stop)", manager.url());
        manager.start();
        shutdown.notified().await;

        eprintln!("Stopping...");
        manager.stop().await;
        drop(manager);
        if let Err(e) = reporter.await {
            tracing::warn!(error = %e, "state reporter ended abnormally");
        }
    });

    Ok(())
}

fn build_sink(args: &ListenArgs, config: &MiraConfig) -> Box<dyn DeliverySink> {
    match args.sink {
        SinkKind::Stdout => Box::new(StdoutSink::new(args.json)),
        SinkKind::Log => Box::new(LogSink),
        SinkKind::Speak => Box::new(CommandSink::from_config(&config.speech)),
    }
}

/// Logs every observed state change until the manager is dropped.
async fn report_states(
    mut states: tokio::sync::watch::Receiver<mira_common::types::ConnectionState>,
) {
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        tracing::info!(%state, "connection state changed");
    }
}
