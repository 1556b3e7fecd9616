//! `mira replay` — Run recorded event frames through the pipeline.
//!
//! Input is one JSON frame per line, as sent on the event stream. Blank
//! lines are ignored and undecodable lines are logged and skipped.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use clap::Args;
use mira_common::config::MiraConfig;
use mira_events::decoder::decode;
use mira_events::pipeline::{NotificationPipeline, Outcome};
use mira_events::sink::DeliverySink;

use crate::sinks::StdoutSink;

/// Arguments for the `replay` command.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// File with one frame per line (reads stdin when omitted).
    pub file: Option<PathBuf>,

    /// Use each frame's timestamp as its arrival time instead of the
    /// wall clock.
    #[arg(long)]
    pub event_time: bool,

    /// Print notifications as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Per-outcome counts of a replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Notifications handed to the sink.
    pub delivered: usize,
    /// Repeats dropped by the dedup window.
    pub suppressed: usize,
    /// Events with no matching rule.
    pub unmatched: usize,
    /// Events dropped because the sink was unavailable.
    pub unavailable: usize,
    /// Lines that failed to decode.
    pub rejected: usize,
}

impl ReplaySummary {
    const fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Delivered => self.delivered += 1,
            Outcome::Suppressed => self.suppressed += 1,
            Outcome::Unmatched => self.unmatched += 1,
            Outcome::SinkUnavailable => self.unavailable += 1,
        }
    }
}

/// Executes the `replay` command.
///
/// # Errors
///
/// Returns an error if the input cannot be opened or read.
pub fn execute(args: ReplayArgs, config: &MiraConfig) -> anyhow::Result<()> {
    let mut pipeline = NotificationPipeline::from_config(config, StdoutSink::new(args.json));
    let summary = match &args.file {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| anyhow::anyhow!("cannot open {}: {e}", path.display()))?;
            replay(BufReader::new(file), &mut pipeline, args.event_time)?
        }
        None => replay(io::stdin().lock(), &mut pipeline, args.event_time)?,
    };

    eprintln!(
        "{} delivered, {} suppressed, {} unmatched, {} dropped, {} rejected",
        summary.delivered,
        summary.suppressed,
        summary.unmatched,
        summary.unavailable,
        summary.rejected
    );
    Ok(())
}

/// Feeds every frame in `reader` through `pipeline`.
///
/// With `event_time`, arrival instants are spaced by the frames' own
/// timestamps. Frames that go back in time, or whose time could not be
/// parsed, arrive together with the latest frame seen so far.
///
/// # Errors
///
/// Returns an error if reading from `reader` fails.
pub fn replay<R: BufRead, S: DeliverySink>(
    mut reader: R,
    pipeline: &mut NotificationPipeline<S>,
    event_time: bool,
) -> anyhow::Result<ReplaySummary> {
    let origin = Instant::now();
    let mut first: Option<DateTime<Utc>> = None;
    let mut latest = Duration::ZERO;
    let mut summary = ReplaySummary::default();
    let mut buf = Vec::new();
    let mut number = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        number += 1;
        let Ok(line) = std::str::from_utf8(&buf) else {
            tracing::warn!(line = number, "skipping frame that is not valid UTF-8");
            summary.rejected += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        let event = match decode(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(line = number, error = %e, "skipping frame");
                summary.rejected += 1;
                continue;
            }
        };

        let now = if event_time {
            if let Some(at) = event.occurred_at {
                let start = *first.get_or_insert(at);
                let offset = (at - start).to_std().unwrap_or(Duration::ZERO);
                latest = latest.max(offset);
            }
            origin + latest
        } else {
            Instant::now()
        };
        summary.record(pipeline.process(&event, now));
    }

    Ok(summary)
}
