//! Delivery sinks selectable from the command line.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use mira_common::config::SpeechConfig;
use mira_events::sink::{DeliverySink, Notification};

/// Prints each notification on its own line.
#[derive(Debug, Default)]
pub struct StdoutSink {
    json: bool,
}

impl StdoutSink {
    /// Creates a sink that prints plain text, or JSON objects when `json`
    /// is set.
    #[must_use]
    pub const fn new(json: bool) -> Self {
        Self { json }
    }

    /// Renders one output line.
    #[must_use]
    pub fn render(&self, notification: &Notification) -> String {
        if self.json {
            match serde_json::to_string(notification) {
                Ok(line) => return line,
                Err(e) => tracing::warn!(error = %e, "failed to serialize notification"),
            }
        }
        match notification.occurred_at {
            Some(at) => format!("[{}] {}", at.format("%H:%M:%S"), notification.text),
            None => notification.text.clone(),
        }
    }
}

impl DeliverySink for StdoutSink {
    fn deliver(&mut self, notification: &Notification) {
        println!("{}", self.render(notification));
    }
}

/// Emits each notification as an `info` log record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DeliverySink for LogSink {
    fn deliver(&mut self, notification: &Notification) {
        tracing::info!(
            target: "mira::announce",
            container = %notification.container_id.short(),
            kind = %notification.kind,
            lang = %notification.voice.lang,
            "{}",
            notification.text
        );
    }
}

/// Speaks notifications through an external text-to-speech program.
///
/// One process is spawned per notification and never awaited; exited
/// processes are reaped on later deliveries.
#[derive(Debug)]
pub struct CommandSink {
    program: Option<PathBuf>,
    args: Vec<String>,
    children: Vec<Child>,
}

impl CommandSink {
    /// Resolves the configured program on `PATH`.
    ///
    /// The sink reports itself unavailable when the program cannot be found.
    #[must_use]
    pub fn from_config(config: &SpeechConfig) -> Self {
        let program = match which::which(&config.program) {
            Ok(path) => {
                tracing::debug!(program = %path.display(), "speech program found");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(program = %config.program, error = %e, "speech program not found");
                None
            }
        };
        Self {
            program,
            args: config.args.clone(),
            children: Vec::new(),
        }
    }

    /// Number of spawned processes not yet reaped.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.children.len()
    }

    /// Drops handles of processes that have exited.
    pub fn reap(&mut self) {
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    tracing::debug!(pid = child.id(), %status, "speech process failed");
                }
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(pid = child.id(), error = %e, "failed to poll speech process");
                false
            }
        });
    }
}

impl DeliverySink for CommandSink {
    fn deliver(&mut self, notification: &Notification) {
        self.reap();
        let Some(program) = &self.program else {
            return;
        };
        let spawned = Command::new(program)
            .args(&self.args)
            .arg(&notification.text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => {
                self.children.push(child);
                tracing::debug!(pending = self.pending(), "speech process spawned");
            }
            Err(e) => tracing::warn!(program = %program.display(), error = %e, "failed to spawn speech process"),
        }
    }

    fn is_available(&self) -> bool {
        self.program.is_some()
    }
}
