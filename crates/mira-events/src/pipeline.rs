//! Per-event processing: dedup, synthesis, delivery.
//!
//! The pipeline is the handler the connection manager calls for every
//! decoded event. It runs to completion before the next frame is read,
//! which is what keeps the dedup table free of races.

use std::time::Instant;

use mira_common::config::MiraConfig;
use mira_common::types::ContainerEvent;

use crate::dedup::DedupWindow;
use crate::sink::{DeliverySink, VoiceHints};
use crate::synthesizer::Synthesizer;

/// Receiver of decoded container events.
pub trait EventHandler: Send {
    /// Handles one event. Must not block for long; it runs inline on the
    /// stream task.
    fn handle(&mut self, event: ContainerEvent);
}

impl<F> EventHandler for F
where
    F: FnMut(ContainerEvent) + Send,
{
    fn handle(&mut self, event: ContainerEvent) {
        self(event);
    }
}

/// What happened to an event handed to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The notification reached the sink.
    Delivered,
    /// A repeat within the dedup window.
    Suppressed,
    /// The sink could not accept anything.
    SinkUnavailable,
    /// No synthesis rule matched.
    Unmatched,
}

/// Dedup, synthesis, and delivery for a single sink.
#[derive(Debug)]
pub struct NotificationPipeline<S> {
    dedup: DedupWindow,
    synthesizer: Synthesizer,
    sink: S,
}

impl<S: DeliverySink> NotificationPipeline<S> {
    /// Creates a pipeline with default dedup and voice settings.
    #[must_use]
    pub fn new(sink: S) -> Self {
        Self {
            dedup: DedupWindow::default(),
            synthesizer: Synthesizer::default(),
            sink,
        }
    }

    /// Creates a pipeline from configuration.
    #[must_use]
    pub fn from_config(config: &MiraConfig, sink: S) -> Self {
        Self {
            dedup: DedupWindow::from_config(&config.dedup),
            synthesizer: Synthesizer::new(VoiceHints::from(&config.voice)),
            sink,
        }
    }

    /// Replaces the dedup window.
    #[must_use]
    pub fn with_dedup(mut self, dedup: DedupWindow) -> Self {
        self.dedup = dedup;
        self
    }

    /// Returns the sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Processes an event as if it arrived at `now`.
    pub fn process(&mut self, event: &ContainerEvent, now: Instant) -> Outcome {
        if !self.sink.is_available() {
            tracing::debug!(container = %event.container_id, "sink unavailable, dropping event");
            return Outcome::SinkUnavailable;
        }
        if !self.dedup.should_emit(event, now) {
            return Outcome::Suppressed;
        }
        let Some(notification) = self.synthesizer.synthesize(event) else {
            tracing::debug!(
                container = %event.container_id,
                kind = %event.kind,
                "no notification rule matched"
            );
            return Outcome::Unmatched;
        };

        tracing::info!(
            container = %event.container_id,
            kind = %event.kind,
            text = %notification.text,
            "delivering notification"
        );
        self.sink.deliver(&notification);
        Outcome::Delivered
    }
}

impl<S: DeliverySink> EventHandler for NotificationPipeline<S> {
    fn handle(&mut self, event: ContainerEvent) {
        let _ = self.process(&event, Instant::now());
    }
}
