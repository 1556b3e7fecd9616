//! Delivery seam between the event core and whatever announces events.

use std::fmt;

use chrono::{DateTime, Utc};
use mira_common::config::VoiceConfig;
use mira_common::types::{ContainerId, EventKind};
use serde::Serialize;

/// How a notification should be spoken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceHints {
    /// BCP 47 language tag.
    pub lang: String,
    /// Speech rate, 1.0 is normal.
    pub rate: f32,
    /// Speech pitch, 1.0 is normal.
    pub pitch: f32,
}

impl From<&VoiceConfig> for VoiceHints {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            lang: config.lang.clone(),
            rate: config.rate,
            pitch: config.pitch,
        }
    }
}

impl Default for VoiceHints {
    fn default() -> Self {
        Self::from(&VoiceConfig::default())
    }
}

/// A delivery-ready message derived from one container event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Sentence to show or speak.
    pub text: String,
    /// Container the notification is about.
    pub container_id: ContainerId,
    /// Kind of the originating event.
    pub kind: EventKind,
    /// Backend timestamp of the originating event, if it could be parsed.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Voice settings for speech sinks.
    pub voice: VoiceHints,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Consumer of synthesized notifications.
///
/// The pipeline calls [`deliver`](Self::deliver) at most once per emitted
/// event and never retries; a sink that needs idempotence provides it.
pub trait DeliverySink: Send {
    /// Hands one notification to the sink.
    fn deliver(&mut self, notification: &Notification);

    /// Returns whether the sink can currently deliver anything.
    ///
    /// Events arriving while the sink is unavailable are dropped without
    /// being recorded for deduplication.
    fn is_available(&self) -> bool {
        true
    }
}

impl<S: DeliverySink + ?Sized> DeliverySink for Box<S> {
    fn deliver(&mut self, notification: &Notification) {
        (**self).deliver(notification);
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}
