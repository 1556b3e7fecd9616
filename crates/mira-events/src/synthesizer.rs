//! Maps container events to announcement text.

use mira_common::types::{ContainerEvent, EventKind};

use crate::sink::{Notification, VoiceHints};

/// Builds notifications with a fixed set of voice hints.
#[derive(Debug, Clone, Default)]
pub struct Synthesizer {
    voice: VoiceHints,
}

impl Synthesizer {
    /// Creates a synthesizer that attaches `voice` to every notification.
    #[must_use]
    pub const fn new(voice: VoiceHints) -> Self {
        Self { voice }
    }

    /// Turns an event into a notification.
    ///
    /// Rules, first match wins:
    ///
    /// 1. created: "New container {name} was created."
    /// 2. removed: "Container {name} was removed."
    /// 3. status `running`: "Container {name} is now running."
    /// 4. status `exited`: "Container {name} has stopped."
    /// 5. status `paused`: "Container {name} is paused."
    /// 6. any other status: "Container {name} changed status to {status}."
    ///
    /// Returns `None` only if no rule applies.
    #[must_use]
    pub fn synthesize(&self, event: &ContainerEvent) -> Option<Notification> {
        let text = message_for(event)?;
        Some(Notification {
            text,
            container_id: event.container_id.clone(),
            kind: event.kind,
            occurred_at: event.occurred_at,
            voice: self.voice.clone(),
        })
    }
}

/// Synthesizes a notification with the default voice hints.
#[must_use]
pub fn synthesize(event: &ContainerEvent) -> Option<Notification> {
    Synthesizer::default().synthesize(event)
}

#[allow(clippy::unnecessary_wraps)]
fn message_for(event: &ContainerEvent) -> Option<String> {
    let name = event.display_name();
    let text = match event.kind {
        EventKind::Created => format!("New container {name} was created."),
        EventKind::Removed => format!("Container {name} was removed."),
        EventKind::StatusChanged => match event.status_key().as_str() {
            "running" => format!("Container {name} is now running."),
            "exited" => format!("Container {name} has stopped."),
            "paused" => format!("Container {name} is paused."),
            _ => format!("Container {name} changed status to {}.", event.status),
        },
    };
    Some(text)
}
