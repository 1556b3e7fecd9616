//! Domain primitive types used across the Mira workspace.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DISPLAY_ID_LENGTH;

/// Opaque identifier of a container as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first twelve characters of the id, the short form the
    /// backend uses when a container has no name.
    #[must_use]
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(DISPLAY_ID_LENGTH) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of container lifecycle transition carried by an event frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A container was created.
    Created,
    /// A container moved to a new status.
    StatusChanged,
    /// A container was removed.
    Removed,
}

impl EventKind {
    /// Parses the `type` field of an event frame.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "status_change" => Some(Self::StatusChanged),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }

    /// Returns the value used for this kind on the wire.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::StatusChanged => "status_change",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One decoded container lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEvent {
    /// What happened to the container.
    pub kind: EventKind,
    /// Container the event belongs to. Scopes every dedup decision.
    pub container_id: ContainerId,
    /// Display name; may be empty.
    pub name: String,
    /// Image reference, informational only.
    pub image: String,
    /// Status as reported by the backend, original casing.
    pub status: String,
    /// Raw backend action, kept for diagnostics.
    pub raw_status: Option<String>,
    /// Backend timestamp exactly as received.
    pub time: String,
    /// `time` parsed as UTC, when it is in a recognised format.
    /// Informational only; ordering and dedup never look at it.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl ContainerEvent {
    /// Name to show or speak for this container.
    ///
    /// Falls back to the short container id when the name is empty.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.container_id.short()
        } else {
            &self.name
        }
    }

    /// Status lower-cased for comparisons.
    #[must_use]
    pub fn status_key(&self) -> String {
        self.status.to_lowercase()
    }
}

/// State of the event stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not started yet.
    Idle,
    /// Dialing the event stream.
    Connecting,
    /// Session established and receiving frames.
    Open,
    /// Closed gracefully by the peer, or stopped by the owner.
    Closed,
    /// Dropped by a transport error; a retry is pending.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
