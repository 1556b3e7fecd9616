//! Duplicate event suppression.
//!
//! The backend often reports one logical transition several times in a row
//! (`kill` followed by `die` both map to `exited`, for instance). The window
//! lets the first report through and drops repeats that arrive within the
//! configured interval of the last emission of the same key.
//!
//! The window is anchored to the last *emission*: a suppressed repeat does
//! not extend it, so a steady stream of repeats is announced once per window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use mira_common::config::DedupConfig;
use mira_common::types::{ContainerEvent, ContainerId, EventKind};

/// Identity of a logical occurrence: container, kind, and lower-cased status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    container_id: ContainerId,
    kind: EventKind,
    status: String,
}

impl DedupKey {
    /// Derives the key of an event.
    #[must_use]
    pub fn from_event(event: &ContainerEvent) -> Self {
        Self {
            container_id: event.container_id.clone(),
            kind: event.kind,
            status: event.status_key(),
        }
    }
}

/// Per-key record of the last emission.
#[derive(Debug, Clone, Copy)]
struct DedupEntry {
    last_emitted_at: Instant,
}

/// Decides whether an event is new enough to be announced.
#[derive(Debug)]
pub struct DedupWindow {
    entries: HashMap<DedupKey, DedupEntry>,
    window: Duration,
    retention: Duration,
    last_gc: Option<Instant>,
}

impl DedupWindow {
    /// Creates a window of the given length.
    ///
    /// Entries are garbage collected once they are `gc_factor` windows old.
    #[must_use]
    pub fn new(window: Duration, gc_factor: u32) -> Self {
        Self {
            entries: HashMap::new(),
            window,
            retention: window.saturating_mul(gc_factor.max(1)),
            last_gc: None,
        }
    }

    /// Creates a window from configuration.
    #[must_use]
    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.window(), config.gc_factor)
    }

    /// Returns the suppression interval.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns the number of keys currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no key is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if the event should be delivered, recording the
    /// emission; returns `false` for a repeat inside the window and leaves
    /// the record untouched.
    pub fn should_emit(&mut self, event: &ContainerEvent, now: Instant) -> bool {
        self.collect_garbage(now);

        let key = DedupKey::from_event(event);
        if let Some(entry) = self.entries.get(&key) {
            let elapsed = now.saturating_duration_since(entry.last_emitted_at);
            if elapsed < self.window {
                tracing::debug!(
                    container = %event.container_id,
                    kind = %event.kind,
                    status = %event.status,
                    elapsed = ?elapsed,
                    "suppressing duplicate event"
                );
                return false;
            }
        }

        let _ = self.entries.insert(
            key,
            DedupEntry {
                last_emitted_at: now,
            },
        );
        true
    }

    /// Drops entries older than the retention period, at most once per
    /// retention period.
    fn collect_garbage(&mut self, now: Instant) {
        let due = self
            .last_gc
            .is_none_or(|last| now.saturating_duration_since(last) >= self.retention);
        if !due {
            return;
        }
        self.last_gc = Some(now);

        let before = self.entries.len();
        let retention = self.retention;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_emitted_at) < retention);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "dedup entries evicted");
        }
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::from_config(&DedupConfig::default())
    }
}
