//! Configuration model for the Mira event client.
//!
//! Every section has defaults, so a configuration file only needs the keys
//! it wants to change.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{MiraError, Result};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiraConfig {
    /// Base URL of the backend REST API; the event stream URL derives from it.
    pub api_base_url: String,
    /// Duplicate suppression settings.
    pub dedup: DedupConfig,
    /// Reconnect backoff settings.
    pub backoff: BackoffConfig,
    /// Connect timeout and keepalive settings.
    pub stream: StreamConfig,
    /// Voice hints attached to every notification.
    pub voice: VoiceConfig,
    /// Text-to-speech command used by the speech sink.
    pub speech: SpeechConfig,
}

impl Default for MiraConfig {
    fn default() -> Self {
        Self {
            api_base_url: constants::DEFAULT_API_BASE_URL.to_string(),
            dedup: DedupConfig::default(),
            backoff: BackoffConfig::default(),
            stream: StreamConfig::default(),
            voice: VoiceConfig::default(),
            speech: SpeechConfig::default(),
        }
    }
}

impl MiraConfig {
    /// Loads a configuration file and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| MiraError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns `MiraError::Config` naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(config_error("api_base_url must not be empty"));
        }
        if self.dedup.window_ms == 0 {
            return Err(config_error("dedup.window_ms must be positive"));
        }
        if self.dedup.gc_factor == 0 {
            return Err(config_error("dedup.gc_factor must be at least 1"));
        }
        if self.backoff.base_ms == 0 {
            return Err(config_error("backoff.base_ms must be positive"));
        }
        if self.backoff.base_ms > self.backoff.max_ms {
            return Err(config_error("backoff.base_ms must not exceed backoff.max_ms"));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(config_error("backoff.jitter must be within 0.0..=1.0"));
        }
        if self.stream.connect_timeout_ms == 0 {
            return Err(config_error("stream.connect_timeout_ms must be positive"));
        }
        if self.speech.program.trim().is_empty() {
            return Err(config_error("speech.program must not be empty"));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> MiraError {
    MiraError::Config {
        message: message.to_string(),
    }
}

/// Duplicate suppression settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Repeats of the same event within this many milliseconds are dropped.
    pub window_ms: u64,
    /// Entries older than `gc_factor` windows are evicted.
    pub gc_factor: u32,
}

impl DedupConfig {
    /// Returns the window as a duration.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_ms: constants::DEFAULT_DEDUP_WINDOW_MS,
            gc_factor: constants::DEFAULT_DEDUP_GC_FACTOR,
        }
    }
}

/// Reconnect backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry, in milliseconds.
    pub base_ms: u64,
    /// Upper bound for any retry delay, in milliseconds.
    pub max_ms: u64,
    /// Fraction (0.0 to 1.0) of each delay that jitter may add on top.
    pub jitter: f64,
}

impl BackoffConfig {
    /// Returns the base delay as a duration.
    #[must_use]
    pub const fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    /// Returns the maximum delay as a duration.
    #[must_use]
    pub const fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: constants::DEFAULT_BACKOFF_BASE_MS,
            max_ms: constants::DEFAULT_BACKOFF_MAX_MS,
            jitter: constants::DEFAULT_BACKOFF_JITTER,
        }
    }
}

/// Liveness settings for the event stream connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Connect attempts taking longer than this many milliseconds fail.
    pub connect_timeout_ms: u64,
    /// Milliseconds of silence before the stream is pinged; `0` disables
    /// keepalive.
    pub keepalive_ms: u64,
}

impl StreamConfig {
    /// Returns the connect timeout as a duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the keepalive period, or `None` when disabled.
    #[must_use]
    pub const fn keepalive(&self) -> Option<Duration> {
        if self.keepalive_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.keepalive_ms))
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: constants::DEFAULT_CONNECT_TIMEOUT_MS,
            keepalive_ms: constants::DEFAULT_KEEPALIVE_MS,
        }
    }
}

/// Voice hints for speech delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// BCP 47 language tag.
    pub lang: String,
    /// Speech rate, 1.0 is normal.
    pub rate: f32,
    /// Speech pitch, 1.0 is normal.
    pub pitch: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            lang: constants::DEFAULT_VOICE_LANG.to_string(),
            rate: constants::DEFAULT_VOICE_RATE,
            pitch: constants::DEFAULT_VOICE_PITCH,
        }
    }
}

/// External text-to-speech command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Program looked up on `PATH`.
    pub program: String,
    /// Arguments placed before the notification text.
    pub args: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            program: constants::DEFAULT_SPEECH_PROGRAM.to_string(),
            args: vec!["-v".to_string(), "en-us".to_string()],
        }
    }
}
