//! System-wide constants and defaults.

/// REST API base URL used when neither configuration nor environment set one.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8088/api/v1";

/// Environment variable that overrides the REST API base URL.
pub const API_BASE_URL_ENV: &str = "MIRA_API_BASE_URL";

/// Path appended to the WebSocket base URL to reach the event stream.
pub const EVENTS_STREAM_PATH: &str = "/events/stream";

/// Number of id characters shown when a container has no name.
pub const DISPLAY_ID_LENGTH: usize = 12;

/// Default deduplication window in milliseconds.
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 2_000;

/// Entries older than this many dedup windows are garbage collected.
pub const DEFAULT_DEDUP_GC_FACTOR: u32 = 30;

/// First reconnect delay in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// Upper bound for the reconnect delay in milliseconds.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Fraction of the nominal reconnect delay that jitter may add.
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.2;

/// Time allowed for a connect and handshake, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Silence on an open stream after which a ping is sent, in milliseconds.
/// The session is dropped if the silence lasts another period.
pub const DEFAULT_KEEPALIVE_MS: u64 = 30_000;

/// Language tag attached to synthesized notifications.
pub const DEFAULT_VOICE_LANG: &str = "en-US";

/// Speech rate attached to synthesized notifications.
pub const DEFAULT_VOICE_RATE: f32 = 1.0;

/// Speech pitch attached to synthesized notifications.
pub const DEFAULT_VOICE_PITCH: f32 = 1.0;

/// Text-to-speech program used by the speech sink.
pub const DEFAULT_SPEECH_PROGRAM: &str = "espeak";

/// Application name used in log output.
pub const APP_NAME: &str = "mira";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "mira";
