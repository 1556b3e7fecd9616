//! Event stream endpoint derivation.

use mira_common::constants::EVENTS_STREAM_PATH;
use mira_common::error::TransportError;
use url::Url;

/// Derives the event stream URL from the REST API base URL.
///
/// Trailing slashes are dropped, `https` becomes `wss`, `http` becomes `ws`,
/// any other scheme is kept, and the event stream path is appended.
///
/// # Errors
///
/// Returns `TransportError::InvalidEndpoint` if the result is not a valid URL.
pub fn events_url(api_base: &str) -> Result<String, TransportError> {
    let base = api_base.trim().trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    let url = format!("{ws_base}{EVENTS_STREAM_PATH}");

    let _ = Url::parse(&url).map_err(|e| TransportError::InvalidEndpoint {
        url: url.clone(),
        message: e.to_string(),
    })?;
    tracing::debug!(api_base, url = %url, "derived event stream endpoint");
    Ok(url)
}
