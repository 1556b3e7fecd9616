//! Event frame decoding.
//!
//! A frame is one JSON object per transport message:
//!
//! ```json
//! {"type":"status_change","id":"abc123","name":"web","image":"nginx",
//!  "status":"running","raw_status":"start","time":"2024-01-01T00:00:00Z"}
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use mira_common::error::DecodeError;
use mira_common::types::{ContainerEvent, ContainerId, EventKind};
use serde::Deserialize;

/// Wire shape of a frame. Every field is optional here so that absence can
/// be reported as `MissingField` instead of a generic parse failure.
#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<String>,
    name: Option<String>,
    image: Option<String>,
    status: Option<String>,
    raw_status: Option<String>,
    time: Option<String>,
}

/// Decodes one raw frame into a container event.
///
/// # Errors
///
/// - `DecodeError::Malformed` if the payload is not a JSON object or a field
///   has the wrong type.
/// - `DecodeError::MissingField` if `type`, `id`, `status`, or `time` is
///   absent or null, or `id` or `time` is empty.
///
/// A `time` value in an unrecognised format does not reject the frame: the
/// raw text is kept and `occurred_at` is left empty.
/// - `DecodeError::UnknownKind` if `type` is not a recognized event kind.
pub fn decode(raw: &str) -> Result<ContainerEvent, DecodeError> {
    let frame: WireFrame = serde_json::from_str(raw).map_err(|e| DecodeError::Malformed {
        reason: e.to_string(),
    })?;

    let kind_value = frame.kind.ok_or(DecodeError::MissingField { field: "type" })?;
    let id = frame
        .id
        .filter(|id| !id.is_empty())
        .ok_or(DecodeError::MissingField { field: "id" })?;
    let status = frame
        .status
        .ok_or(DecodeError::MissingField { field: "status" })?;
    let time = frame
        .time
        .filter(|time| !time.is_empty())
        .ok_or(DecodeError::MissingField { field: "time" })?;

    let kind = EventKind::from_wire(&kind_value)
        .ok_or(DecodeError::UnknownKind { kind: kind_value })?;
    let occurred_at = parse_timestamp(&time);

    Ok(ContainerEvent {
        kind,
        container_id: ContainerId::new(id),
        name: frame.name.unwrap_or_default(),
        image: frame.image.unwrap_or_default(),
        status,
        raw_status: frame.raw_status,
        time,
        occurred_at,
    })
}

/// Accepts RFC 3339 and offset-less ISO 8601 (read as UTC).
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    let parsed = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc());
    if parsed.is_none() {
        tracing::debug!(time = value, "unrecognised event time, keeping raw value");
    }
    parsed
}
