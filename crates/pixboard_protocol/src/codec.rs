//! JSON framing helpers.

use crate::error::{ProtocolError, ProtocolResult};
use crate::events::AdminEvent;
use crate::messages::{ClientMessage, ServerMessage};
use std::time::{SystemTime, UNIX_EPOCH};

/// Largest client frame the server will parse.
pub const MAX_CLIENT_FRAME_LEN: usize = 4 * 1024;

/// Largest admin event line accepted from another process.
pub const MAX_EVENT_LINE_LEN: usize = 64 * 1024 * 1024;

/// Decodes a client frame.
///
/// # Errors
///
/// Returns an error if the frame is oversized or malformed.
pub fn decode_client(frame: &str) -> ProtocolResult<ClientMessage> {
    if frame.len() > MAX_CLIENT_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: frame.len(),
            max: MAX_CLIENT_FRAME_LEN,
        });
    }
    Ok(serde_json::from_str(frame)?)
}

/// Encodes a client frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_client(message: &ClientMessage) -> ProtocolResult<String> {
    Ok(serde_json::to_string(message)?)
}

/// Encodes a server frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_server(message: &ServerMessage) -> ProtocolResult<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decodes a server frame.
///
/// # Errors
///
/// Returns an error if the frame is malformed.
pub fn decode_server(frame: &str) -> ProtocolResult<ServerMessage> {
    Ok(serde_json::from_str(frame)?)
}

/// Encodes an admin event as a single JSON line (no trailing newline).
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_event(event: &AdminEvent) -> ProtocolResult<String> {
    Ok(serde_json::to_string(event)?)
}

/// Decodes an admin event line.
///
/// # Errors
///
/// Returns an error if the line is oversized or malformed.
pub fn decode_event(line: &str) -> ProtocolResult<AdminEvent> {
    if line.len() > MAX_EVENT_LINE_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: line.len(),
            max: MAX_EVENT_LINE_LEN,
        });
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Current time in milliseconds since the Unix epoch.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogoutEvent;

    #[test]
    fn oversized_client_frame_rejected() {
        let frame = format!(
            "{{\"type\":\"ping\",\"pad\":\"{}\"}}",
            "x".repeat(MAX_CLIENT_FRAME_LEN)
        );
        assert!(matches!(
            decode_client(&frame),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            decode_client("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_client("{\"type\":\"placePixel\",\"x\":\"a\"}"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn event_line_tolerates_newline() {
        let event = AdminEvent::Logout(LogoutEvent {
            user_id: "u".into(),
        });
        let line = format!("{}\n", encode_event(&event).unwrap());
        assert_eq!(decode_event(&line).unwrap(), event);
    }

    #[test]
    fn timestamps_are_recent() {
        // 2020-01-01 in milliseconds
        assert!(timestamp_ms() > 1_577_836_800_000);
    }
}
