//! Event Codec
//!
//! Converts between [`Frame`]s and typed [`StreamEvent`]s. A frame whose
//! payload does not parse yields a [`CodecError`]; the caller decides whether
//! that ends the stream (it never should for a single bad event).

use serde::Serialize;

use crate::event::{
    ClosedEvent, ConnectedEvent, ErrorCode, EventEnvelope, EventId, HeartbeatEvent, PointEvent,
    StreamErrorEvent, StreamEvent, event_type,
};
use crate::frame::Frame;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("invalid `{event_type}` payload: {source}")]
    Json {
        /// Frame type whose payload failed.
        event_type: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Frame type this protocol does not define.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// Frame without an `event:` line.
    #[error("frame has no event type")]
    MissingEventType,
}

/// Decode a frame into a typed event.
///
/// # Errors
///
/// Returns an error for unknown or missing event types and for payloads
/// that do not match the event type's schema.
pub fn decode_frame(frame: &Frame) -> Result<EventEnvelope, CodecError> {
    let kind = frame.event.as_deref().ok_or(CodecError::MissingEventType)?;

    let event = match kind {
        event_type::POINT => StreamEvent::Point(parse::<PointEvent>(kind, &frame.data)?),
        event_type::HEARTBEAT => {
            StreamEvent::Heartbeat(parse::<HeartbeatEvent>(kind, &frame.data)?)
        }
        event_type::CONNECTED => {
            StreamEvent::Connected(parse::<ConnectedEvent>(kind, &frame.data)?)
        }
        event_type::ERROR => StreamEvent::Error(parse::<StreamErrorEvent>(kind, &frame.data)?),
        event_type::CLOSED => StreamEvent::Closed(parse::<ClosedEvent>(kind, &frame.data)?),
        other => return Err(CodecError::UnknownEventType(other.to_string())),
    };

    Ok(EventEnvelope {
        id: frame.id.as_deref().map(EventId::new),
        event,
    })
}

/// Encode a typed event as wire text.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized (non-finite floats).
pub fn encode_event(event: &StreamEvent, id: Option<&EventId>) -> Result<String, CodecError> {
    let kind = event.event_type();
    let data = match event {
        StreamEvent::Point(p) => to_json(kind, p)?,
        StreamEvent::Heartbeat(h) => to_json(kind, h)?,
        StreamEvent::Connected(c) => to_json(kind, c)?,
        StreamEvent::Error(e) => to_json(kind, e)?,
        StreamEvent::Closed(c) => to_json(kind, c)?,
    };

    let mut frame = Frame::new(kind, data);
    frame.id = id.map(|id| id.as_str().to_string());
    Ok(frame.encode())
}

/// Wire text for an id-less `error` frame.
#[must_use]
pub fn encode_error(code: &ErrorCode, message: &str) -> String {
    let data = serde_json::json!({ "code": code.as_str(), "message": message });
    Frame::new(event_type::ERROR, data.to_string()).encode()
}

fn parse<T: serde::de::DeserializeOwned>(kind: &str, data: &str) -> Result<T, CodecError> {
    serde_json::from_str(data).map_err(|source| CodecError::Json {
        event_type: kind.to_string(),
        source,
    })
}

fn to_json<T: Serialize>(kind: &str, value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|source| CodecError::Json {
        event_type: kind.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Decoded, FrameDecoder};

    fn point_json() -> &'static str {
        r#"{"device_id":"d1","user_id":"adar","lat":32.0777,"lon":34.7733,"recorded_at":"2024-01-01T10:00:00Z","server_timestamp_ms":1704103200000}"#
    }

    #[test]
    fn decodes_point_with_id() {
        let frame = Frame::new("point", point_json()).with_id("1704103200000-1");
        let envelope = decode_frame(&frame).unwrap();
        assert_eq!(envelope.id, Some(EventId::new("1704103200000-1")));
        let StreamEvent::Point(point) = envelope.event else {
            panic!("expected point");
        };
        assert_eq!(point.user_id, "adar");
        assert_eq!(point.lat, 32.0777);
    }

    #[test]
    fn decodes_heartbeat_with_defaults() {
        let envelope = decode_frame(&Frame::new("heartbeat", "{}")).unwrap();
        assert_eq!(
            envelope.event,
            StreamEvent::Heartbeat(HeartbeatEvent {
                active_devices: 0,
                server_timestamp_ms: 0,
            })
        );
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let err = decode_frame(&Frame::new("point", "{not json")).unwrap_err();
        assert!(matches!(err, CodecError::Json { ref event_type, .. } if event_type == "point"));
    }

    #[test]
    fn unknown_and_missing_types_are_errors() {
        assert!(matches!(
            decode_frame(&Frame::new("telemetry", "{}")),
            Err(CodecError::UnknownEventType(_))
        ));
        assert!(matches!(
            decode_frame(&Frame::default()),
            Err(CodecError::MissingEventType)
        ));
    }

    #[test]
    fn encoded_error_decodes_without_id() {
        let text = encode_error(&ErrorCode::UpstreamStatus, "502 Bad Gateway");
        let frames = FrameDecoder::new().push(text.as_bytes());
        let [Decoded::Frame(frame)] = frames.as_slice() else {
            panic!("expected one frame");
        };
        let envelope = decode_frame(frame).unwrap();
        assert!(envelope.id.is_none());
        assert_eq!(
            envelope.event,
            StreamEvent::Error(StreamErrorEvent::new(
                ErrorCode::UpstreamStatus,
                "502 Bad Gateway",
            ))
        );
    }

    #[test]
    fn encode_event_writes_id_last() {
        let event = StreamEvent::Closed(ClosedEvent {
            reason: "expired".into(),
        });
        let text = encode_event(&event, Some(&EventId::new("5"))).unwrap();
        assert_eq!(
            text,
            "event: closed\ndata: {\"reason\":\"expired\"}\nid: 5\n\n"
        );
    }
}
