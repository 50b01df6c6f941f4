use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// A chat line sent by a participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextMessage {
    /// Client-asserted display name of the sender.
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Announcement that the shared photo changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhotoSelect {
    pub author: String,
    /// Absolute URL of the selected photo.
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// One message unit exchanged over the session socket, one JSON object per
/// text frame, discriminated by the `type` field (protocol `vitrine/1`).
///
/// A well-formed object with an unrecognized `type` decodes to
/// [`Envelope::Other`] so newer peers can introduce message kinds without
/// breaking older ones.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Text(TextMessage),
    PhotoSelect(PhotoSelect),
    /// Unrecognized `type`, carried unmodified.
    Other(Value),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedRef<'a> {
    Text(&'a TextMessage),
    PhotoSelect(&'a PhotoSelect),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Tagged {
    Text(TextMessage),
    PhotoSelect(PhotoSelect),
}

impl Envelope {
    /// Build a `text` envelope stamped with the current wall-clock time.
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Envelope::Text(TextMessage {
            author: author.into(),
            text: text.into(),
            timestamp: Utc::now(),
        })
    }

    /// Build a `photo_select` envelope stamped with the current wall-clock time.
    pub fn photo_select(author: impl Into<String>, url: impl Into<String>) -> Self {
        Envelope::PhotoSelect(PhotoSelect {
            author: author.into(),
            url: url.into(),
            timestamp: Utc::now(),
        })
    }

    /// Serialize to a single JSON text frame.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        let frame = match self {
            Envelope::Text(msg) => serde_json::to_string(&TaggedRef::Text(msg))?,
            Envelope::PhotoSelect(sel) => serde_json::to_string(&TaggedRef::PhotoSelect(sel))?,
            Envelope::Other(value) => serde_json::to_string(value)?,
        };
        Ok(frame)
    }

    /// Parse a single text frame.
    ///
    /// Malformed JSON, a missing `type` tag, and a recognized tag with
    /// missing or ill-typed fields are all errors; the caller decides
    /// whether to drop the frame. An unknown tag on a well-formed object is
    /// not an error.
    pub fn from_frame(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        match tag {
            "text" | "photo_select" => Ok(match serde_json::from_value::<Tagged>(value)? {
                Tagged::Text(msg) => Envelope::Text(msg),
                Tagged::PhotoSelect(sel) => Envelope::PhotoSelect(sel),
            }),
            _ => Ok(Envelope::Other(value)),
        }
    }

    /// The sender's display name, when the frame carries one.
    pub fn author(&self) -> Option<&str> {
        match self {
            Envelope::Text(msg) => Some(&msg.author),
            Envelope::PhotoSelect(sel) => Some(&sel.author),
            Envelope::Other(value) => value.get("author").and_then(Value::as_str),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frame_roundtrip() {
        let env = Envelope::text("ana", "hello everyone");
        let frame = env.to_frame().unwrap();
        let restored = Envelope::from_frame(&frame).unwrap();
        assert_eq!(env, restored);
    }

    #[test]
    fn test_photo_select_frame_roundtrip() {
        let env = Envelope::photo_select("ana", "http://localhost:8080/photos/a.jpg");
        let frame = env.to_frame().unwrap();
        let restored = Envelope::from_frame(&frame).unwrap();
        assert_eq!(env, restored);
    }

    #[test]
    fn test_encoded_frame_carries_type_tag() {
        let frame = Envelope::text("ana", "hi").to_frame().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["author"], "ana");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_decodes_wire_text_frame() {
        let raw = r#"{"type":"text","author":"bo","text":"hi","timestamp":"2026-01-05T10:30:00.000Z"}"#;
        match Envelope::from_frame(raw).unwrap() {
            Envelope::Text(msg) => {
                assert_eq!(msg.author, "bo");
                assert_eq!(msg.text, "hi");
                assert_eq!(msg.timestamp.to_rfc3339(), "2026-01-05T10:30:00+00:00");
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_decodes_wire_photo_select_frame() {
        let raw = r#"{"type":"photo_select","author":"bo","url":"http://h/photos/x.jpg","timestamp":"2026-01-05T10:30:00Z"}"#;
        match Envelope::from_frame(raw).unwrap() {
            Envelope::PhotoSelect(sel) => assert_eq!(sel.url, "http://h/photos/x.jpg"),
            other => panic!("expected photo_select, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_passes_through_unmodified() {
        let raw = r#"{"type":"reaction","author":"bo","emoji":"+1"}"#;
        let env = Envelope::from_frame(raw).unwrap();
        let Envelope::Other(value) = &env else {
            panic!("expected passthrough, got {env:?}");
        };
        assert_eq!(value["emoji"], "+1");
        assert_eq!(env.author(), Some("bo"));

        // Re-encoding keeps every field.
        let reencoded: Value = serde_json::from_str(&env.to_frame().unwrap()).unwrap();
        assert_eq!(reencoded["type"], "reaction");
        assert_eq!(reencoded["emoji"], "+1");
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(Envelope::from_frame("not json at all").is_err());
        assert!(Envelope::from_frame("").is_err());
    }

    #[test]
    fn test_untagged_dialect_is_rejected() {
        // The flat {author, text, timestamp} dialect carries no `type`.
        let raw = r#"{"author":"bo","text":"hi","timestamp":"2026-01-05T10:30:00Z"}"#;
        assert!(matches!(
            Envelope::from_frame(raw),
            Err(ProtocolError::MissingType)
        ));
    }

    #[test]
    fn test_non_string_type_is_an_error() {
        assert!(Envelope::from_frame(r#"{"type":5}"#).is_err());
        assert!(Envelope::from_frame(r#"[1,2,3]"#).is_err());
    }

    #[test]
    fn test_recognized_type_with_missing_field_is_an_error() {
        let raw = r#"{"type":"text","author":"bo"}"#;
        assert!(Envelope::from_frame(raw).is_err());

        let raw = r#"{"type":"photo_select","author":"bo","timestamp":"2026-01-05T10:30:00Z"}"#;
        assert!(Envelope::from_frame(raw).is_err());
    }

    #[test]
    fn test_ill_typed_field_is_an_error() {
        let raw = r#"{"type":"text","author":"bo","text":42,"timestamp":"2026-01-05T10:30:00Z"}"#;
        assert!(Envelope::from_frame(raw).is_err());
    }
}
