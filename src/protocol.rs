//! Wire envelope protocol for the streaming session
//!
//! Every frame exchanged with the server is one JSON envelope:
//!
//! ```json
//! { "mime_type": "text/plain", "data": "partial text" }
//! { "mime_type": "audio/pcm", "data": "<base64 PCM16>" }
//! { "turn_complete": true, "interrupted": false }
//! ```
//!
//! `data` is literal text for `text/plain` and base64 for `audio/pcm`.
//! Turn-boundary envelopes carry no `mime_type` and no renderable content.
//! No other module builds or parses wire frames directly.

use serde::{Deserialize, Serialize};

/// Mime type for streamed text deltas
pub const MIME_TEXT: &str = "text/plain";

/// Mime type for base64-encoded PCM16 audio chunks
pub const MIME_AUDIO_PCM: &str = "audio/pcm";

/// One wire-level message unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Payload kind; absent on turn-boundary envelopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Literal text or base64 audio, depending on `mime_type`
    #[serde(default)]
    pub data: String,

    /// End-of-turn marker; absence is equivalent to `false`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,

    /// Set by the server when generation was cut off mid-turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
}

/// Classified payload kind of a content envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    AudioPcm,
    /// Recognizable envelope with a mime type we don't render
    Other,
}

impl Envelope {
    /// Build an outbound text envelope
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            mime_type: Some(MIME_TEXT.to_string()),
            data: data.into(),
            turn_complete: None,
            interrupted: None,
        }
    }

    /// Build an outbound audio envelope from already-encoded base64 data
    pub fn audio_pcm(base64_data: impl Into<String>) -> Self {
        Self {
            mime_type: Some(MIME_AUDIO_PCM.to_string()),
            data: base64_data.into(),
            turn_complete: None,
            interrupted: None,
        }
    }

    /// Build a turn-boundary envelope (used by tests and simulators)
    pub fn turn_complete() -> Self {
        Self {
            mime_type: None,
            data: String::new(),
            turn_complete: Some(true),
            interrupted: None,
        }
    }

    /// True when this envelope closes the current turn.
    /// A boundary envelope carries no content regardless of its mime type.
    pub fn is_turn_boundary(&self) -> bool {
        self.turn_complete == Some(true)
    }

    /// Classify the payload by mime type
    pub fn kind(&self) -> PayloadKind {
        match self.mime_type.as_deref() {
            Some(MIME_TEXT) => PayloadKind::Text,
            Some(MIME_AUDIO_PCM) => PayloadKind::AudioPcm,
            _ => PayloadKind::Other,
        }
    }
}

/// Serialize an envelope into its wire frame
pub fn encode(envelope: &Envelope) -> Result<String, DecodeError> {
    serde_json::to_string(envelope).map_err(|e| DecodeError::Malformed(e.to_string()))
}

/// Parse and validate a wire frame.
///
/// Fails if the frame is not well-formed JSON, or if it carries neither a
/// mime type nor a turn-boundary marker (nothing to dispatch on).
pub fn decode(frame: &str) -> Result<Envelope, DecodeError> {
    let envelope: Envelope =
        serde_json::from_str(frame).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    if envelope.mime_type.is_none()
        && envelope.turn_complete.is_none()
        && envelope.interrupted.is_none()
    {
        return Err(DecodeError::MissingMimeType);
    }

    Ok(envelope)
}

/// Errors produced while encoding or decoding wire frames
#[derive(Debug, Clone)]
pub enum DecodeError {
    /// Frame was not well-formed JSON
    Malformed(String),
    /// Frame carried neither a mime type nor a turn-boundary marker
    MissingMimeType,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Malformed(e) => write!(f, "Malformed wire frame: {}", e),
            DecodeError::MissingMimeType => {
                write!(f, "Wire frame has no mime_type and no turn marker")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_text_envelope() {
        let envelope = Envelope::text("hello");
        let frame = encode(&envelope).unwrap();

        assert!(frame.contains("\"mime_type\":\"text/plain\""));
        assert!(frame.contains("\"data\":\"hello\""));
        // Optional fields stay off the wire
        assert!(!frame.contains("turn_complete"));
        assert!(!frame.contains("interrupted"));
    }

    #[test]
    fn test_encode_audio_envelope() {
        let envelope = Envelope::audio_pcm("AAAA");
        let frame = encode(&envelope).unwrap();

        assert!(frame.contains("\"mime_type\":\"audio/pcm\""));
        assert!(frame.contains("\"data\":\"AAAA\""));
    }

    #[test]
    fn test_decode_text_delta() {
        let envelope = decode(r#"{"mime_type":"text/plain","data":"Hel"}"#).unwrap();

        assert_eq!(envelope.kind(), PayloadKind::Text);
        assert_eq!(envelope.data, "Hel");
        assert!(!envelope.is_turn_boundary());
    }

    #[test]
    fn test_decode_turn_complete_without_mime() {
        // The server sends boundary frames with no mime_type and no data
        let envelope = decode(r#"{"turn_complete":true,"interrupted":false}"#).unwrap();

        assert!(envelope.is_turn_boundary());
        assert_eq!(envelope.kind(), PayloadKind::Other);
        assert!(envelope.data.is_empty());
    }

    #[test]
    fn test_decode_malformed_json_fails() {
        let err = decode("not json at all").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_missing_fields_fails() {
        let err = decode(r#"{"data":"orphan"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingMimeType));
    }

    #[test]
    fn test_decode_unknown_mime_is_other() {
        let envelope = decode(r#"{"mime_type":"image/png","data":"x"}"#).unwrap();
        assert_eq!(envelope.kind(), PayloadKind::Other);
    }

    #[test]
    fn test_round_trip() {
        let envelope = Envelope::text("partial delta");
        let frame = encode(&envelope).unwrap();
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_error_display() {
        let err = DecodeError::Malformed("unexpected token".to_string());
        assert!(err.to_string().contains("unexpected token"));

        let err = DecodeError::MissingMimeType;
        assert!(err.to_string().contains("mime_type"));
    }
}
