//! # Envelope codec.
//!
//! Frames are JSON objects of the form
//! `{"event": "...", "json": "<json-encoded payload>", "originIsWorker": bool}`.
//! The payload is double-encoded on purpose: the outer object is what the
//! broadcast facility carries as flat string/boolean extras.
//!
//! ## Rules
//! - A missing or empty `json` field decodes to the empty map.
//! - A missing `originIsWorker` decodes as `false` (controller).
//! - Anything else that fails to parse or validate is a [`CodecError`].

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::transport::Frame;

use super::envelope::{MessageEnvelope, Role};
use super::payload::Payload;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    event: String,
    #[serde(default)]
    json: Option<String>,
    #[serde(default)]
    origin_is_worker: bool,
}

/// Encodes an envelope into a transport frame.
pub fn encode(envelope: &MessageEnvelope) -> Result<Frame, CodecError> {
    let json = serde_json::to_string(&envelope.payload.to_json()?)?;
    let wire = WireEnvelope {
        event: envelope.event.to_string(),
        json: Some(json),
        origin_is_worker: envelope.origin.is_worker(),
    };
    Ok(serde_json::to_string(&wire)?.into())
}

/// Decodes a transport frame into an envelope.
pub fn decode(frame: &str) -> Result<MessageEnvelope, CodecError> {
    let wire: WireEnvelope = serde_json::from_str(frame)?;
    let payload = match wire.json.as_deref() {
        None | Some("") => Payload::empty(),
        Some(raw) => Payload::from_json(serde_json::from_str(raw)?)?,
    };
    Ok(MessageEnvelope::new(
        wire.event,
        payload,
        Role::from_worker_flag(wire.origin_is_worker),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let env = MessageEnvelope::new("ping", Payload::map([("seq", 1)]), Role::Controller);
        let frame = encode(&env).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(raw["event"], "ping");
        assert_eq!(raw["json"], "{\"seq\":1}");
        assert_eq!(raw["originIsWorker"], false);
    }

    #[test]
    fn test_decode_scalar_payload() {
        let env = decode(r#"{"event":"CHECK_OK","json":"true","originIsWorker":true}"#).unwrap();
        assert_eq!(env.payload, Payload::Bool(true));
        assert_eq!(env.origin, Role::Worker);
    }

    #[test]
    fn test_missing_json_is_empty_map() {
        let env = decode(r#"{"event":"STOP"}"#).unwrap();
        assert_eq!(env.payload, Payload::empty());
        assert_eq!(env.origin, Role::Controller);
    }

    #[test]
    fn test_malformed_frames_fail() {
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"json":"{}"}"#).is_err());
        assert!(decode(r#"{"event":"x","json":"{oops"}"#).is_err());
        assert!(decode(r#"{"event":"x","json":"null"}"#).is_err());
    }

    #[test]
    fn test_integer_beyond_i64_is_rejected() {
        let err = decode(r#"{"event":"x","json":"18446744073709551615","originIsWorker":true}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedShape { what: "u64 out of range" }));

        let env = decode(r#"{"event":"x","json":"1.5","originIsWorker":true}"#).unwrap();
        assert_eq!(env.payload, Payload::Float(1.5));
    }

    #[test]
    fn test_non_finite_payload_fails_encode() {
        let env = MessageEnvelope::new("x", Payload::Float(f64::INFINITY), Role::Worker);
        assert!(encode(&env).is_err());
    }
}
