//! JSON request parsing and reply shapes for the signaling API

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::store::TelemetrySnapshot;

/// A POST body that could not be accepted.
///
/// Messages are meant for the client; they carry parse detail but nothing
/// about the filesystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    #[error("Error processing {what}: {detail}")]
    InvalidJson { what: &'static str, detail: String },

    #[error("Error processing {what}: expected a JSON object")]
    NotAnObject { what: &'static str },

    #[error("Error processing {what}: missing field `{field}`")]
    MissingField {
        what: &'static str,
        field: &'static str,
    },
}

/// Parse `{"offer": <value>}` and return the value verbatim
pub fn parse_offer(body: &[u8]) -> Result<Value, BodyError> {
    take_field(body, "offer", "offer")
}

/// Parse `{"answer": <value>}` and return the value verbatim
pub fn parse_answer(body: &[u8]) -> Result<Value, BodyError> {
    take_field(body, "answer", "answer")
}

/// Parse an arbitrary JSON object of telemetry
pub fn parse_telemetry(body: &[u8]) -> Result<Value, BodyError> {
    parse_object(body, "GPS data").map(Value::Object)
}

fn take_field(body: &[u8], what: &'static str, field: &'static str) -> Result<Value, BodyError> {
    let mut object = parse_object(body, what)?;
    object
        .remove(field)
        .ok_or(BodyError::MissingField { what, field })
}

fn parse_object(body: &[u8], what: &'static str) -> Result<Map<String, Value>, BodyError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| BodyError::InvalidJson {
        what,
        detail: e.to_string(),
    })?;

    match value {
        Value::Object(object) => Ok(object),
        _ => Err(BodyError::NotAnObject { what }),
    }
}

/// `GET /api/offer`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfferReply {
    pub offer: Option<Value>,
}

/// `GET /api/answer`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnswerReply {
    pub answer: Option<Value>,
}

/// `GET /api/gps-data`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReply {
    pub data: Option<Value>,
    /// Unix seconds of the stored sample, `0` when nothing is fresh
    pub timestamp: Number,
}

impl TelemetryReply {
    /// The "no data" shape: `{"data": null, "timestamp": 0}`
    pub fn empty() -> Self {
        Self {
            data: None,
            timestamp: Number::from(0u8),
        }
    }
}

impl From<Option<TelemetrySnapshot>> for TelemetryReply {
    fn from(snapshot: Option<TelemetrySnapshot>) -> Self {
        match snapshot {
            Some(snapshot) => Self {
                data: Some(snapshot.data),
                timestamp: Number::from_f64(snapshot.timestamp).unwrap_or_else(|| Number::from(0u8)),
            },
            None => Self::empty(),
        }
    }
}

/// Acknowledgment for a successful POST
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
}

impl StatusReply {
    pub fn offer_stored() -> Self {
        Self {
            status: "offer stored".into(),
        }
    }

    pub fn answer_stored() -> Self {
        Self {
            status: "answer stored".into(),
        }
    }

    pub fn telemetry_stored() -> Self {
        Self {
            status: "GPS data stored".into(),
        }
    }
}

/// Error body for client errors
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

impl ErrorReply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_offer() {
        let offer = parse_offer(br#"{"offer": {"type": "offer", "sdp": "v=0"}}"#).unwrap();
        assert_eq!(offer, json!({"type": "offer", "sdp": "v=0"}));

        // Explicit null is a value like any other
        assert_eq!(parse_offer(br#"{"offer": null}"#).unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_offer(b"{not json").unwrap_err();
        assert!(matches!(err, BodyError::InvalidJson { what: "offer", .. }));
        assert!(err.to_string().starts_with("Error processing offer: "));

        let err = parse_answer(b"[1, 2]").unwrap_err();
        assert_eq!(err, BodyError::NotAnObject { what: "answer" });

        let err = parse_answer(br#"{"offer": 1}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error processing answer: missing field `answer`"
        );

        let err = parse_telemetry(b"").unwrap_err();
        assert!(matches!(err, BodyError::InvalidJson { what: "GPS data", .. }));

        let err = parse_telemetry(b"42").unwrap_err();
        assert_eq!(err, BodyError::NotAnObject { what: "GPS data" });
    }

    #[test]
    fn test_parse_telemetry() {
        let data = parse_telemetry(br#"{"lat": 1, "lon": 2, "speed": 3.5}"#).unwrap();
        assert_eq!(data, json!({"lat": 1, "lon": 2, "speed": 3.5}));
    }

    #[test]
    fn test_reply_shapes() {
        let reply = serde_json::to_value(OfferReply { offer: None }).unwrap();
        assert_eq!(reply, json!({"offer": null}));

        let reply = serde_json::to_value(TelemetryReply::empty()).unwrap();
        assert_eq!(reply, json!({"data": null, "timestamp": 0}));

        let reply = serde_json::to_value(StatusReply::telemetry_stored()).unwrap();
        assert_eq!(reply, json!({"status": "GPS data stored"}));

        let reply = serde_json::to_value(ErrorReply::new("bad")).unwrap();
        assert_eq!(reply, json!({"error": "bad"}));
    }

    #[test]
    fn test_telemetry_reply_from_snapshot() {
        let reply = TelemetryReply::from(Some(TelemetrySnapshot {
            data: json!({"lat": 1}),
            timestamp: 1_700_000_000.25,
        }));
        assert_eq!(reply.data, Some(json!({"lat": 1})));
        assert_eq!(reply.timestamp.as_f64(), Some(1_700_000_000.25));

        assert_eq!(TelemetryReply::from(None), TelemetryReply::empty());
    }
}
