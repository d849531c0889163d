//! Logical messages and the request envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A complete logical message exchanged over the channel, in either
/// direction.
///
/// The communication id is the host-issued token correlating a request with
/// its response(s) and deletions; the payload is JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Correlation token, e.g. `DevSetup{<guid>}`
    pub communication_id: String,
    /// JSON payload text
    pub payload: String,
}

impl Message {
    /// Create a message.
    pub fn new(communication_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            communication_id: communication_id.into(),
            payload: payload.into(),
        }
    }
}

/// The envelope fields every well-formed request payload must carry.
///
/// Deserialization fails hard when a required field is absent or malformed;
/// the request factory is the single boundary that turns such failures into
/// error requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestEnvelope {
    /// Host-assigned request identifier, echoed in every response
    pub request_id: String,
    /// Dispatch key selecting the request variant
    pub request_type: String,
    /// Protocol version the host speaks
    pub version: u32,
    /// Time the host issued the request
    pub timestamp: DateTime<Utc>,
}

/// Snapshot entry describing one outstanding queued request.
///
/// Informational only: reported back to the host so it can wait for an idle
/// agent before submitting further work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueuedRequestInfo {
    /// Correlation token of the queued message
    pub communication_id: String,
    /// Request identifier from the queued message's envelope
    pub request_id: String,
}

/// Derived communication id for the `n`-th progress update of a request.
pub fn progress_communication_id(communication_id: &str, sequence: u32) -> String {
    format!("{communication_id}_Progress_{sequence}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parses_required_fields() {
        let json = r#"{"RequestId":"r1","RequestType":"GetVersion","Version":1,"Timestamp":"2024-01-01T00:00:00Z"}"#;
        let envelope: RequestEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.request_id, "r1");
        assert_eq!(envelope.request_type, "GetVersion");
        assert_eq!(envelope.version, 1);
    }

    #[test]
    fn test_envelope_rejects_missing_fields() {
        let json = r#"{"RequestId":"r1","Version":1,"Timestamp":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<RequestEnvelope>(json).is_err());

        let json = r#"{"RequestId":"r1","RequestType":"GetVersion","Timestamp":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<RequestEnvelope>(json).is_err());
    }

    #[test]
    fn test_envelope_rejects_malformed_values() {
        let json = r#"{"RequestId":"r1","RequestType":"GetVersion","Version":"one","Timestamp":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<RequestEnvelope>(json).is_err());

        let json = r#"{"RequestId":"r1","RequestType":"GetVersion","Version":1,"Timestamp":"not a time"}"#;
        assert!(serde_json::from_str::<RequestEnvelope>(json).is_err());
    }

    #[test]
    fn test_envelope_ignores_type_specific_fields() {
        let json = r#"{"RequestId":"r1","RequestType":"Ack","Version":1,"Timestamp":"2024-01-01T00:00:00Z","AckRequestId":"DevSetup{9}"}"#;
        let envelope: RequestEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.request_type, "Ack");
    }

    #[test]
    fn test_progress_communication_id() {
        assert_eq!(
            progress_communication_id("DevSetup{1}", 3),
            "DevSetup{1}_Progress_3"
        );
    }
}
