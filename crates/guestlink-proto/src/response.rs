//! Response payload types
//!
//! Every response the agent produces serializes to the PascalCase JSON shape
//! the host expects. All terminal responses carry the originating
//! `RequestId`, a `Status` code (0 = success), a `Timestamp`, and the
//! protocol `Version`; progress responses are correlated through their
//! derived communication id instead.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::envelope::QueuedRequestInfo;
use crate::ProtocolError;

/// Protocol version reported by the agent.
pub const PROTOCOL_VERSION: u32 = 1;

/// Status codes carried in the `Status` field of terminal responses.
pub mod status {
    /// Request handled successfully
    pub const OK: u32 = 0;
    /// Payload was empty, not JSON, or missing a required field
    pub const INVALID_REQUEST: u32 = 1;
    /// Payload was JSON but carried no `RequestType`
    pub const MISSING_REQUEST_TYPE: u32 = 2;
    /// `RequestType` is not in the registered set
    pub const UNSUPPORTED_REQUEST_TYPE: u32 = 3;
    /// Queued-request backpressure bound reached
    pub const TOO_MANY_REQUESTS: u32 = 4;
    /// The request's execution reported a failure
    pub const EXECUTION_FAILED: u32 = 5;
}

/// A response payload producible as JSON text.
pub trait HostResponse: Send + Sync {
    /// Whether the manager should transmit this response to the host.
    /// Acknowledgement responses suppress sending to avoid an ack loop.
    fn send_response(&self) -> bool {
        true
    }

    /// Serialize the payload to JSON text.
    fn to_payload(&self) -> Result<String, ProtocolError>;
}

/// Terminal response to `GetVersion`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionResponse {
    /// Originating request id
    pub request_id: String,
    /// Request type this responds to
    pub request_type: String,
    /// Status code, always success
    pub status: u32,
    /// Time the response was produced
    pub timestamp: DateTime<Utc>,
    /// Protocol version the agent speaks
    pub version: u32,
}

impl VersionResponse {
    /// Create a version response for a request.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: "GetVersion".to_string(),
            status: status::OK,
            timestamp: Utc::now(),
            version: PROTOCOL_VERSION,
        }
    }
}

impl HostResponse for VersionResponse {
    fn to_payload(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Terminal response to `GetState`: a snapshot of outstanding queued work.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateResponse {
    /// Originating request id
    pub request_id: String,
    /// Request type this responds to
    pub request_type: String,
    /// Status code
    pub status: u32,
    /// Time the response was produced
    pub timestamp: DateTime<Utc>,
    /// Protocol version the agent speaks
    pub version: u32,
    /// JSON document describing the outstanding requests
    pub state_data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StateData {
    requests_in_queue: Vec<QueuedRequestInfo>,
}

impl StateResponse {
    /// Create a state response from a snapshot of outstanding requests.
    pub fn new(
        request_id: impl Into<String>,
        requests_in_queue: Vec<QueuedRequestInfo>,
    ) -> Result<Self, ProtocolError> {
        let state_data = serde_json::to_string(&StateData { requests_in_queue })?;
        Ok(Self {
            request_id: request_id.into(),
            request_type: "GetState".to_string(),
            status: status::OK,
            timestamp: Utc::now(),
            version: PROTOCOL_VERSION,
            state_data,
        })
    }
}

impl HostResponse for StateResponse {
    fn to_payload(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Response to `Ack`. Never transmitted: replying to an acknowledgement
/// would start a request/ack loop.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AckResponse {
    /// Originating request id
    pub request_id: String,
    /// Request type this responds to
    pub request_type: String,
    /// Status code
    pub status: u32,
    /// Time the response was produced
    pub timestamp: DateTime<Utc>,
    /// Protocol version the agent speaks
    pub version: u32,
}

impl AckResponse {
    /// Create an ack response for a request.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: "Ack".to_string(),
            status: status::OK,
            timestamp: Utc::now(),
            version: PROTOCOL_VERSION,
        }
    }
}

impl HostResponse for AckResponse {
    fn send_response(&self) -> bool {
        false
    }

    fn to_payload(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Terminal response to `IsUserLoggedIn`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IsUserLoggedInResponse {
    /// Originating request id
    pub request_id: String,
    /// Request type this responds to
    pub request_type: String,
    /// Status code
    pub status: u32,
    /// Time the response was produced
    pub timestamp: DateTime<Utc>,
    /// Protocol version the agent speaks
    pub version: u32,
    /// Users with an active interactive session
    pub logged_in_users: Vec<String>,
    /// Whether at least one interactive user is present
    pub is_user_logged_in: bool,
}

impl IsUserLoggedInResponse {
    /// Create a logged-in response from the enumerated user list.
    pub fn new(request_id: impl Into<String>, logged_in_users: Vec<String>) -> Self {
        let is_user_logged_in = !logged_in_users.is_empty();
        Self {
            request_id: request_id.into(),
            request_type: "IsUserLoggedIn".to_string(),
            status: status::OK,
            timestamp: Utc::now(),
            version: PROTOCOL_VERSION,
            logged_in_users,
            is_user_logged_in,
        }
    }
}

impl HostResponse for IsUserLoggedInResponse {
    fn to_payload(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Terminal error response: malformed payload, unsupported type, or a failed
/// execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorResponse {
    /// Originating request id, best effort (may be empty)
    pub request_id: String,
    /// Request type this responds to, best effort
    pub request_type: String,
    /// Nonzero status code identifying the fault class
    pub status: u32,
    /// Time the response was produced
    pub timestamp: DateTime<Utc>,
    /// Protocol version the agent speaks
    pub version: u32,
    /// Human-readable description of the fault
    pub error_description: String,
}

impl ErrorResponse {
    /// Create an error response with the given status code.
    pub fn new(
        request_id: impl Into<String>,
        request_type: impl Into<String>,
        status: u32,
        error_description: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: request_type.into(),
            status,
            timestamp: Utc::now(),
            version: PROTOCOL_VERSION,
            error_description: error_description.into(),
        }
    }
}

impl HostResponse for ErrorResponse {
    fn to_payload(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Backpressure response: the queued-request bound was reached and the
/// request was discarded. Distinct from a generic error so the host can
/// apply its own retry policy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TooManyRequestsResponse {
    /// Originating request id
    pub request_id: String,
    /// Request type discriminator
    pub request_type: String,
    /// Status code, always `status::TOO_MANY_REQUESTS`
    pub status: u32,
    /// Time the response was produced
    pub timestamp: DateTime<Utc>,
    /// Protocol version the agent speaks
    pub version: u32,
}

impl TooManyRequestsResponse {
    /// Create a backpressure response for a rejected request.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: "TooManyRequests".to_string(),
            status: status::TOO_MANY_REQUESTS,
            timestamp: Utc::now(),
            version: PROTOCOL_VERSION,
        }
    }
}

impl HostResponse for TooManyRequestsResponse {
    fn to_payload(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Intermediate progress update emitted while a `Configure` request is
/// applying units.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigureProgressResponse {
    /// Originating request id
    pub request_id: String,
    /// Request type this responds to
    pub request_type: String,
    /// Discriminates progress updates from the terminal result
    pub response_type: String,
    /// Time the response was produced
    pub timestamp: DateTime<Utc>,
    /// Protocol version the agent speaks
    pub version: u32,
    /// JSON document describing the unit-level change
    pub configuration_set_change_data: String,
}

impl ConfigureProgressResponse {
    /// Create a progress update carrying a serialized change document.
    pub fn new(request_id: impl Into<String>, configuration_set_change_data: String) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: "Configure".to_string(),
            response_type: "Progress".to_string(),
            timestamp: Utc::now(),
            version: PROTOCOL_VERSION,
            configuration_set_change_data,
        }
    }
}

impl HostResponse for ConfigureProgressResponse {
    fn to_payload(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Terminal response to `Configure`, carrying the apply result document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigureCompletedResponse {
    /// Originating request id
    pub request_id: String,
    /// Request type this responds to
    pub request_type: String,
    /// Discriminates the terminal result from progress updates
    pub response_type: String,
    /// Status code
    pub status: u32,
    /// Time the response was produced
    pub timestamp: DateTime<Utc>,
    /// Protocol version the agent speaks
    pub version: u32,
    /// JSON document describing the overall apply result
    pub apply_configuration_result: String,
}

impl ConfigureCompletedResponse {
    /// Create a terminal configure response carrying a serialized result
    /// document.
    pub fn new(
        request_id: impl Into<String>,
        status: u32,
        apply_configuration_result: String,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: "Configure".to_string(),
            response_type: "Completed".to_string(),
            status,
            timestamp: Utc::now(),
            version: PROTOCOL_VERSION,
            apply_configuration_result,
        }
    }
}

impl HostResponse for ConfigureCompletedResponse {
    fn to_payload(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_response_shape() {
        let payload = VersionResponse::new("r1").to_payload().unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["RequestId"], "r1");
        assert_eq!(json["RequestType"], "GetVersion");
        assert_eq!(json["Status"], 0);
        assert_eq!(json["Version"], 1);
        assert!(json["Timestamp"].is_string());
    }

    #[test]
    fn test_state_response_embeds_queue_snapshot() {
        let response = StateResponse::new("r1", vec![]).unwrap();
        assert_eq!(response.state_data, r#"{"RequestsInQueue":[]}"#);

        let response = StateResponse::new(
            "r1",
            vec![QueuedRequestInfo {
                communication_id: "DevSetup{2}".to_string(),
                request_id: "r2".to_string(),
            }],
        )
        .unwrap();
        let state: serde_json::Value = serde_json::from_str(&response.state_data).unwrap();
        assert_eq!(state["RequestsInQueue"][0]["CommunicationId"], "DevSetup{2}");
        assert_eq!(state["RequestsInQueue"][0]["RequestId"], "r2");
    }

    #[test]
    fn test_ack_response_is_not_sent() {
        let response = AckResponse::new("r1");
        assert!(!response.send_response());
    }

    #[test]
    fn test_logged_in_flag_follows_user_list() {
        assert!(!IsUserLoggedInResponse::new("r1", vec![]).is_user_logged_in);
        assert!(IsUserLoggedInResponse::new("r1", vec!["alice".to_string()]).is_user_logged_in);
    }

    #[test]
    fn test_error_response_carries_description() {
        let payload = ErrorResponse::new("r1", "Unknown", status::INVALID_REQUEST, "bad payload")
            .to_payload()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["Status"], status::INVALID_REQUEST);
        assert_eq!(json["ErrorDescription"], "bad payload");
    }

    #[test]
    fn test_too_many_requests_is_distinct() {
        let response = TooManyRequestsResponse::new("r1");
        assert_eq!(response.status, status::TOO_MANY_REQUESTS);
        assert!(response.send_response());
    }

    #[test]
    fn test_configure_responses_discriminate() {
        let progress = ConfigureProgressResponse::new("r1", "{}".to_string());
        let payload: serde_json::Value =
            serde_json::from_str(&progress.to_payload().unwrap()).unwrap();
        assert_eq!(payload["ResponseType"], "Progress");

        let completed = ConfigureCompletedResponse::new("r1", status::OK, "{}".to_string());
        let payload: serde_json::Value =
            serde_json::from_str(&completed.to_payload().unwrap()).unwrap();
        assert_eq!(payload["ResponseType"], "Completed");
        assert_eq!(payload["Status"], 0);
    }
}
