//! Request factory mapping payloads to request variants
//!
//! The factory owns an immutable registry of constructors keyed by
//! `RequestType` and is total: every inbound message yields a request.
//! Input the agent cannot understand yields an error request that reports
//! the fault back to the host instead of being dropped silently.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use guestlink_proto::RequestEnvelope;

use crate::configure::ConfigureEngine;
use crate::request::{
    AckRequest, ConfigureRequest, ErrorRequest, GetStateRequest, GetVersionRequest, HostRequest,
    IsUserLoggedInRequest, RequestContext,
};
use crate::sessions::SessionTracker;

type Constructor =
    Box<dyn Fn(&RequestContext, &RequestEnvelope) -> Result<Box<dyn HostRequest>> + Send + Sync>;

/// Creates host requests from inbound messages.
pub struct RequestFactory {
    constructors: HashMap<String, Constructor>,
}

impl RequestFactory {
    /// Build the registry, binding queued-request constructors to their
    /// collaborators.
    pub fn new(engine: Arc<dyn ConfigureEngine>, sessions: Arc<dyn SessionTracker>) -> Self {
        let mut constructors: HashMap<String, Constructor> = HashMap::new();

        constructors.insert(
            "GetVersion".to_string(),
            Box::new(|_context, envelope| {
                Ok(Box::new(GetVersionRequest::new(&envelope.request_id)))
            }),
        );
        constructors.insert(
            "GetState".to_string(),
            Box::new(|context, envelope| {
                Ok(Box::new(GetStateRequest::new(
                    &envelope.request_id,
                    context.requests_in_queue.clone(),
                )))
            }),
        );
        constructors.insert(
            "Ack".to_string(),
            Box::new(|context, envelope| {
                Ok(Box::new(AckRequest::new(&envelope.request_id, context)?))
            }),
        );
        constructors.insert(
            "IsUserLoggedIn".to_string(),
            Box::new(move |_context, envelope| {
                Ok(Box::new(IsUserLoggedInRequest::new(
                    &envelope.request_id,
                    Arc::clone(&sessions),
                )))
            }),
        );
        constructors.insert(
            "Configure".to_string(),
            Box::new(move |context, envelope| {
                Ok(Box::new(ConfigureRequest::new(
                    &envelope.request_id,
                    context,
                    Arc::clone(&engine),
                )?))
            }),
        );

        Self { constructors }
    }

    /// Create the request for an inbound message. Never fails: faults in
    /// the payload become error requests.
    pub fn create_request(&self, context: &RequestContext) -> Box<dyn HostRequest> {
        let payload = context.message.payload.trim();
        if payload.is_empty() {
            return Box::new(ErrorRequest::invalid("", "empty request payload"));
        }

        let value: serde_json::Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(error) => {
                return Box::new(ErrorRequest::invalid(
                    "",
                    format!("request payload is not valid JSON: {error}"),
                ));
            }
        };

        // Best-effort id so even a broken envelope's error response can be
        // correlated by the host.
        let request_id = value
            .get("RequestId")
            .and_then(|id| id.as_str())
            .unwrap_or("")
            .to_string();

        let request_type = match value.get("RequestType").and_then(|t| t.as_str()) {
            Some(request_type) => request_type.to_string(),
            None => return Box::new(ErrorRequest::missing_type(request_id)),
        };

        let envelope: RequestEnvelope = match serde_json::from_value(value) {
            Ok(envelope) => envelope,
            Err(error) => {
                return Box::new(ErrorRequest::invalid(
                    request_id,
                    format!("malformed request envelope: {error}"),
                ));
            }
        };

        match self.constructors.get(&request_type) {
            Some(constructor) => match constructor(context, &envelope) {
                Ok(request) => {
                    debug!(
                        request_id = %envelope.request_id,
                        request_type = %request_type,
                        "created request"
                    );
                    request
                }
                Err(error) => Box::new(ErrorRequest::invalid(
                    envelope.request_id,
                    format!("{error:#}"),
                )),
            },
            None => Box::new(ErrorRequest::unsupported_type(
                envelope.request_id,
                request_type,
            )),
        }
    }
}
