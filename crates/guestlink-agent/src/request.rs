//! Host request trait and concrete request variants
//!
//! Each inbound message becomes exactly one `HostRequest`. Status requests
//! are answered inline by the manager; queued requests wait their turn for
//! the single worker. Malformed input becomes an error request, so "what
//! to answer" is decided at creation time and execution is uniform.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use guestlink_proto::response::{
    status, AckResponse, ConfigureCompletedResponse, ConfigureProgressResponse, ErrorResponse,
    IsUserLoggedInResponse, StateResponse, VersionResponse,
};
use guestlink_proto::{HostResponse, Message, QueuedRequestInfo};

use crate::channel::HostChannel;
use crate::configure::{ApplyConfigurationResult, ConfigureEngine};
use crate::progress::ProgressReporter;
use crate::sessions::{interactive_users, SessionTracker};
use crate::store::StoreLocation;

/// Everything a request can be created from: the inbound message, the
/// channel for requests that act on the store, and a snapshot of the
/// queue taken when the message arrived.
#[derive(Clone)]
pub struct RequestContext {
    /// The reassembled inbound message
    pub message: Message,
    /// Channel the message arrived on
    pub channel: Arc<dyn HostChannel>,
    /// Outstanding queued requests at arrival time
    pub requests_in_queue: Vec<QueuedRequestInfo>,
}

/// A host request ready to execute.
#[async_trait]
pub trait HostRequest: Send + Sync {
    /// Request identifier echoed in responses.
    fn request_id(&self) -> &str;

    /// Dispatch key this request was created for.
    fn request_type(&self) -> &str;

    /// Status requests bypass the queue and execute inline.
    fn is_status_request(&self) -> bool {
        false
    }

    /// Execute and produce the terminal response.
    async fn execute(
        &self,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn HostResponse>>;
}

/// Reports the protocol version the agent speaks.
pub struct GetVersionRequest {
    request_id: String,
}

impl GetVersionRequest {
    /// Create from a parsed envelope's request id.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }
}

#[async_trait]
impl HostRequest for GetVersionRequest {
    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn request_type(&self) -> &str {
        "GetVersion"
    }

    fn is_status_request(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _progress: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn HostResponse>> {
        Ok(Box::new(VersionResponse::new(&self.request_id)))
    }
}

/// Reports the queue snapshot taken when the request arrived.
pub struct GetStateRequest {
    request_id: String,
    requests_in_queue: Vec<QueuedRequestInfo>,
}

impl GetStateRequest {
    /// Create from a request id and the arrival-time queue snapshot.
    pub fn new(request_id: impl Into<String>, requests_in_queue: Vec<QueuedRequestInfo>) -> Self {
        Self {
            request_id: request_id.into(),
            requests_in_queue,
        }
    }
}

#[async_trait]
impl HostRequest for GetStateRequest {
    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn request_type(&self) -> &str {
        "GetState"
    }

    fn is_status_request(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _progress: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn HostResponse>> {
        let response = StateResponse::new(&self.request_id, self.requests_in_queue.clone())
            .context("failed to build state response")?;
        Ok(Box::new(response))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AckPayload {
    ack_request_id: String,
}

/// Host acknowledgement that a response was collected; the acknowledged
/// response's outbound entries are deleted. Produces no reply of its own.
pub struct AckRequest {
    request_id: String,
    ack_request_id: String,
    channel: Arc<dyn HostChannel>,
}

impl AckRequest {
    /// Create from the inbound payload; fails when `AckRequestId` is
    /// absent or malformed.
    pub fn new(request_id: impl Into<String>, context: &RequestContext) -> Result<Self> {
        let payload: AckPayload = serde_json::from_str(&context.message.payload)
            .context("ack request payload has no valid AckRequestId")?;
        Ok(Self {
            request_id: request_id.into(),
            ack_request_id: payload.ack_request_id,
            channel: Arc::clone(&context.channel),
        })
    }
}

#[async_trait]
impl HostRequest for AckRequest {
    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn request_type(&self) -> &str {
        "Ack"
    }

    fn is_status_request(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _progress: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn HostResponse>> {
        self.channel
            .delete_message(StoreLocation::ToHost, &self.ack_request_id)
            .await
            .context("failed to delete acknowledged response")?;
        Ok(Box::new(AckResponse::new(&self.request_id)))
    }
}

/// Reports whether any user has a live interactive session.
pub struct IsUserLoggedInRequest {
    request_id: String,
    sessions: Arc<dyn SessionTracker>,
}

impl IsUserLoggedInRequest {
    /// Create from a request id and a session source.
    pub fn new(request_id: impl Into<String>, sessions: Arc<dyn SessionTracker>) -> Self {
        Self {
            request_id: request_id.into(),
            sessions,
        }
    }
}

#[async_trait]
impl HostRequest for IsUserLoggedInRequest {
    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn request_type(&self) -> &str {
        "IsUserLoggedIn"
    }

    fn is_status_request(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _progress: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn HostResponse>> {
        let users =
            interactive_users(self.sessions.as_ref()).context("failed to enumerate sessions")?;
        Ok(Box::new(IsUserLoggedInResponse::new(&self.request_id, users)))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConfigurePayload {
    configure: String,
}

/// Applies a configuration document through the engine, streaming one
/// progress update per unit transition. Queued: at most one apply runs at
/// a time.
pub struct ConfigureRequest {
    request_id: String,
    configuration: String,
    engine: Arc<dyn ConfigureEngine>,
}

impl ConfigureRequest {
    /// Create from the inbound payload; fails when the `Configure`
    /// document field is absent.
    pub fn new(
        request_id: impl Into<String>,
        context: &RequestContext,
        engine: Arc<dyn ConfigureEngine>,
    ) -> Result<Self> {
        let payload: ConfigurePayload = serde_json::from_str(&context.message.payload)
            .context("configure request payload has no Configure document")?;
        Ok(Self {
            request_id: request_id.into(),
            configuration: payload.configure,
            engine,
        })
    }

    async fn forward_change(
        &self,
        progress: &ProgressReporter,
        change: crate::configure::ConfigurationSetChangeData,
    ) {
        match serde_json::to_string(&change) {
            Ok(data) => {
                progress
                    .report(&ConfigureProgressResponse::new(&self.request_id, data))
                    .await;
            }
            Err(error) => warn!(%error, "failed to serialize configuration change"),
        }
    }

    fn completed(&self, result: &ApplyConfigurationResult) -> Result<Box<dyn HostResponse>> {
        let document =
            serde_json::to_string(result).context("failed to serialize apply result")?;
        let status = if result.succeeded {
            status::OK
        } else {
            status::EXECUTION_FAILED
        };
        Ok(Box::new(ConfigureCompletedResponse::new(
            &self.request_id,
            status,
            document,
        )))
    }
}

#[async_trait]
impl HostRequest for ConfigureRequest {
    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn request_type(&self) -> &str {
        "Configure"
    }

    async fn execute(
        &self,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn HostResponse>> {
        let (change_tx, mut change_rx) = mpsc::channel(16);
        let apply = self.engine.apply(&self.configuration, change_tx, cancel);
        tokio::pin!(apply);

        let mut changes_open = true;
        let outcome = loop {
            tokio::select! {
                change = change_rx.recv(), if changes_open => {
                    match change {
                        Some(change) => self.forward_change(progress, change).await,
                        None => changes_open = false,
                    }
                }
                outcome = &mut apply => break outcome,
            }
        };
        // Changes emitted just before the engine returned may still be
        // buffered.
        while let Ok(change) = change_rx.try_recv() {
            self.forward_change(progress, change).await;
        }

        match outcome {
            Ok(result) => self.completed(&result),
            Err(error) => {
                warn!(request_id = %self.request_id, %error, "configuration apply failed");
                self.completed(&ApplyConfigurationResult {
                    succeeded: false,
                    unit_results: Vec::new(),
                })
            }
        }
    }
}

/// Stand-in for a message whose payload could not be understood; executing
/// it produces the corresponding error response.
pub struct ErrorRequest {
    request_id: String,
    request_type: String,
    status: u32,
    description: String,
}

impl ErrorRequest {
    /// Payload was empty, not JSON, or missing a required envelope field.
    pub fn invalid(request_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: "Unknown".to_string(),
            status: status::INVALID_REQUEST,
            description: description.into(),
        }
    }

    /// Payload was JSON but carried no `RequestType`.
    pub fn missing_type(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            request_type: "Unknown".to_string(),
            status: status::MISSING_REQUEST_TYPE,
            description: "request payload carries no RequestType".to_string(),
        }
    }

    /// `RequestType` named a variant the agent does not implement.
    pub fn unsupported_type(
        request_id: impl Into<String>,
        request_type: impl Into<String>,
    ) -> Self {
        let request_type = request_type.into();
        Self {
            request_id: request_id.into(),
            description: format!("unsupported request type: {request_type}"),
            request_type,
            status: status::UNSUPPORTED_REQUEST_TYPE,
        }
    }

    /// Status code this error request will report.
    pub fn status(&self) -> u32 {
        self.status
    }
}

#[async_trait]
impl HostRequest for ErrorRequest {
    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn request_type(&self) -> &str {
        &self.request_type
    }

    fn is_status_request(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _progress: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn HostResponse>> {
        Ok(Box::new(ErrorResponse::new(
            &self.request_id,
            &self.request_type,
            self.status,
            &self.description,
        )))
    }
}
