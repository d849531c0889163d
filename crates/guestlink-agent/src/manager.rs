//! Bounded-queue request manager and its worker
//!
//! Status requests are answered inline in arrival order. Queued requests
//! go through a FIFO queue drained by a single worker task, so at most
//! one long-running request executes at a time and the channel stays
//! responsive while it runs. The queue is bounded; requests arriving at
//! capacity are rejected with a distinct backpressure response.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use guestlink_proto::response::TooManyRequestsResponse;
use guestlink_proto::{HostResponse, Message, QueuedRequestInfo};

use crate::channel::HostChannel;
use crate::factory::RequestFactory;
use crate::progress::ProgressReporter;
use crate::request::{HostRequest, RequestContext};

/// Most queued requests that may wait at once. Requests beyond this are
/// rejected until the worker catches up.
pub const MAX_QUEUE_SIZE: usize = 3;

struct QueuedEntry {
    communication_id: String,
    request: Box<dyn HostRequest>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<QueuedEntry>,
    worker_active: bool,
    current: Option<QueuedRequestInfo>,
}

/// Routes inbound messages to request execution.
pub struct RequestManager {
    factory: RequestFactory,
    channel: Arc<dyn HostChannel>,
    state: Mutex<QueueState>,
}

impl RequestManager {
    /// Create a manager over a factory and the channel responses go out
    /// on.
    pub fn new(factory: RequestFactory, channel: Arc<dyn HostChannel>) -> Arc<Self> {
        Arc::new(Self {
            factory,
            channel,
            state: Mutex::new(QueueState::default()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("request manager state poisoned"))
    }

    /// Outstanding work: the request being executed, then the waiting
    /// queue in order.
    pub fn requests_in_queue(&self) -> Result<Vec<QueuedRequestInfo>> {
        let state = self.lock()?;
        let mut outstanding = Vec::with_capacity(state.queue.len() + 1);
        if let Some(current) = &state.current {
            outstanding.push(current.clone());
        }
        outstanding.extend(state.queue.iter().map(|entry| QueuedRequestInfo {
            communication_id: entry.communication_id.clone(),
            request_id: entry.request.request_id().to_string(),
        }));
        Ok(outstanding)
    }

    /// Handle one inbound message: create its request, answer status
    /// requests inline, enqueue the rest.
    pub async fn process_request_message(
        self: &Arc<Self>,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let communication_id = message.communication_id.clone();
        if communication_id.is_empty() {
            error!("received message with empty communication id, dropping it");
            return Ok(());
        }
        let context = RequestContext {
            message,
            channel: Arc::clone(&self.channel),
            requests_in_queue: self.requests_in_queue()?,
        };
        let request = self.factory.create_request(&context);

        if request.is_status_request() {
            let progress = ProgressReporter::new(Arc::clone(&self.channel), &communication_id);
            let response = request
                .execute(&progress, cancel)
                .await
                .with_context(|| format!("request {} failed", request.request_id()))?;
            return self.send(&communication_id, response.as_ref()).await;
        }

        let request_id = request.request_id().to_string();
        let mut spawn_worker = false;
        let accepted = {
            let mut state = self.lock()?;
            if state.queue.len() >= MAX_QUEUE_SIZE {
                false
            } else {
                state.queue.push_back(QueuedEntry {
                    communication_id: communication_id.clone(),
                    request,
                });
                if !state.worker_active {
                    state.worker_active = true;
                    spawn_worker = true;
                }
                true
            }
        };

        if !accepted {
            info!(%communication_id, %request_id, "queue full, rejecting request");
            let response = TooManyRequestsResponse::new(request_id);
            return self.send(&communication_id, &response).await;
        }

        if spawn_worker {
            let manager = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move { manager.drain(cancel).await });
        }
        Ok(())
    }

    /// Worker loop: execute queued requests one at a time until the queue
    /// is empty or shutdown is requested.
    async fn drain(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let entry = match self.next_entry(&cancel) {
                Some(entry) => entry,
                None => return,
            };

            debug!(
                communication_id = %entry.communication_id,
                request_id = %entry.request.request_id(),
                "executing queued request"
            );
            let progress =
                ProgressReporter::new(Arc::clone(&self.channel), &entry.communication_id);
            match entry.request.execute(&progress, &cancel).await {
                Ok(response) => {
                    if let Err(e) = self.send(&entry.communication_id, response.as_ref()).await {
                        error!(
                            communication_id = %entry.communication_id,
                            error = %e,
                            "failed to send response"
                        );
                    }
                }
                Err(e) => error!(
                    communication_id = %entry.communication_id,
                    error = %e,
                    "queued request failed"
                ),
            }

            if let Ok(mut state) = self.state.lock() {
                state.current = None;
            }
        }
    }

    /// Pop the next entry, updating worker bookkeeping under the lock.
    /// Returns `None` and retires the worker when the queue is empty or
    /// shutdown was requested.
    fn next_entry(&self, cancel: &CancellationToken) -> Option<QueuedEntry> {
        let mut state = self.state.lock().ok()?;
        if cancel.is_cancelled() {
            state.queue.clear();
            state.worker_active = false;
            state.current = None;
            return None;
        }
        match state.queue.pop_front() {
            Some(entry) => {
                state.current = Some(QueuedRequestInfo {
                    communication_id: entry.communication_id.clone(),
                    request_id: entry.request.request_id().to_string(),
                });
                Some(entry)
            }
            None => {
                state.worker_active = false;
                state.current = None;
                None
            }
        }
    }

    async fn send(&self, communication_id: &str, response: &dyn HostResponse) -> Result<()> {
        if !response.send_response() {
            debug!(%communication_id, "response suppressed");
            return Ok(());
        }
        let payload = response
            .to_payload()
            .context("failed to serialize response")?;
        self.channel
            .send_message(&Message::new(communication_id, payload))
            .await
    }
}
