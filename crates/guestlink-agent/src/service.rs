//! Top-level service loop
//!
//! Waits for inbound messages, hands each to the request manager, then
//! deletes the message's inbound entries so the next one becomes visible.
//! A message that fails to process is still deleted; leaving it behind
//! would wedge the loop on the same input forever.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::HostChannel;
use crate::manager::RequestManager;
use crate::store::StoreLocation;

/// The agent's receive/dispatch loop.
pub struct AgentService {
    channel: Arc<dyn HostChannel>,
    manager: Arc<RequestManager>,
}

impl AgentService {
    /// Create a service over a channel and manager.
    pub fn new(channel: Arc<dyn HostChannel>, manager: Arc<RequestManager>) -> Self {
        Self { channel, manager }
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!("agent service started");
        while let Some(message) = self.channel.wait_for_message(&cancel).await {
            let communication_id = message.communication_id.clone();
            debug!(%communication_id, "received request message");

            if let Err(e) = self.manager.process_request_message(message, &cancel).await {
                error!(%communication_id, error = %e, "failed to process request message");
            }

            if let Err(e) = self
                .channel
                .delete_message(StoreLocation::FromHost, &communication_id)
                .await
            {
                warn!(%communication_id, error = %e, "failed to delete consumed request");
            }
        }
        info!("agent service stopped");
        Ok(())
    }
}
