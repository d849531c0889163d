//! Progress reporting for long-running requests
//!
//! Progress updates ride the same outbound pool as terminal responses,
//! under derived communication ids `<id>_Progress_<n>` with `n` counting
//! from 1. Reporting is best effort: a failed update is logged and
//! dropped, it never aborts the request that produced it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::warn;

use guestlink_proto::envelope::progress_communication_id;
use guestlink_proto::{HostResponse, Message};

use crate::channel::HostChannel;

/// Sends sequenced progress updates for one request.
pub struct ProgressReporter {
    channel: Arc<dyn HostChannel>,
    communication_id: String,
    sequence: AtomicU32,
}

impl ProgressReporter {
    /// Create a reporter for the request carried by `communication_id`.
    pub fn new(channel: Arc<dyn HostChannel>, communication_id: impl Into<String>) -> Self {
        Self {
            channel,
            communication_id: communication_id.into(),
            sequence: AtomicU32::new(1),
        }
    }

    /// Send one progress update under the next derived communication id.
    pub async fn report(&self, response: &dyn HostResponse) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let communication_id = progress_communication_id(&self.communication_id, sequence);

        let payload = match response.to_payload() {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%communication_id, %error, "failed to serialize progress update");
                return;
            }
        };

        let message = Message::new(communication_id.clone(), payload);
        if let Err(error) = self.channel.send_message(&message).await {
            warn!(%communication_id, %error, "failed to send progress update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::KvpHostChannel;
    use crate::store::{KvStore, MemoryStore, StoreLocation};
    use guestlink_proto::response::ConfigureProgressResponse;

    #[tokio::test]
    async fn test_updates_use_sequenced_ids() {
        let store = Arc::new(MemoryStore::new());
        let channel: Arc<dyn HostChannel> =
            Arc::new(KvpHostChannel::new(Arc::clone(&store)).unwrap());
        let reporter = ProgressReporter::new(channel, "DevSetup{1}");

        reporter
            .report(&ConfigureProgressResponse::new("r1", "{}".to_string()))
            .await;
        reporter
            .report(&ConfigureProgressResponse::new("r1", "{}".to_string()))
            .await;

        let keys = store.keys(StoreLocation::ToHost).unwrap();
        assert!(keys.contains(&"DevSetup{1}_Progress_1~1~1".to_string()));
        assert!(keys.contains(&"DevSetup{1}_Progress_2~1~1".to_string()));
    }
}
