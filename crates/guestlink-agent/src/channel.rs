//! Message-level channel over the exchange store
//!
//! `KvpHostChannel` adapts the raw entry store to whole-message semantics:
//! sending fragments a payload into named entries, receiving waits until a
//! complete fragment set is present and reassembles it. Reading never
//! deletes; inbound entries are removed by the service loop after the
//! request is consumed, outbound entries when the host acknowledges.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use guestlink_proto::fragment::{fragment_payload, is_message_entry, merge_messages};
use guestlink_proto::{FragmentName, Message, MAX_FRAGMENT_SIZE};

use crate::store::{KvStore, StoreLocation};

/// Whole-message view of the host channel.
#[async_trait]
pub trait HostChannel: Send + Sync {
    /// Wait until a complete inbound message is available and return it.
    ///
    /// Returns `None` when `cancel` fires. The message's entries stay in
    /// the store; callers delete them once the message is consumed.
    async fn wait_for_message(&self, cancel: &CancellationToken) -> Option<Message>;

    /// Write a message's fragments to the outbound pool.
    async fn send_message(&self, message: &Message) -> Result<()>;

    /// Delete every entry whose name starts with `communication_id`: the
    /// message's own fragments and any entries under derived ids, such as
    /// progress updates.
    async fn delete_message(&self, location: StoreLocation, communication_id: &str) -> Result<()>;
}

/// Channel implementation over a [`KvStore`].
pub struct KvpHostChannel<S: KvStore> {
    store: Arc<S>,
}

impl<S: KvStore> KvpHostChannel<S> {
    /// Create a channel and sweep message entries left over from an
    /// earlier run out of both pools.
    pub fn new(store: Arc<S>) -> Result<Self> {
        let channel = Self { store };
        channel.sweep(StoreLocation::FromHost)?;
        channel.sweep(StoreLocation::ToHost)?;
        Ok(channel)
    }

    fn sweep(&self, location: StoreLocation) -> Result<()> {
        let keys = self
            .store
            .keys(location)
            .context("failed to enumerate store entries")?;
        for name in keys.iter().filter(|name| is_message_entry(name)) {
            debug!(entry = %name, ?location, "removing stale message entry");
            self.store
                .delete(location, name)
                .context("failed to delete stale entry")?;
        }
        Ok(())
    }

    /// Scan the inbound pool once and reassemble the first complete
    /// message, if any.
    fn try_read_message(&self) -> Result<Option<Message>> {
        let keys = self
            .store
            .keys(StoreLocation::FromHost)
            .context("failed to enumerate inbound entries")?;

        let mut entries = HashMap::new();
        for name in keys {
            if !is_message_entry(&name) || FragmentName::parse(&name).is_none() {
                continue;
            }
            // An entry can vanish between enumeration and read; its group
            // then simply looks incomplete on this pass.
            match self.store.read(StoreLocation::FromHost, &name)? {
                Some(value) => {
                    entries.insert(name, value);
                }
                None => debug!(entry = %name, "inbound entry vanished before read"),
            }
        }

        let mut messages: Vec<(String, String)> = merge_messages(&entries).into_iter().collect();
        messages.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(messages
            .into_iter()
            .next()
            .map(|(communication_id, payload)| Message::new(communication_id, payload)))
    }
}

#[async_trait]
impl<S: KvStore> HostChannel for KvpHostChannel<S> {
    async fn wait_for_message(&self, cancel: &CancellationToken) -> Option<Message> {
        let notify = self.store.notifier(StoreLocation::FromHost);
        loop {
            // Arm the waiter before scanning so a write that lands during
            // the scan still wakes the next await.
            let notified = notify.notified();

            match self.try_read_message() {
                Ok(Some(message)) => return Some(message),
                Ok(None) => {}
                Err(error) => warn!(%error, "inbound scan failed, retrying on next change"),
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    async fn send_message(&self, message: &Message) -> Result<()> {
        let fragments = fragment_payload(
            &message.communication_id,
            &message.payload,
            MAX_FRAGMENT_SIZE,
        );
        debug!(
            communication_id = %message.communication_id,
            fragments = fragments.len(),
            "sending message"
        );
        for (name, value) in fragments {
            self.store
                .write(StoreLocation::ToHost, &name, &value)
                .with_context(|| format!("failed to write fragment {name}"))?;
        }
        Ok(())
    }

    async fn delete_message(&self, location: StoreLocation, communication_id: &str) -> Result<()> {
        // An empty id would match every entry in the pool.
        if communication_id.is_empty() {
            return Ok(());
        }
        let keys = self
            .store
            .keys(location)
            .context("failed to enumerate store entries")?;
        for name in keys {
            if name.starts_with(communication_id) {
                self.store
                    .delete(location, &name)
                    .with_context(|| format!("failed to delete fragment {name}"))?;
            }
        }
        Ok(())
    }
}
