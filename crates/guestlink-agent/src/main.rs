//! Guestlink Agent Binary
//!
//! Guest-side service answering host requests over the key/value exchange
//! channel.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use guestlink_agent::channel::{HostChannel, KvpHostChannel};
use guestlink_agent::configure::NoopConfigureEngine;
use guestlink_agent::factory::RequestFactory;
use guestlink_agent::manager::RequestManager;
use guestlink_agent::service::AgentService;
use guestlink_agent::sessions::StaticSessionTracker;
use guestlink_agent::store::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("starting guestlink agent");

    // In-memory store and placeholder collaborators; the platform-backed
    // implementations plug in here.
    let store = Arc::new(MemoryStore::new());
    let channel: Arc<dyn HostChannel> = Arc::new(KvpHostChannel::new(store)?);
    let factory = RequestFactory::new(
        Arc::new(NoopConfigureEngine),
        Arc::new(StaticSessionTracker::empty()),
    );
    let manager = RequestManager::new(factory, Arc::clone(&channel));
    let service = AgentService::new(channel, manager);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    if let Err(e) = service.run(cancel).await {
        error!("agent service error: {}", e);
        std::process::exit(1);
    }

    info!("agent shutting down");
    Ok(())
}
