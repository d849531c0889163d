//! End-to-end exercise of the agent over an in-memory store, driving the
//! host's side of the exchange by hand: write request fragments, poll the
//! outbound pool for responses, acknowledge them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use guestlink_agent::channel::{HostChannel, KvpHostChannel};
use guestlink_agent::configure::{
    ApplyConfigurationResult, ConfigurationSetChangeData, ConfigureEngine, UnitResult,
};
use guestlink_agent::factory::RequestFactory;
use guestlink_agent::manager::RequestManager;
use guestlink_agent::service::AgentService;
use guestlink_agent::sessions::{LogonSession, SessionKind, StaticSessionTracker};
use guestlink_agent::store::{KvStore, MemoryStore, StoreLocation};
use guestlink_proto::fragment::{fragment_payload, merge_messages};

/// Engine applying one scripted unit, with a progress update per state.
struct ScriptedEngine;

#[async_trait]
impl ConfigureEngine for ScriptedEngine {
    async fn apply(
        &self,
        _configuration: &str,
        progress: mpsc::Sender<ConfigurationSetChangeData>,
        _cancel: &CancellationToken,
    ) -> Result<ApplyConfigurationResult> {
        for state in ["InProgress", "Completed"] {
            let _ = progress
                .send(ConfigurationSetChangeData {
                    unit_name: "InstallGit".to_string(),
                    state: state.to_string(),
                    error_message: None,
                })
                .await;
        }
        Ok(ApplyConfigurationResult {
            succeeded: true,
            unit_results: vec![UnitResult {
                unit_name: "InstallGit".to_string(),
                succeeded: true,
                error_message: None,
            }],
        })
    }
}

struct Host {
    store: Arc<MemoryStore>,
    cancel: CancellationToken,
}

impl Host {
    fn start() -> Self {
        let store = Arc::new(MemoryStore::new());
        let channel: Arc<dyn HostChannel> =
            Arc::new(KvpHostChannel::new(Arc::clone(&store)).unwrap());
        let sessions = StaticSessionTracker::new(
            vec![LogonSession {
                session_id: 1,
                user_name: "alice".to_string(),
                kind: SessionKind::Interactive,
            }],
            vec![1],
        );
        let factory = RequestFactory::new(Arc::new(ScriptedEngine), Arc::new(sessions));
        let manager = RequestManager::new(factory, Arc::clone(&channel));
        let service = AgentService::new(channel, manager);

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        tokio::spawn(async move { service.run(run_cancel).await });

        Self { store, cancel }
    }

    /// Write one request's fragments, deliberately small so every request
    /// spans several entries.
    fn send_request(&self, communication_id: &str, request_id: &str, request_type: &str) {
        let extra = match request_type {
            "Configure" => r#","Configure":"units: [InstallGit]""#,
            _ => "",
        };
        let payload = format!(
            r#"{{"RequestId":"{request_id}","RequestType":"{request_type}","Version":1,"Timestamp":"2024-01-01T00:00:00Z"{extra}}}"#
        );
        for (name, value) in fragment_payload(communication_id, &payload, 16) {
            self.store
                .write(StoreLocation::FromHost, &name, &value)
                .unwrap();
        }
    }

    fn send_ack(&self, communication_id: &str, request_id: &str, ack_communication_id: &str) {
        let payload = format!(
            r#"{{"RequestId":"{request_id}","RequestType":"Ack","Version":1,"Timestamp":"2024-01-01T00:00:00Z","AckRequestId":"{ack_communication_id}"}}"#
        );
        for (name, value) in fragment_payload(communication_id, &payload, 16) {
            self.store
                .write(StoreLocation::FromHost, &name, &value)
                .unwrap();
        }
    }

    fn outbound(&self) -> HashMap<String, String> {
        let mut entries = HashMap::new();
        for name in self.store.keys(StoreLocation::ToHost).unwrap() {
            if let Some(value) = self.store.read(StoreLocation::ToHost, &name).unwrap() {
                entries.insert(name, value);
            }
        }
        merge_messages(&entries)
    }

    async fn wait_for_response(&self, communication_id: &str) -> serde_json::Value {
        for _ in 0..200 {
            if let Some(payload) = self.outbound().get(communication_id) {
                return serde_json::from_str(payload).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no response for {communication_id}");
    }

    async fn wait_until_gone(&self, location: StoreLocation, communication_id: &str) {
        for _ in 0..200 {
            let remaining = self
                .store
                .keys(location)
                .unwrap()
                .into_iter()
                .filter(|name| name.starts_with(&format!("{communication_id}~")))
                .count();
            if remaining == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("entries for {communication_id} were not deleted");
    }
}

#[tokio::test]
async fn test_request_response_ack_cycle() {
    let host = Host::start();

    host.send_request("DevSetup{1}", "r1", "GetVersion");
    let response = host.wait_for_response("DevSetup{1}").await;
    assert_eq!(response["RequestId"], "r1");
    assert_eq!(response["Status"], 0);
    assert_eq!(response["Version"], 1);

    // The consumed request is cleared from the inbound pool.
    host.wait_until_gone(StoreLocation::FromHost, "DevSetup{1}").await;

    // Acknowledging clears the response; the ack itself gets no reply.
    host.send_ack("DevSetup{2}", "r2", "DevSetup{1}");
    host.wait_until_gone(StoreLocation::ToHost, "DevSetup{1}").await;
    host.wait_until_gone(StoreLocation::FromHost, "DevSetup{2}").await;
    assert!(host.outbound().get("DevSetup{2}").is_none());

    host.cancel.cancel();
}

#[tokio::test]
async fn test_is_user_logged_in_flow() {
    let host = Host::start();

    host.send_request("DevSetup{1}", "r1", "IsUserLoggedIn");
    let response = host.wait_for_response("DevSetup{1}").await;
    assert_eq!(response["IsUserLoggedIn"], true);
    assert_eq!(response["LoggedInUsers"][0], "alice");

    host.cancel.cancel();
}

#[tokio::test]
async fn test_configure_progress_and_completion() {
    let host = Host::start();

    host.send_request("DevSetup{1}", "r1", "Configure");

    let first = host.wait_for_response("DevSetup{1}_Progress_1").await;
    assert_eq!(first["ResponseType"], "Progress");
    let change: serde_json::Value =
        serde_json::from_str(first["ConfigurationSetChangeData"].as_str().unwrap()).unwrap();
    assert_eq!(change["UnitName"], "InstallGit");
    assert_eq!(change["State"], "InProgress");

    let second = host.wait_for_response("DevSetup{1}_Progress_2").await;
    assert_eq!(second["ResponseType"], "Progress");

    let completed = host.wait_for_response("DevSetup{1}").await;
    assert_eq!(completed["ResponseType"], "Completed");
    assert_eq!(completed["Status"], 0);
    let result: serde_json::Value =
        serde_json::from_str(completed["ApplyConfigurationResult"].as_str().unwrap()).unwrap();
    assert_eq!(result["Succeeded"], true);
    assert_eq!(result["UnitResults"][0]["UnitName"], "InstallGit");

    host.cancel.cancel();
}

#[tokio::test]
async fn test_unknown_request_type_gets_error_response() {
    let host = Host::start();

    host.send_request("DevSetup{1}", "r1", "Reboot");
    let response = host.wait_for_response("DevSetup{1}").await;
    assert_eq!(response["Status"], 3);
    assert!(response["ErrorDescription"]
        .as_str()
        .unwrap()
        .contains("Reboot"));

    host.cancel.cancel();
}

#[tokio::test]
async fn test_get_state_roundtrip() {
    let host = Host::start();

    host.send_request("DevSetup{1}", "r1", "GetState");
    let response = host.wait_for_response("DevSetup{1}").await;
    let state: serde_json::Value =
        serde_json::from_str(response["StateData"].as_str().unwrap()).unwrap();
    assert_eq!(state["RequestsInQueue"], serde_json::json!([]));

    host.cancel.cancel();
}
