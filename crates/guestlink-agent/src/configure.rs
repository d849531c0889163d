//! Configuration apply engine contract
//!
//! A `Configure` request carries a configuration document; applying it is
//! delegated to an engine behind this trait. The engine streams one change
//! notification per unit-of-work transition and finishes with an overall
//! result document. Both documents are serialized verbatim into the
//! responses sent back to the host.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One unit-of-work state transition during an apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigurationSetChangeData {
    /// Name of the unit that changed state
    pub unit_name: String,
    /// New state, e.g. `Pending`, `InProgress`, `Completed`, `Failed`
    pub state: String,
    /// Failure detail when the transition is to a failed state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Outcome of applying one unit of a configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnitResult {
    /// Name of the unit
    pub unit_name: String,
    /// Whether the unit applied cleanly
    pub succeeded: bool,
    /// Failure detail for units that did not apply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Overall outcome of applying a configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApplyConfigurationResult {
    /// Whether every unit applied cleanly
    pub succeeded: bool,
    /// Per-unit outcomes, in apply order
    pub unit_results: Vec<UnitResult>,
}

/// Applies configuration documents.
#[async_trait]
pub trait ConfigureEngine: Send + Sync {
    /// Apply `configuration`, emitting a change notification on `progress`
    /// for each unit transition. Honors `cancel` between units.
    async fn apply(
        &self,
        configuration: &str,
        progress: mpsc::Sender<ConfigurationSetChangeData>,
        cancel: &CancellationToken,
    ) -> Result<ApplyConfigurationResult>;
}

/// Engine that applies nothing, used until a platform engine is wired in.
pub struct NoopConfigureEngine;

#[async_trait]
impl ConfigureEngine for NoopConfigureEngine {
    async fn apply(
        &self,
        _configuration: &str,
        _progress: mpsc::Sender<ConfigurationSetChangeData>,
        _cancel: &CancellationToken,
    ) -> Result<ApplyConfigurationResult> {
        Ok(ApplyConfigurationResult {
            succeeded: true,
            unit_results: Vec::new(),
        })
    }
}
