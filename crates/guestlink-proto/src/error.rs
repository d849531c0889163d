//! Error types for protocol operations

use thiserror::Error;

/// Protocol-specific errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload or response serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entry name is not a valid fragment name
    #[error("invalid fragment name: {0}")]
    InvalidFragmentName(String),

    /// A fragment vanished between discovery and read
    #[error("missing fragment {name} of message {communication_id}")]
    MissingFragment {
        /// Correlation token of the affected message
        communication_id: String,
        /// Name of the absent fragment entry
        name: String,
    },
}
