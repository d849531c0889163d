//! # Guestlink Protocol
//!
//! Wire naming, fragmentation, and message types for the host/guest
//! key/value exchange channel.

#![warn(missing_docs)]

/// Fragment naming and payload splitting
pub mod fragment;

/// Logical messages and the request envelope
pub mod envelope;

/// Response payload types
pub mod response;

/// Error types for protocol operations
pub mod error;

pub use envelope::{Message, QueuedRequestInfo, RequestEnvelope};
pub use error::ProtocolError;
pub use fragment::{FragmentName, MAX_FRAGMENT_SIZE, MESSAGE_ID_PREFIX, SEPARATOR};
pub use response::HostResponse;
