//! # Guestlink Agent
//!
//! Guest-side service that receives host requests over a narrow key/value
//! exchange store, executes them with bounded queueing, and writes
//! responses (and progress updates) back for the host to collect.

#![warn(missing_docs)]

/// Key/value exchange store abstraction and in-memory implementation
pub mod store;

/// Message-level channel over the exchange store
pub mod channel;

/// Progress reporting for long-running requests
pub mod progress;

/// Host request trait and concrete request variants
pub mod request;

/// Request factory mapping payloads to request variants
pub mod factory;

/// Bounded-queue request manager and its worker
pub mod manager;

/// Top-level service loop
pub mod service;

/// Logon session enumeration
pub mod sessions;

/// Configuration apply engine contract
pub mod configure;
