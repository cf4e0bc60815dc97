//! WebSocket protocol message types.
//!
//! This module defines the JSON messages exchanged between chat clients
//! and the relay.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`ClientMessage`] | Client → Server | `skip`, `message`, `typing` |
//! | [`ServerMessage`] | Server → Client | Pairing lifecycle and relayed traffic |
//!
//! Both directions are JSON objects discriminated by a `type` field.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `inbound` | Client message types and frame parsing |
//! | `outbound` | Server message types and timestamps |

// ============================================================================
// Submodules
// ============================================================================

/// Client to server messages.
pub mod inbound;

/// Server to client messages.
pub mod outbound;

// ============================================================================
// Re-exports
// ============================================================================

pub use inbound::{ClientMessage, parse_client_frame};
pub use outbound::{ServerMessage, relay_timestamp};
