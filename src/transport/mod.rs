//! WebSocket transport layer.
//!
//! Owns sockets and their lifetimes; defers every pairing decision to the
//! [`Matchmaker`](crate::relay::Matchmaker).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐                                ┌──────────────────────┐
//! │ Client A │◄──────── WebSocket ──────────► │ Connection (A) task  │──┐
//! └──────────┘                                └──────────────────────┘  │   ┌─────────────┐
//!                                                                       ├──►│ RelayServer │
//! ┌──────────┐                                ┌──────────────────────┐  │   │ (Matchmaker)│
//! │ Client B │◄──────── WebSocket ──────────► │ Connection (B) task  │──┘   └─────────────┘
//! └──────────┘                                └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Per-socket handle and event loop |
//! | `server` | Listener, accept loop and event dispatch |

// ============================================================================
// Submodules
// ============================================================================

/// Per-socket handle and event loop.
pub mod connection;

/// Listener, accept loop and event dispatch.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use server::{RelayServer, RelayStats};
