//! Stranger Relay - anonymous 1:1 chat matchmaking over WebSocket.
//!
//! Clients connect, get paired with whoever has been waiting longest, and
//! exchange chat text and typing indicators through the server until one of
//! them skips or disconnects.
//!
//! # Architecture
//!
//! The crate is split into a transport-agnostic core and a WebSocket shell:
//!
//! - **Core** ([`relay`]): [`Matchmaker`] owns the [`Registry`] (waiting
//!   pool and pairings) and turns events into [`Delivery`] values
//! - **Shell** ([`transport`]): [`RelayServer`] accepts sockets and feeds
//!   their lifecycle and frames into the core, one event at a time
//!
//! # Quick Start
//!
//! ```no_run
//! use stranger_relay::{RelayServer, Result, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = RelayServer::bind(ServerConfig::from_env()?).await?;
//!     println!("Listening on {}", server.ws_url());
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Listening address and tuning |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | JSON message types |
//! | [`relay`] | Matchmaking and relay engine |
//! | [`transport`] | WebSocket server and connections |

// ============================================================================
// Modules
// ============================================================================

/// Server configuration.
pub mod config;

/// Error types and result aliases.
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// JSON protocol message types.
pub mod protocol;

/// Matchmaking and relay engine.
///
/// - [`Matchmaker`] - Event-driven pairing state machine
/// - [`Registry`] - Connection states, waiting pool, pairings
pub mod relay;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use identifiers::ConnectionId;
pub use protocol::{ClientMessage, ServerMessage};
pub use relay::{ConnectionState, CoreEvent, Delivery, Liveness, Matchmaker, Registry};
pub use transport::{Connection, RelayServer, RelayStats};
