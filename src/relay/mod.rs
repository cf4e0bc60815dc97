//! Matchmaking and relay engine.
//!
//! Transport-agnostic core: the transport feeds it connection lifecycle and
//! inbound frames, and it answers with [`Delivery`] values describing what to
//! send to whom. It never performs I/O itself.
//!
//! # Architecture
//!
//! ```text
//!  transport                 Matchmaker                     transport
//! ┌──────────┐  CoreEvent   ┌────────────────────────┐  Vec<Delivery>  ┌──────────┐
//! │ opened   │ ───────────► │ state machine          │ ──────────────► │ queue to │
//! │ inbound  │              │   │                    │                 │ sockets  │
//! │ closed   │              │   ▼                    │                 └──────────┘
//! └──────────┘              │ Registry (pool, pairs) │
//!        ▲                  └────────────────────────┘
//!        └──── Liveness::is_open(id) ◄──┘
//! ```
//!
//! All registry mutations go through `&mut Matchmaker`, so whoever owns it
//! (a mutex, an actor task) is the single serialization point.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | Connection states, waiting pool, pairings |
//! | `matchmaker` | Event-driven state machine and relay |

// ============================================================================
// Submodules
// ============================================================================

/// Event-driven matchmaking state machine.
pub mod matchmaker;

/// Connection states, waiting pool and pairings.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use matchmaker::{CoreEvent, Delivery, Matchmaker};
pub use registry::{ConnectionState, Registry};

use crate::identifiers::ConnectionId;

// ============================================================================
// Liveness
// ============================================================================

/// The transport's answer to "is this connection still open?".
///
/// Lets the core skip sockets that have died but whose close event has not
/// been processed yet.
pub trait Liveness {
    /// Returns `true` if the connection can still receive messages.
    fn is_open(&self, id: ConnectionId) -> bool;
}

impl<F> Liveness for F
where
    F: Fn(ConnectionId) -> bool,
{
    #[inline]
    fn is_open(&self, id: ConnectionId) -> bool {
        self(id)
    }
}
