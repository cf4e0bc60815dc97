//! Connection registry.
//!
//! Bookkeeping for every open connection: whether it is paired and with
//! whom, plus the FIFO waiting pool. No protocol logic lives here.
//!
//! # Invariants
//!
//! - Pairing is symmetric: `a` is `Paired(b)` iff `b` is `Paired(a)`.
//! - A paired connection is never in the waiting pool.
//! - No id appears twice in the waiting pool.
//!
//! Closed ids may linger in the pool; [`Registry::dequeue_waiting`] discards
//! them lazily when it reaches them.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

use super::Liveness;

// ============================================================================
// ConnectionState
// ============================================================================

/// Pairing state of an open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not paired. May or may not be queued in the waiting pool.
    Waiting,
    /// Paired with the given peer.
    Paired(ConnectionId),
}

impl ConnectionState {
    /// Returns the peer if paired.
    #[inline]
    #[must_use]
    pub const fn peer(&self) -> Option<ConnectionId> {
        match self {
            Self::Waiting => None,
            Self::Paired(peer) => Some(*peer),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Open connections, their pairings and the waiting pool.
#[derive(Debug, Default)]
pub struct Registry {
    /// Every registered connection and its state.
    connections: FxHashMap<ConnectionId, ConnectionState>,
    /// Connections searching for a partner, oldest first.
    waiting: VecDeque<ConnectionId>,
}

// ============================================================================
// Registry - Membership
// ============================================================================

impl Registry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection as `Waiting` (not queued).
    ///
    /// Returns `false` if the id was already registered.
    pub fn register(&mut self, id: ConnectionId) -> bool {
        if self.connections.contains_key(&id) {
            return false;
        }
        self.connections.insert(id, ConnectionState::Waiting);
        true
    }

    /// Removes a connection and its pool entry.
    ///
    /// Returns the state it had. Any pairing must be dissolved with
    /// [`Registry::unpair`] first or the peer is left dangling.
    pub fn deregister(&mut self, id: ConnectionId) -> Option<ConnectionState> {
        self.remove_from_waiting(id);
        self.connections.remove(&id)
    }

    /// Returns `true` if the connection is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Returns the connection's state, if registered.
    #[inline]
    #[must_use]
    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.connections.get(&id).copied()
    }

    /// Returns the connection's peer, if paired.
    #[inline]
    #[must_use]
    pub fn peer_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.state(id).and_then(|state| state.peer())
    }

    /// Number of registered connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of connections currently paired (twice the number of pairs).
    #[must_use]
    pub fn paired_count(&self) -> usize {
        self.connections
            .values()
            .filter(|state| matches!(state, ConnectionState::Paired(_)))
            .count()
    }

    /// Iterates over registered connections and their states.
    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, ConnectionState)> + '_ {
        self.connections.iter().map(|(id, state)| (*id, *state))
    }
}

// ============================================================================
// Registry - Waiting Pool
// ============================================================================

impl Registry {
    /// Appends a connection to the tail of the waiting pool.
    ///
    /// No-op returning `false` if it is already queued, unknown, or paired.
    pub fn enqueue_waiting(&mut self, id: ConnectionId) -> bool {
        if self.state(id) != Some(ConnectionState::Waiting) || self.is_waiting(id) {
            return false;
        }
        self.waiting.push_back(id);
        true
    }

    /// Pops the oldest queued connection that is still open.
    ///
    /// Entries whose connection has been deregistered, or that `live` reports
    /// as closed, are discarded on the way.
    pub fn dequeue_waiting<L>(&mut self, live: &L) -> Option<ConnectionId>
    where
        L: Liveness + ?Sized,
    {
        while let Some(id) = self.waiting.pop_front() {
            let eligible = self.state(id) == Some(ConnectionState::Waiting) && live.is_open(id);
            if eligible {
                return Some(id);
            }
            trace!(connection_id = %id, "Discarded stale waiting entry");
        }
        None
    }

    /// Removes a connection from the waiting pool.
    ///
    /// Returns `true` if it was queued.
    pub fn remove_from_waiting(&mut self, id: ConnectionId) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|queued| *queued != id);
        self.waiting.len() != before
    }

    /// Returns `true` if the connection is queued in the waiting pool.
    #[inline]
    #[must_use]
    pub fn is_waiting(&self, id: ConnectionId) -> bool {
        self.waiting.contains(&id)
    }

    /// Number of entries in the waiting pool, stale ones included.
    #[inline]
    #[must_use]
    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Iterates over the waiting pool, oldest first.
    pub fn waiting(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.waiting.iter().copied()
    }
}

// ============================================================================
// Registry - Pairing
// ============================================================================

impl Registry {
    /// Records `a ↔ b`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if `a == b`, either id is
    /// unknown, or either is already paired. The registry is unchanged.
    pub fn pair(&mut self, a: ConnectionId, b: ConnectionId) -> Result<()> {
        if a == b {
            return Err(Error::invariant(format!("cannot pair {a} with itself")));
        }
        for id in [a, b] {
            match self.state(id) {
                Some(ConnectionState::Waiting) => {}
                Some(ConnectionState::Paired(peer)) => {
                    return Err(Error::invariant(format!(
                        "{id} is already paired with {peer}"
                    )));
                }
                None => {
                    return Err(Error::invariant(format!("{id} is not registered")));
                }
            }
        }

        self.remove_from_waiting(a);
        self.remove_from_waiting(b);
        self.connections.insert(a, ConnectionState::Paired(b));
        self.connections.insert(b, ConnectionState::Paired(a));
        Ok(())
    }

    /// Dissolves the pairing of `id` in both directions.
    ///
    /// Returns the former peer, or `None` if `id` was not paired. Both sides
    /// are left `Waiting` and unqueued.
    pub fn unpair(&mut self, id: ConnectionId) -> Option<ConnectionId> {
        let peer = self.peer_of(id)?;
        self.connections.insert(id, ConnectionState::Waiting);
        if self.peer_of(peer) == Some(id) {
            self.connections.insert(peer, ConnectionState::Waiting);
        }
        Some(peer)
    }
}

// ============================================================================
// Tests
// ============================================================================
