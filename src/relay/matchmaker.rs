//! Matchmaker and relay state machine.
//!
//! Per-connection lifecycle:
//!
//! ```text
//!   opened ──► Waiting ──match──► Paired ──skip / peer skip / peer close──► Waiting
//!                 │                  │
//!                 └──── closed ──────┴──► (removed)
//! ```
//!
//! # Transitions
//!
//! | Event | Effect | Notifications |
//! |-------|--------|---------------|
//! | opened | register, search | `searching` or `partner_found` ×2 |
//! | `skip` | unpair; search again unless `sendDisconnect` | peer: `partner_skipped` if flagged |
//! | `message` | relay to live peer | peer: `message` + timestamp |
//! | `typing` | relay to live peer | peer: `typing` |
//! | closed | unpair, drop pool entry, deregister | peer: `partner_disconnected` |
//!
//! Nothing here returns an error to the caller. Malformed frames, traffic
//! without a peer and events for unknown ids are logged and dropped.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, error, info, trace, warn};

use crate::identifiers::ConnectionId;
use crate::protocol::{ClientMessage, ServerMessage, parse_client_frame};

use super::Liveness;
use super::registry::{ConnectionState, Registry};

// ============================================================================
// CoreEvent
// ============================================================================

/// An event delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// A new connection was accepted.
    Opened(ConnectionId),
    /// A text frame arrived on a connection.
    Inbound(ConnectionId, String),
    /// A connection closed.
    Closed(ConnectionId),
}

impl CoreEvent {
    /// Returns the connection the event belongs to.
    #[inline]
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        match self {
            Self::Opened(id) | Self::Inbound(id, _) | Self::Closed(id) => *id,
        }
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// A message the transport should send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Recipient.
    pub to: ConnectionId,
    /// Payload.
    pub message: ServerMessage,
}

impl Delivery {
    /// Creates a delivery.
    #[inline]
    #[must_use]
    pub const fn new(to: ConnectionId, message: ServerMessage) -> Self {
        Self { to, message }
    }
}

// ============================================================================
// Matchmaker
// ============================================================================

/// Pairs waiting connections and relays traffic between peers.
///
/// Owns the [`Registry`] exclusively. Construct one per server and hand it
/// to whatever serializes connection events.
#[derive(Debug, Default)]
pub struct Matchmaker {
    registry: Registry,
}

impl Matchmaker {
    /// Creates a matchmaker with an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access to the pairing state.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Applies one transport event.
    pub fn handle<L>(&mut self, event: CoreEvent, live: &L) -> Vec<Delivery>
    where
        L: Liveness + ?Sized,
    {
        match event {
            CoreEvent::Opened(id) => self.connection_opened(id, live),
            CoreEvent::Inbound(id, text) => self.inbound(id, &text, live),
            CoreEvent::Closed(id) => self.connection_closed(id),
        }
    }
}

// ============================================================================
// Matchmaker - Lifecycle
// ============================================================================

impl Matchmaker {
    /// Registers a new connection and starts its first search.
    pub fn connection_opened<L>(&mut self, id: ConnectionId, live: &L) -> Vec<Delivery>
    where
        L: Liveness + ?Sized,
    {
        if !self.registry.register(id) {
            warn!(connection_id = %id, "Connection opened twice, ignoring");
            return Vec::new();
        }
        debug!(connection_id = %id, "Connection registered");

        let mut out = Vec::with_capacity(2);
        self.find_partner(id, live, &mut out);
        out
    }

    /// Removes a connection, telling its peer if it had one.
    ///
    /// Unknown or already closed ids are ignored.
    pub fn connection_closed(&mut self, id: ConnectionId) -> Vec<Delivery> {
        if !self.registry.contains(id) {
            trace!(connection_id = %id, "Close for unknown connection, ignoring");
            return Vec::new();
        }

        let mut out = Vec::new();
        if let Some(peer) = self.registry.unpair(id) {
            debug!(connection_id = %id, peer = %peer, "Paired connection closed");
            out.push(Delivery::new(peer, ServerMessage::PartnerDisconnected));
        }
        self.registry.deregister(id);
        debug!(connection_id = %id, "Connection deregistered");
        out
    }
}

// ============================================================================
// Matchmaker - Inbound
// ============================================================================

impl Matchmaker {
    /// Parses and applies one inbound text frame.
    ///
    /// Malformed frames are logged and dropped; the connection and its
    /// pairing are untouched.
    pub fn inbound<L>(&mut self, id: ConnectionId, text: &str, live: &L) -> Vec<Delivery>
    where
        L: Liveness + ?Sized,
    {
        match parse_client_frame(text) {
            Ok(message) => self.handle_client_message(id, message, live),
            Err(e) => {
                warn!(connection_id = %id, error = %e, "Dropping malformed payload");
                Vec::new()
            }
        }
    }

    /// Applies an already parsed client message.
    pub fn handle_client_message<L>(
        &mut self,
        id: ConnectionId,
        message: ClientMessage,
        live: &L,
    ) -> Vec<Delivery>
    where
        L: Liveness + ?Sized,
    {
        if !self.registry.contains(id) {
            warn!(connection_id = %id, kind = message.kind(), "Message from unknown connection");
            return Vec::new();
        }

        let mut out = Vec::new();
        match message {
            ClientMessage::Skip { send_disconnect } => {
                self.skip(id, send_disconnect.unwrap_or(false), live, &mut out);
            }
            ClientMessage::Message { content } => {
                if let Some(peer) = self.live_peer(id, live) {
                    trace!(connection_id = %id, peer = %peer, len = content.len(), "Relaying message");
                    out.push(Delivery::new(peer, ServerMessage::relayed(content)));
                }
            }
            ClientMessage::Typing { is_typing } => {
                if let Some(peer) = self.live_peer(id, live) {
                    out.push(Delivery::new(peer, ServerMessage::Typing { is_typing }));
                }
            }
        }
        out
    }

    /// Handles `skip`.
    fn skip<L>(&mut self, id: ConnectionId, send_disconnect: bool, live: &L, out: &mut Vec<Delivery>)
    where
        L: Liveness + ?Sized,
    {
        let former = self.registry.unpair(id);
        debug!(
            connection_id = %id,
            peer = ?former,
            send_disconnect,
            "Skip requested"
        );

        if send_disconnect {
            // The skipper stays idle until it asks to search again.
            if let Some(peer) = former
                && live.is_open(peer)
            {
                out.push(Delivery::new(peer, ServerMessage::PartnerSkipped));
            }
        } else {
            self.find_partner(id, live, out);
        }
    }

    /// Returns the peer of `id` if it is paired and the peer is still open.
    fn live_peer<L>(&self, id: ConnectionId, live: &L) -> Option<ConnectionId>
    where
        L: Liveness + ?Sized,
    {
        let Some(peer) = self.registry.peer_of(id) else {
            debug!(connection_id = %id, "No peer, dropping relay");
            return None;
        };
        if !live.is_open(peer) {
            debug!(connection_id = %id, peer = %peer, "Peer is closing, dropping relay");
            return None;
        }
        Some(peer)
    }
}

// ============================================================================
// Matchmaker - Matching
// ============================================================================

impl Matchmaker {
    /// Pairs `id` with the oldest open waiting connection, or queues it.
    fn find_partner<L>(&mut self, id: ConnectionId, live: &L, out: &mut Vec<Delivery>)
    where
        L: Liveness + ?Sized,
    {
        if self.registry.state(id) != Some(ConnectionState::Waiting) {
            return;
        }

        // Never match a connection with itself.
        self.registry.remove_from_waiting(id);

        let Some(partner) = self.registry.dequeue_waiting(live) else {
            self.registry.enqueue_waiting(id);
            debug!(connection_id = %id, waiting = self.registry.waiting_len(), "Searching");
            out.push(Delivery::new(id, ServerMessage::Searching));
            return;
        };

        match self.registry.pair(id, partner) {
            Ok(()) => {
                info!(connection = %id.short(), peer = %partner.short(), "Pair formed");
                out.push(Delivery::new(id, ServerMessage::partner_found(partner)));
                out.push(Delivery::new(partner, ServerMessage::partner_found(id)));
            }
            Err(e) => {
                error!(connection_id = %id, peer = %partner, error = %e, "Pairing failed");
                self.registry.enqueue_waiting(partner);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn all_open(_: ConnectionId) -> bool {
        true
    }

    fn open(mm: &mut Matchmaker) -> (ConnectionId, Vec<Delivery>) {
        let id = ConnectionId::generate();
        let out = mm.connection_opened(id, &all_open);
        (id, out)
    }

    fn paired(mm: &mut Matchmaker) -> (ConnectionId, ConnectionId) {
        let (a, _) = open(mm);
        let (b, _) = open(mm);
        assert_eq!(mm.registry().peer_of(a), Some(b));
        (a, b)
    }

    fn kinds_for(out: &[Delivery], id: ConnectionId) -> Vec<&'static str> {
        out.iter()
            .filter(|d| d.to == id)
            .map(|d| d.message.kind())
            .collect()
    }

    #[test]
    fn test_first_connection_searches() {
        let mut mm = Matchmaker::new();
        let (a, out) = open(&mut mm);

        assert_eq!(out, vec![Delivery::new(a, ServerMessage::Searching)]);
        assert!(mm.registry().is_waiting(a));
    }

    #[test]
    fn test_second_connection_pairs_both() {
        let mut mm = Matchmaker::new();
        let (a, _) = open(&mut mm);
        let (b, out) = open(&mut mm);

        assert_eq!(
            out,
            vec![
                Delivery::new(b, ServerMessage::partner_found(a)),
                Delivery::new(a, ServerMessage::partner_found(b)),
            ]
        );
        assert_eq!(mm.registry().state(a), Some(ConnectionState::Paired(b)));
        assert_eq!(mm.registry().state(b), Some(ConnectionState::Paired(a)));
        assert_eq!(mm.registry().waiting_len(), 0);
    }

    #[test]
    fn test_arrival_order_pairing() {
        let mut mm = Matchmaker::new();
        let ids: Vec<_> = (0..6).map(|_| open(&mut mm).0).collect();

        for pair in ids.chunks(2) {
            assert_eq!(mm.registry().peer_of(pair[0]), Some(pair[1]));
        }
    }

    #[test]
    fn test_duplicate_open_is_ignored() {
        let mut mm = Matchmaker::new();
        let (a, _) = open(&mut mm);
        assert!(mm.connection_opened(a, &all_open).is_empty());
        assert_eq!(mm.registry().waiting_len(), 1);
    }

    #[test]
    fn test_message_relayed_to_peer_only() {
        let mut mm = Matchmaker::new();
        let (a, b) = paired(&mut mm);
        let (c, _) = open(&mut mm);

        let out = mm.inbound(a, r#"{"type":"message","content":"hi"}"#, &all_open);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, b);
        assert!(kinds_for(&out, c).is_empty());
        match &out[0].message {
            ServerMessage::Message { content, timestamp } => {
                assert_eq!(content, "hi");
                assert!(!timestamp.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_typing_relayed() {
        let mut mm = Matchmaker::new();
        let (a, b) = paired(&mut mm);

        let out = mm.inbound(b, r#"{"type":"typing","isTyping":true}"#, &all_open);
        assert_eq!(out, vec![Delivery::new(a, ServerMessage::Typing { is_typing: true })]);
    }

    #[test]
    fn test_message_without_peer_is_dropped() {
        let mut mm = Matchmaker::new();
        let (a, _) = open(&mut mm);
        assert!(mm.handle_client_message(a, ClientMessage::message("hello?"), &all_open).is_empty());
        assert!(mm.handle_client_message(a, ClientMessage::typing(true), &all_open).is_empty());
    }

    #[test]
    fn test_message_to_closing_peer_is_dropped() {
        let mut mm = Matchmaker::new();
        let (a, b) = paired(&mut mm);
        let live = move |id: ConnectionId| id != b;

        assert!(mm.handle_client_message(a, ClientMessage::message("hi"), &live).is_empty());
        // Pairing is cleaned up by the close event, not by the relay.
        assert_eq!(mm.registry().peer_of(a), Some(b));
    }

    #[test]
    fn test_malformed_payload_is_absorbed() {
        let mut mm = Matchmaker::new();
        let (a, b) = paired(&mut mm);

        assert!(mm.inbound(a, "{not json", &all_open).is_empty());
        assert!(mm.inbound(a, r#"{"type":"launch"}"#, &all_open).is_empty());
        assert_eq!(mm.registry().peer_of(a), Some(b));
    }

    #[test]
    fn test_close_notifies_peer_once() {
        let mut mm = Matchmaker::new();
        let (a, b) = paired(&mut mm);

        let out = mm.connection_closed(b);
        assert_eq!(out, vec![Delivery::new(a, ServerMessage::PartnerDisconnected)]);
        assert_eq!(mm.registry().state(a), Some(ConnectionState::Waiting));
        assert!(!mm.registry().contains(b));

        // Later traffic from the survivor goes nowhere.
        assert!(mm.handle_client_message(a, ClientMessage::message("still there?"), &all_open).is_empty());
        // Closing again is a no-op.
        assert!(mm.connection_closed(b).is_empty());
    }

    #[test]
    fn test_close_unknown_is_noop() {
        let mut mm = Matchmaker::new();
        assert!(mm.connection_closed(ConnectionId::generate()).is_empty());
    }

    #[test]
    fn test_close_waiting_removes_pool_entry() {
        let mut mm = Matchmaker::new();
        let (a, _) = open(&mut mm);
        assert!(mm.connection_closed(a).is_empty());
        assert_eq!(mm.registry().waiting_len(), 0);

        let (b, out) = open(&mut mm);
        assert_eq!(out, vec![Delivery::new(b, ServerMessage::Searching)]);
    }

    #[test]
    fn test_skip_with_disconnect_notifies_and_idles() {
        let mut mm = Matchmaker::new();
        let (a, b) = paired(&mut mm);

        let out = mm.handle_client_message(a, ClientMessage::skip(true), &all_open);
        assert_eq!(out, vec![Delivery::new(b, ServerMessage::PartnerSkipped)]);
        assert_eq!(mm.registry().state(a), Some(ConnectionState::Waiting));
        assert_eq!(mm.registry().state(b), Some(ConnectionState::Waiting));
        assert!(!mm.registry().is_waiting(a));
        assert!(!mm.registry().is_waiting(b));

        // A newcomer does not get matched with either idle side.
        let (c, out) = open(&mut mm);
        assert_eq!(out, vec![Delivery::new(c, ServerMessage::Searching)]);

        // An explicit search request from the skipper matches the newcomer.
        let out = mm.handle_client_message(a, ClientMessage::skip(false), &all_open);
        assert_eq!(kinds_for(&out, a), vec!["partner_found"]);
        assert_eq!(kinds_for(&out, c), vec!["partner_found"]);
    }

    #[test]
    fn test_skip_with_disconnect_to_closing_peer_is_silent() {
        let mut mm = Matchmaker::new();
        let (a, b) = paired(&mut mm);
        let live = move |id: ConnectionId| id != b;

        let out = mm.handle_client_message(a, ClientMessage::skip(true), &live);
        assert!(out.is_empty());
        assert_eq!(mm.registry().state(a), Some(ConnectionState::Waiting));
        assert_eq!(mm.registry().state(b), Some(ConnectionState::Waiting));
        assert!(!mm.registry().is_waiting(a));
        assert!(!mm.registry().is_waiting(b));

        // The close that follows finds nothing left to notify.
        assert!(mm.connection_closed(b).is_empty());
        assert!(!mm.registry().contains(b));
    }

    #[test]
    fn test_skip_without_flag_searches_immediately() {
        let mut mm = Matchmaker::new();
        let (a, b) = paired(&mut mm);

        let out = mm.handle_client_message(a, ClientMessage::Skip { send_disconnect: None }, &all_open);
        // Former peer is unpaired silently.
        assert_eq!(out, vec![Delivery::new(a, ServerMessage::Searching)]);
        assert_eq!(mm.registry().state(b), Some(ConnectionState::Waiting));
        assert!(mm.registry().is_waiting(a));
    }

    #[test]
    fn test_skip_without_flag_finds_waiting_partner() {
        let mut mm = Matchmaker::new();
        let (a, _b) = paired(&mut mm);
        let (c, _) = open(&mut mm);

        let out = mm.handle_client_message(a, ClientMessage::skip(false), &all_open);
        assert_eq!(
            out,
            vec![
                Delivery::new(a, ServerMessage::partner_found(c)),
                Delivery::new(c, ServerMessage::partner_found(a)),
            ]
        );
    }

    #[test]
    fn test_skip_while_searching_does_not_self_match() {
        let mut mm = Matchmaker::new();
        let (a, _) = open(&mut mm);

        let out = mm.handle_client_message(a, ClientMessage::skip(false), &all_open);
        assert_eq!(out, vec![Delivery::new(a, ServerMessage::Searching)]);
        assert_eq!(mm.registry().waiting().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn test_skip_with_flag_while_queued_keeps_queue_entry() {
        let mut mm = Matchmaker::new();
        let (a, _) = open(&mut mm);

        assert!(mm.handle_client_message(a, ClientMessage::skip(true), &all_open).is_empty());
        assert!(mm.registry().is_waiting(a));
    }

    #[test]
    fn test_stale_waiting_entry_is_skipped() {
        let mut mm = Matchmaker::new();
        let (a, _) = open(&mut mm);

        // `a` died but its close event has not been processed yet.
        let live = move |id: ConnectionId| id != a;
        let b = ConnectionId::generate();
        let out = mm.connection_opened(b, &live);

        assert_eq!(out, vec![Delivery::new(b, ServerMessage::Searching)]);
        assert!(mm.registry().is_waiting(b));
        assert!(!mm.registry().is_waiting(a));
        assert_eq!(mm.registry().state(a), Some(ConnectionState::Waiting));
    }

    #[test]
    fn test_handle_dispatches_events() {
        let mut mm = Matchmaker::new();
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();

        mm.handle(CoreEvent::Opened(a), &all_open);
        mm.handle(CoreEvent::Opened(b), &all_open);
        let out = mm.handle(
            CoreEvent::Inbound(a, r#"{"type":"message","content":"hi"}"#.into()),
            &all_open,
        );
        assert_eq!(kinds_for(&out, b), vec!["message"]);

        let out = mm.handle(CoreEvent::Closed(b), &all_open);
        assert_eq!(out, vec![Delivery::new(a, ServerMessage::PartnerDisconnected)]);
        assert_eq!(CoreEvent::Closed(b).connection_id(), b);
    }

    #[test]
    fn test_inbound_from_unknown_connection() {
        let mut mm = Matchmaker::new();
        let out = mm.inbound(ConnectionId::generate(), r#"{"type":"skip"}"#, &all_open);
        assert!(out.is_empty());
        assert_eq!(mm.registry().connection_count(), 0);
    }
}
