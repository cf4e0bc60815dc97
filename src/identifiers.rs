//! Type-safe identifiers.
//!
//! Newtype wrappers keep connection ids from being mixed up with other
//! string or UUID values that flow through the relay.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ConnectionId
// ============================================================================

/// Opaque identifier of one client connection.
///
/// Generated by the transport when a socket is accepted and stable for the
/// lifetime of that socket. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a new random connection ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the first eight hex digits, for compact log lines.
    #[must_use]
    pub fn short(&self) -> String {
        let mut buf = Uuid::encode_buffer();
        self.0.simple().encode_lower(&mut buf)[..8].to_string()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConnectionId {
    #[inline]
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_matches_uuid() {
        let uuid = Uuid::new_v4();
        let id = ConnectionId::from_uuid(uuid);
        assert_eq!(id.to_string(), uuid.to_string());
        assert_eq!(id.as_uuid(), &uuid);
    }

    #[test]
    fn test_short_form() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").expect("uuid");
        let id = ConnectionId::from(uuid);
        assert_eq!(id.short(), "550e8400");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").expect("uuid");
        let json = serde_json::to_string(&ConnectionId::from(uuid)).expect("serialize");
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }
}
