//! Server to client messages.
//!
//! | `type` | Meaning |
//! |--------|---------|
//! | `searching` | Queued, no partner yet |
//! | `partner_found` | Paired; sent to both sides |
//! | `message` | Relayed chat text with server timestamp |
//! | `typing` | Relayed typing indicator |
//! | `partner_skipped` | Peer skipped with a disconnect notice |
//! | `partner_disconnected` | Peer's connection closed |

// ============================================================================
// Imports
// ============================================================================

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identifiers::ConnectionId;

// ============================================================================
// ServerMessage
// ============================================================================

/// A message sent to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Placed in the waiting pool.
    Searching,

    /// A partner was found.
    PartnerFound {
        /// The partner's connection ID, for display only.
        #[serde(rename = "partnerId", default, skip_serializing_if = "Option::is_none")]
        partner_id: Option<ConnectionId>,
    },

    /// Relayed chat text.
    Message {
        /// Text as sent by the peer.
        content: String,
        /// ISO-8601 UTC time the server relayed it.
        timestamp: String,
    },

    /// Relayed typing indicator.
    Typing {
        /// Whether the peer is typing.
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },

    /// Peer skipped and asked for this side to be told.
    PartnerSkipped,

    /// Peer's connection closed.
    PartnerDisconnected,
}

impl ServerMessage {
    /// Creates a `partner_found` naming the partner.
    #[inline]
    #[must_use]
    pub fn partner_found(partner: ConnectionId) -> Self {
        Self::PartnerFound {
            partner_id: Some(partner),
        }
    }

    /// Creates a relayed message stamped with the current time.
    #[inline]
    #[must_use]
    pub fn relayed(content: impl Into<String>) -> Self {
        Self::Message {
            content: content.into(),
            timestamp: relay_timestamp(),
        }
    }

    /// Returns the wire name of this message's `type`.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Searching => "searching",
            Self::PartnerFound { .. } => "partner_found",
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::PartnerSkipped => "partner_skipped",
            Self::PartnerDisconnected => "partner_disconnected",
        }
    }

    /// Serializes to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn relay_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Tests
// ============================================================================
