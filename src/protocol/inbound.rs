//! Client to server messages.
//!
//! # Format
//!
//! Every frame is a JSON object discriminated by `type`:
//!
//! ```json
//! { "type": "skip", "sendDisconnect": true }
//! { "type": "message", "content": "hi" }
//! { "type": "typing", "isTyping": true }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// ClientMessage
// ============================================================================

/// A message sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Leave the current pairing.
    ///
    /// With `sendDisconnect` set the former peer is told and no new search
    /// starts. Without it the pairing is dropped silently and the sender
    /// searches again, which is also how a client asks to search after being
    /// skipped or disconnected.
    Skip {
        /// Notify the peer and suppress the automatic search.
        #[serde(
            rename = "sendDisconnect",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        send_disconnect: Option<bool>,
    },

    /// Chat text for the peer.
    Message {
        /// Text, relayed verbatim.
        content: String,
    },

    /// Typing indicator toggle.
    Typing {
        /// Whether the sender is currently typing.
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

impl ClientMessage {
    /// Creates a skip request.
    #[inline]
    #[must_use]
    pub fn skip(send_disconnect: bool) -> Self {
        Self::Skip {
            send_disconnect: Some(send_disconnect),
        }
    }

    /// Creates a chat message.
    #[inline]
    #[must_use]
    pub fn message(content: impl Into<String>) -> Self {
        Self::Message {
            content: content.into(),
        }
    }

    /// Creates a typing indicator.
    #[inline]
    #[must_use]
    pub const fn typing(is_typing: bool) -> Self {
        Self::Typing { is_typing }
    }

    /// Returns the wire name of this message's `type`.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Skip { .. } => "skip",
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses one inbound text frame.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] if the frame is not JSON, has no
/// known `type`, or lacks a required field.
pub fn parse_client_frame(text: &str) -> Result<ClientMessage> {
    serde_json::from_str(text).map_err(|e| Error::malformed(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
