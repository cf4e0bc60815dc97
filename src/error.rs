//! Error types for the relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use stranger_relay::{Result, RelayServer, ServerConfig};
//!
//! async fn example() -> Result<()> {
//!     let server = RelayServer::bind(ServerConfig::from_env()?).await?;
//!     println!("listening on {}", server.ws_url());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::ConnectionClosed`], [`Error::WebSocket`] |
//! | Protocol | [`Error::MalformedPayload`] |
//! | Internal | [`Error::InvariantViolation`] |
//! | External | [`Error::Io`], [`Error::Json`] |
//!
//! Only configuration and bind errors ever leave the crate. Errors raised
//! while handling a client event are logged and dropped by the matchmaker so
//! one client can never affect another.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when server configuration (CLI or environment) is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Outbound queue of a connection is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound frame could not be understood.
    ///
    /// Unparseable JSON, a missing or unknown `type`, or a missing field.
    #[error("Malformed payload: {message}")]
    MalformedPayload {
        /// Description of what was wrong with the frame.
        message: String,
    },

    // ========================================================================
    // Internal Errors
    // ========================================================================
    /// Pairing bookkeeping was asked to do something impossible.
    ///
    /// Never reaches a client.
    #[error("Invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    ///
    /// Returned when the upgrade of an accepted socket fails.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a malformed payload error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    /// Creates an invariant violation error.
    #[inline]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the error was caused by what a client sent.
    #[inline]
    #[must_use]
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::MalformedPayload { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
