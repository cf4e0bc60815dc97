//! WebSocket connection and event loop.
//!
//! Each accepted socket gets a [`Connection`] handle and an event loop task
//! that:
//!
//! - Reads text (or UTF-8 binary) frames and hands them to a callback
//! - Writes JSON queued through the handle
//! - Marks the handle closed when the socket ends
//!
//! Queuing never blocks, so callers may enqueue while holding locks.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::ServerMessage;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    /// Write a serialized message.
    Send(String),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to one client's WebSocket.
///
/// Cheap to clone; all clones share the same outbound queue and open flag.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Connection ID.
    id: ConnectionId,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Cleared when the event loop exits.
    open: Arc<AtomicBool>,
}

impl Connection {
    /// Creates a handle and the receiver its event loop will drain.
    pub(crate) fn new(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<ConnectionCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let connection = Self {
            id,
            command_tx,
            open: Arc::new(AtomicBool::new(true)),
        };
        (connection, command_rx)
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns `true` while the socket is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.command_tx.is_closed()
    }

    /// Queues a message for the client.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the socket is gone
    /// - [`Error::Json`] if serialization fails
    pub fn send(&self, message: &ServerMessage) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }
        let json = message.to_json()?;
        self.command_tx
            .send(ConnectionCommand::Send(json))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Asks the event loop to close the socket.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Runs the event loop until the socket closes.
    ///
    /// `on_text` is called for every inbound text frame and every binary
    /// frame that is valid UTF-8, in arrival order.
    pub(crate) async fn run<S, F>(
        &self,
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        mut on_text: F,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
        F: FnMut(&str),
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let id = self.id;

        loop {
            tokio::select! {
                // Incoming frames from the client
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => on_text(text.as_str()),

                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => on_text(text),
                            Err(e) => warn!(connection_id = %id, error = %e, "Dropping non UTF-8 binary frame"),
                        },

                        Some(Ok(Message::Close(_))) => {
                            debug!(connection_id = %id, "WebSocket closed by client");
                            break;
                        }

                        Some(Err(e)) => {
                            debug!(connection_id = %id, error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!(connection_id = %id, "WebSocket stream ended");
                            break;
                        }

                        // Ping/Pong are answered by tungstenite
                        _ => {}
                    }
                }

                // Outbound messages queued by the server
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(json)) => {
                            if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                                warn!(connection_id = %id, error = %e, "Failed to send message");
                                break;
                            }
                            trace!(connection_id = %id, "Message sent");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!(connection_id = %id, "Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!(connection_id = %id, "Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        self.open.store(false, Ordering::Release);
        debug!(connection_id = %id, "Event loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
