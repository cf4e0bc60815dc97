//! WebSocket relay server.
//!
//! Accepts client sockets, gives each a [`ConnectionId`], and feeds every
//! lifecycle event and inbound frame into one shared [`Matchmaker`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 RelayServer                   │
//! │  accept loop ──► per-socket task ──┐          │
//! │                                     ▼          │
//! │              Mutex<Matchmaker>.handle(event)   │
//! │                                     │          │
//! │       Vec<Delivery> ──► Connection queues      │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │ ConnectionId → Connection (RwLock map)  │  │
//! │  └─────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. TCP accept, WebSocket upgrade
//! 2. Register the [`Connection`] handle, dispatch `Opened`
//! 3. Dispatch `Inbound` for each frame, in arrival order
//! 4. On socket end, unregister the handle, dispatch `Closed`

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::identifiers::ConnectionId;
use crate::relay::{CoreEvent, Delivery, Matchmaker};

use super::Connection;
use super::connection::ConnectionCommand;

// ============================================================================
// RelayStats
// ============================================================================

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Open sockets.
    pub connections: usize,
    /// Waiting pool entries, including ones not purged yet.
    pub waiting: usize,
    /// Connections currently paired.
    pub paired: usize,
}

// ============================================================================
// RelayServer
// ============================================================================

/// Chat relay listening for WebSocket clients.
///
/// # Example
///
/// ```ignore
/// let server = RelayServer::bind(ServerConfig::from_env()?).await?;
/// println!("WebSocket URL: {}", server.ws_url());
///
/// tokio::signal::ctrl_c().await?;
/// server.shutdown().await;
/// ```
pub struct RelayServer {
    /// Address the listener is bound to.
    local_addr: SocketAddr,

    /// Open sockets by connection ID.
    connections: RwLock<FxHashMap<ConnectionId, Connection>>,

    /// Pairing state. Every core event is applied under this lock.
    matchmaker: Mutex<Matchmaker>,

    /// Accept timeout between shutdown checks.
    accept_poll_interval: Duration,

    /// Shutdown flag.
    shutdown: AtomicBool,
}

// ============================================================================
// RelayServer - Constructor
// ============================================================================

impl RelayServer {
    /// Binds the listener and starts the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if binding fails.
    pub async fn bind(config: ServerConfig) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(config.socket_addr()).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "Relay listener bound");

        let server = Arc::new(Self {
            local_addr,
            connections: RwLock::new(FxHashMap::default()),
            matchmaker: Mutex::new(Matchmaker::new()),
            accept_poll_interval: config.accept_poll_interval,
            shutdown: AtomicBool::new(false),
        });

        let server_clone = Arc::clone(&server);
        tokio::spawn(async move {
            server_clone.accept_loop(listener).await;
        });

        info!(%local_addr, "Relay server started");

        Ok(server)
    }
}

// ============================================================================
// RelayServer - Public API
// ============================================================================

impl RelayServer {
    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the WebSocket URL clients on this host can use.
    ///
    /// Format: `ws://127.0.0.1:{port}` when bound to an unspecified address.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let ip = self.local_addr.ip();
        if ip.is_unspecified() {
            format!("ws://127.0.0.1:{}", self.port())
        } else {
            format!("ws://{}", self.local_addr)
        }
    }

    /// Returns the number of open sockets.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns current counters.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        let (waiting, paired) = {
            let matchmaker = self.matchmaker.lock();
            let registry = matchmaker.registry();
            (registry.waiting_len(), registry.paired_count())
        };
        RelayStats {
            connections: self.connection_count(),
            waiting,
            paired,
        }
    }

    /// Applies one event to the matchmaker and queues the resulting messages.
    ///
    /// Also the entry point for synthetic events, such as a timer issuing a
    /// `skip` on a client's behalf.
    pub fn dispatch(&self, event: CoreEvent) {
        let mut matchmaker = self.matchmaker.lock();
        let live = |id: ConnectionId| self.is_open(id);
        let deliveries = matchmaker.handle(event, &live);

        // Queued under the lock so each recipient sees messages in mutation order.
        self.deliver(deliveries);
    }

    /// Returns `true` if the socket for `id` is still open.
    fn is_open(&self, id: ConnectionId) -> bool {
        self.connections
            .read()
            .get(&id)
            .is_some_and(Connection::is_open)
    }

    /// Pushes deliveries onto connection queues. Never blocks.
    fn deliver(&self, deliveries: Vec<Delivery>) {
        if deliveries.is_empty() {
            return;
        }

        let connections = self.connections.read();
        for Delivery { to, message } in deliveries {
            let Some(connection) = connections.get(&to) else {
                debug!(connection_id = %to, kind = message.kind(), "Recipient gone, dropping");
                continue;
            };
            if let Err(e) = connection.send(&message) {
                debug!(connection_id = %to, kind = message.kind(), error = %e, "Delivery dropped");
            }
        }
    }
}

// ============================================================================
// RelayServer - Lifecycle
// ============================================================================

impl RelayServer {
    /// Stops accepting and closes every connection.
    pub async fn shutdown(&self) {
        info!("Relay server shutting down");

        self.shutdown.store(true, Ordering::SeqCst);

        let connections: Vec<_> = {
            let mut map = self.connections.write();
            map.drain().collect()
        };

        for (connection_id, connection) in connections {
            connection.shutdown();
            debug!(connection_id = %connection_id, "Connection closed during shutdown");
        }

        info!("Relay server shutdown complete");
    }

    /// Returns `true` once [`RelayServer::shutdown`] has been called.
    #[inline]
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

// ============================================================================
// RelayServer - Accept Loop
// ============================================================================

impl RelayServer {
    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.is_shutting_down() {
                debug!("Accept loop shutting down");
                break;
            }

            // Accept with timeout to allow checking shutdown flag
            match timeout(self.accept_poll_interval, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Runs one client connection from upgrade to close.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let ws_stream = tokio_tungstenite::accept_async(stream).await?;

        let connection_id = ConnectionId::generate();
        let Some((connection, command_rx)) = self.register_connection(connection_id) else {
            debug!(?addr, "Server shutting down, dropping upgraded socket");
            return Ok(());
        };

        info!(connection = %connection_id.short(), ?addr, "WebSocket connection established");

        self.dispatch(CoreEvent::Opened(connection_id));

        connection
            .run(ws_stream, command_rx, |text| {
                self.dispatch(CoreEvent::Inbound(connection_id, text.to_owned()));
            })
            .await;

        {
            let mut connections = self.connections.write();
            connections.remove(&connection_id);
        }

        self.dispatch(CoreEvent::Closed(connection_id));

        info!(connection = %connection_id.short(), ?addr, "Connection closed");

        Ok(())
    }

    /// Adds a handle for `id` to the connection map.
    ///
    /// Returns `None` once shutdown has begun. The flag is checked under the
    /// map's write lock, which `shutdown` takes after setting it, so no handle
    /// is inserted after the drain.
    fn register_connection(
        &self,
        id: ConnectionId,
    ) -> Option<(Connection, mpsc::UnboundedReceiver<ConnectionCommand>)> {
        let mut connections = self.connections.write();
        if self.is_shutting_down() {
            return None;
        }
        let (connection, command_rx) = Connection::new(id);
        connections.insert(id, connection.clone());
        Some((connection, command_rx))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_bind_random_port() {
        let server = RelayServer::bind(ServerConfig::localhost_ephemeral())
            .await
            .expect("bind should succeed");

        assert!(server.port() > 0);
        assert_eq!(server.ws_url(), format!("ws://127.0.0.1:{}", server.port()));
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.stats(), RelayStats::default());

        server.shutdown().await;
        assert!(server.is_shutting_down());
    }

    #[tokio::test]
    async fn test_dispatch_for_unknown_connection() {
        let server = RelayServer::bind(ServerConfig::localhost_ephemeral())
            .await
            .expect("bind should succeed");

        let id = ConnectionId::generate();
        // Should not panic
        server.dispatch(CoreEvent::Inbound(id, r#"{"type":"message","content":"x"}"#.into()));
        server.dispatch(CoreEvent::Closed(id));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_opened_without_socket_queues_nothing() {
        let server = RelayServer::bind(ServerConfig::localhost_ephemeral())
            .await
            .expect("bind should succeed");

        // Registered in the matchmaker but no socket: the `searching` reply is dropped.
        server.dispatch(CoreEvent::Opened(ConnectionId::generate()));
        assert_eq!(server.stats().waiting, 1);
        assert_eq!(server.connection_count(), 0);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_register_after_shutdown_is_refused() {
        let server = RelayServer::bind(ServerConfig::localhost_ephemeral())
            .await
            .expect("bind should succeed");

        let _registered = server
            .register_connection(ConnectionId::generate())
            .expect("registered before shutdown");
        assert_eq!(server.connection_count(), 1);

        server.shutdown().await;
        assert_eq!(server.connection_count(), 0);

        assert!(server.register_connection(ConnectionId::generate()).is_none());
        assert_eq!(server.connection_count(), 0);
    }
}
