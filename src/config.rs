//! Server configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::net::{IpAddr, Ipv4Addr};
//! use stranger_relay::ServerConfig;
//!
//! let config = ServerConfig::new()
//!     .with_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
//!     .with_port(0);
//!
//! assert_eq!(config.socket_addr().ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::result::Result as StdResult;
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Port used when neither `PORT` nor `--port` is given.
pub const DEFAULT_PORT: u16 = 3001;

/// Environment variable overriding the listening port.
pub const PORT_ENV: &str = "PORT";

/// How often the accept loop checks the shutdown flag.
const DEFAULT_ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// ServerConfig
// ============================================================================

/// Listening address and accept loop tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to.
    pub ip: IpAddr,

    /// Port to bind to (0 lets the OS pick).
    pub port: u16,

    /// Accept timeout between shutdown flag checks.
    pub accept_poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ServerConfig {
    /// Creates a config listening on all interfaces on [`DEFAULT_PORT`].
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            accept_poll_interval: DEFAULT_ACCEPT_POLL_INTERVAL,
        }
    }

    /// Creates a config listening on localhost on a random port.
    #[inline]
    #[must_use]
    pub const fn localhost_ephemeral() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            accept_poll_interval: DEFAULT_ACCEPT_POLL_INTERVAL,
        }
    }

    /// Creates the default config with the port taken from `PORT`, if set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `PORT` is set but is not a valid port.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key))
    }

    /// Like [`ServerConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `PORT` is present but is not a valid port.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> StdResult<String, env::VarError>,
    {
        let config = Self::new();
        match lookup(PORT_ENV) {
            Ok(raw) => Ok(config.with_port(parse_port(&raw)?)),
            Err(env::VarError::NotPresent) => Ok(config),
            Err(env::VarError::NotUnicode(_)) => {
                Err(Error::config(format!("{PORT_ENV} is not valid unicode")))
            }
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ServerConfig {
    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }

    /// Sets the port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the accept loop poll interval.
    #[inline]
    #[must_use]
    pub fn with_accept_poll_interval(mut self, interval: Duration) -> Self {
        self.accept_poll_interval = interval;
        self
    }

    /// Returns the address to bind.
    #[inline]
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a port number from configuration text.
///
/// # Errors
///
/// Returns [`Error::Config`] if the text is not a number in `0..=65535`.
pub fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse()
        .map_err(|_| Error::config(format!("invalid port {raw:?}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.accept_poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_builder_chain() {
        let config = ServerConfig::new()
            .with_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(8080)
            .with_accept_poll_interval(Duration::from_millis(10));

        assert_eq!(config.socket_addr(), "127.0.0.1:8080".parse().expect("addr"));
        assert_eq!(config.accept_poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_localhost_ephemeral() {
        let config = ServerConfig::localhost_ephemeral();
        assert_eq!(config.port, 0);
        assert!(config.ip.is_loopback());
    }

    fn lookup_port(value: Option<&str>) -> impl Fn(&str) -> StdResult<String, env::VarError> {
        let value = value.map(str::to_owned);
        move |key| {
            assert_eq!(key, PORT_ENV);
            value.clone().ok_or(env::VarError::NotPresent)
        }
    }

    #[test]
    fn test_port_unset_uses_default() {
        let config = assert_ok!(ServerConfig::from_lookup(lookup_port(None)));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config, ServerConfig::new());
    }

    #[test]
    fn test_port_from_environment() {
        let config = assert_ok!(ServerConfig::from_lookup(lookup_port(Some("8080"))));
        assert_eq!(config.port, 8080);
        assert_eq!(config.ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        let err = assert_err!(ServerConfig::from_lookup(lookup_port(Some("http"))));
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_non_unicode_port_is_config_error() {
        let err = assert_err!(ServerConfig::from_lookup(|_| Err(env::VarError::NotUnicode(
            std::ffi::OsString::from("x")
        ))));
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_from_env_matches_process_environment() {
        // Reads the real environment without mutating it.
        let expected = match env::var(PORT_ENV) {
            Ok(raw) => parse_port(&raw).ok(),
            Err(env::VarError::NotPresent) => Some(DEFAULT_PORT),
            Err(env::VarError::NotUnicode(_)) => None,
        };
        assert_eq!(ServerConfig::from_env().ok().map(|c| c.port), expected);
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(assert_ok!(parse_port("3001")), 3001);
        assert_eq!(assert_ok!(parse_port(" 80 ")), 80);
        assert_err!(parse_port("http"));
        assert_err!(parse_port("70000"));
        assert_err!(parse_port(""));
    }
}
