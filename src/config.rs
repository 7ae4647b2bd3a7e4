use std::{net::SocketAddr, time::Duration};

use crate::error::{NetworkError, Result};

/// Size of the scratch buffer each read call fills.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;
/// Maximum number of readiness events collected per poll.
pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;
/// Upper bound on a single readiness wait so maintenance runs while idle.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;
/// How often the stale-connection sweep and status report run.
pub const DEFAULT_MAINTENANCE_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_PORT: u16 = 8080;

/// Environment variable holding the listen port.
pub const PORT_ENV: &str = "MILL_MUX_PORT";
/// Environment variable holding a full listen address, taking precedence over the port.
pub const ADDR_ENV: &str = "MILL_MUX_ADDR";

/// Configuration for the event loop's listener and connections.
///
/// Use [`ServerConfig::builder()`] for ergonomic construction, or
/// [`ServerConfig::from_env()`] to read the listen address from the environment.
///
/// ## Socket Options
///
/// - `no_delay`: When enabled (default), disables Nagle's algorithm on accepted sockets
///
/// ## Resource Limits
///
/// - `max_connections`: Hard limit on concurrent connections (None for unlimited)
/// - `idle_timeout`: Connections with no read or write progress for this long are
///   closed during maintenance (None keeps idle connections forever)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub address: SocketAddr,
    /// Size of the per-read scratch buffer
    pub read_buffer_size: usize,
    /// Events collected per poll
    pub events_capacity: usize,
    /// Bound on each readiness wait
    pub poll_timeout: Duration,
    /// Interval between maintenance passes
    pub maintenance_interval: Duration,
    /// Maximum number of connections
    pub max_connections: Option<usize>,
    /// Enable TCP_NODELAY
    pub no_delay: bool,
    /// Close connections idle for longer than this
    pub idle_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Create a new builder for ServerConfig
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Default configuration listening on `127.0.0.1:<port>`.
    pub fn with_port(port: u16) -> Self {
        Self::builder()
            .address(SocketAddr::from(([127, 0, 0, 1], port)))
            .build()
    }

    /// Reads `MILL_MUX_ADDR`, then `MILL_MUX_PORT`, falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ADDR_ENV) {
            let address = addr.parse::<SocketAddr>().map_err(|e| {
                NetworkError::Configuration(format!("invalid {ADDR_ENV} '{addr}': {e}"))
            })?;
            return Ok(Self::builder().address(address).build());
        }

        match lookup(PORT_ENV) {
            Some(port) => {
                let port = port.parse::<u16>().map_err(|e| {
                    NetworkError::Configuration(format!("invalid {PORT_ENV} '{port}': {e}"))
                })?;
                Ok(Self::with_port(port))
            }
            None => Ok(Self::default()),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(NetworkError::Configuration(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.events_capacity == 0 {
            return Err(NetworkError::Configuration(
                "events_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_connections == Some(0) {
            return Err(NetworkError::Configuration(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            maintenance_interval: Duration::from_millis(DEFAULT_MAINTENANCE_INTERVAL_MS),
            max_connections: None,
            no_delay: true,
            idle_timeout: None,
        }
    }
}

/// Builder for ServerConfig.
///
/// All fields are optional and fall back to `ServerConfig::default()`.
#[derive(Default)]
pub struct ServerConfigBuilder {
    address: Option<SocketAddr>,
    read_buffer_size: Option<usize>,
    events_capacity: Option<usize>,
    poll_timeout: Option<Duration>,
    maintenance_interval: Option<Duration>,
    max_connections: Option<usize>,
    no_delay: Option<bool>,
    idle_timeout: Option<Duration>,
}

impl ServerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address to bind to
    pub fn address(mut self, address: SocketAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        let ip = self
            .address
            .map(|a| a.ip())
            .unwrap_or_else(|| ServerConfig::default().address.ip());
        self.address = Some(SocketAddr::new(ip, port));
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = Some(size);
        self
    }

    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = Some(capacity);
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = Some(interval);
        self
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = Some(enabled);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ServerConfig {
        let default = ServerConfig::default();
        ServerConfig {
            address: self.address.unwrap_or(default.address),
            read_buffer_size: self.read_buffer_size.unwrap_or(default.read_buffer_size),
            events_capacity: self.events_capacity.unwrap_or(default.events_capacity),
            poll_timeout: self.poll_timeout.unwrap_or(default.poll_timeout),
            maintenance_interval: self
                .maintenance_interval
                .unwrap_or(default.maintenance_interval),
            max_connections: self.max_connections.or(default.max_connections),
            no_delay: self.no_delay.unwrap_or(default.no_delay),
            idle_timeout: self.idle_timeout.or(default.idle_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), DEFAULT_PORT);
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.poll_timeout, Duration::from_millis(100));
        assert!(config.no_delay);
        assert!(config.max_connections.is_none());
        assert!(config.idle_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::builder()
            .port(9090)
            .read_buffer_size(1024)
            .max_connections(3)
            .no_delay(false)
            .idle_timeout(Duration::from_secs(30))
            .build();

        assert_eq!(config.address.to_string(), "127.0.0.1:9090");
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.max_connections, Some(3));
        assert!(!config.no_delay);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_env_port() {
        let config = ServerConfig::from_lookup(lookup(&[(PORT_ENV, "7070")])).unwrap();
        assert_eq!(config.address.to_string(), "127.0.0.1:7070");
    }

    #[test]
    fn test_env_addr_takes_precedence() {
        let config = ServerConfig::from_lookup(lookup(&[
            (ADDR_ENV, "0.0.0.0:6060"),
            (PORT_ENV, "7070"),
        ]))
        .unwrap();
        assert_eq!(config.address.to_string(), "0.0.0.0:6060");
    }

    #[test]
    fn test_env_invalid_port() {
        let err = ServerConfig::from_lookup(lookup(&[(PORT_ENV, "eighty")])).unwrap_err();
        assert!(matches!(err, NetworkError::Configuration(_)));
    }

    #[test]
    fn test_env_missing_uses_default() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.address.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = ServerConfig::builder().read_buffer_size(0).build();
        assert!(config.validate().is_err());
        let config = ServerConfig::builder().max_connections(0).build();
        assert!(config.validate().is_err());
    }
}
