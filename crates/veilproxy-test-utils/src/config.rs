//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use veilproxy_config::{AppConfig, ServerConfig};

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .server("local", "https://example.org")
///     .poll_interval_ms(5)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// Add a `[servers.<name>]` section inheriting every default.
    pub fn server(mut self, name: &str, homeserver: &str) -> Self {
        self.config
            .servers
            .insert(name.to_string(), ServerConfig::new(homeserver));
        self
    }

    /// Add a server section listening on an explicit port.
    pub fn server_on_port(mut self, name: &str, homeserver: &str, port: u16) -> Self {
        let mut server = ServerConfig::new(homeserver);
        server.listen_port = Some(port);
        self.config.servers.insert(name.to_string(), server);
        self
    }

    pub fn socket_path(mut self, path: &Path) -> Self {
        self.config.daemon.socket_path = Some(path.to_string_lossy().into_owned());
        self
    }

    pub fn data_dir(mut self, path: &Path) -> Self {
        self.config.daemon.data_dir = path.to_string_lossy().into_owned();
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.bridge.poll_interval_ms = ms;
        self
    }

    pub fn max_events_per_tick(mut self, n: usize) -> Self {
        self.config.bridge.max_events_per_tick = n;
        self
    }

    pub fn notification_history(mut self, n: usize) -> Self {
        self.config.bridge.notification_history = n;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
