//! Core daemon process: startup, shutdown, and task wiring.
//!
//! Startup order: open the store, build the bridge (fatal on store
//! errors), start the daemon core, the dispatch loop and the IPC server.
//! Shutdown is broadcast to every task and `run` returns once all of them
//! have finished.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use veilproxy_config::{AppConfig, ConfigError};

use crate::bridge::Bridge;
use crate::ipc::IpcState;
use crate::ipc::server::{self, socket_path_from_config};
use crate::local_core::LocalCore;
use crate::logging::LogReader;
use crate::queue::queues;
use crate::store::{DeviceStore, JsonFileStore, StoreError};

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// The main veilproxy daemon.
pub struct Daemon {
    config: AppConfig,
    store: Option<Arc<dyn DeviceStore>>,
    logs: Option<LogReader>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
}

impl Daemon {
    /// Create a daemon that opens `<data_dir>/store.json` on start.
    pub fn new(config: AppConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            config,
            store: None,
            logs: None,
            shutdown_tx,
        }
    }

    /// Use `store` instead of the JSON file in the data directory.
    pub fn with_store(mut self, store: Arc<dyn DeviceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Serve the given log buffer on `/logs`.
    pub fn with_log_reader(mut self, logs: LogReader) -> Self {
        self.logs = Some(logs);
        self
    }

    /// Socket the IPC server binds.
    pub fn socket_path(&self) -> PathBuf {
        socket_path_from_config(&self.config)
    }

    /// Run the daemon until a shutdown signal or Ctrl-C is received.
    pub async fn run(&self) -> Result<(), DaemonError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let servers = self.config.resolved_servers()?;
        if servers.is_empty() {
            return Err(DaemonError::NoServers);
        }
        for server in &servers {
            info!(
                name = %server.name,
                homeserver = %server.homeserver,
                listen = %server.listen,
                "Proxy section configured"
            );
        }

        let store: Arc<dyn DeviceStore> = match &self.store {
            Some(store) => Arc::clone(store),
            None => Arc::new(JsonFileStore::in_data_dir(&self.config.data_dir())),
        };

        let (bridge_queues, core_queues) = queues();
        let (bridge, dispatcher) =
            Bridge::build(Arc::clone(&store), bridge_queues, &self.config.bridge)?;

        // Bind before any task starts so an unusable socket fails the start.
        let socket_path = self.socket_path();
        let listener = server::bind(&socket_path).map_err(|source| DaemonError::Ipc {
            path: socket_path.clone(),
            source,
        })?;

        let core = tokio::spawn(
            LocalCore::new(store, core_queues).run(self.shutdown_tx.subscribe()),
        );
        let dispatcher =
            dispatcher.spawn(Duration::from_millis(self.config.bridge.poll_interval_ms));

        let (_config_tx, config_rx) = watch::channel(self.config.clone());
        let state = Arc::new(IpcState {
            config: config_rx,
            shutdown_tx: self.shutdown_tx.clone(),
            bridge,
            logs: self.logs.clone(),
            started_at: Instant::now(),
        });

        let ipc_shutdown = self.shutdown_tx.subscribe();
        let ipc_failed_tx = self.shutdown_tx.clone();
        let ipc_path = socket_path.clone();
        let ipc = tokio::spawn(async move {
            let result = server::serve_on(listener, &ipc_path, state, ipc_shutdown).await;
            if let Err(e) = &result {
                error!(error = %e, "IPC server failed, shutting down");
                let _ = ipc_failed_tx.send(ShutdownSignal);
            }
            result
        });

        info!(version = %crate::build_info::version_string(), "veilproxy daemon started");

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping daemon");
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl-C received, initiating graceful shutdown");
                let _ = self.shutdown_tx.send(ShutdownSignal);
            }
        }

        let ipc_result = match ipc.await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "IPC task ended abnormally");
                Ok(())
            }
        };
        if let Err(e) = core.await {
            warn!(error = %e, "Daemon core task ended abnormally");
        }
        match dispatcher.stop().await {
            Ok(stats) => info!(
                consumed = stats.consumed,
                failed = stats.failed,
                "Dispatcher drained"
            ),
            Err(e) => warn!(error = %e, "Dispatcher task ended abnormally"),
        }

        ipc_result.map_err(|source| DaemonError::Ipc {
            path: socket_path,
            source,
        })?;
        info!("Daemon stopped");
        Ok(())
    }

    /// Request a graceful shutdown of the daemon.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    /// A sender that triggers shutdown when signalled.
    pub fn shutdown_sender(&self) -> broadcast::Sender<ShutdownSignal> {
        self.shutdown_tx.clone()
    }

    /// Get a reference to the daemon's configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("no homeserver is configured")]
    NoServers,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open the store: {0}")]
    Store(#[from] StoreError),

    #[error("IPC server on {}: {source}", .path.display())]
    Ipc {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use veilproxy_config::ServerConfig;

    fn config_with_server(dir: &tempfile::TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.daemon.socket_path = Some(
            dir.path()
                .join("veilproxy.sock")
                .to_string_lossy()
                .into_owned(),
        );
        config.daemon.data_dir = dir.path().join("data").to_string_lossy().into_owned();
        config
            .servers
            .insert("local".to_string(), ServerConfig::new("https://example.org"));
        config
    }

    #[tokio::test]
    async fn test_refuses_to_start_without_servers() {
        let daemon = Daemon::new(AppConfig::default());
        assert!(matches!(daemon.run().await, Err(DaemonError::NoServers)));
    }

    #[tokio::test]
    async fn test_socket_path_from_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let daemon = Daemon::new(config_with_server(&dir));
        assert_eq!(daemon.socket_path(), dir.path().join("veilproxy.sock"));
        assert_eq!(daemon.config().servers.len(), 1);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let dir = tempfile::TempDir::new().unwrap();
        let daemon = Arc::new(
            Daemon::new(config_with_server(&dir)).with_store(Arc::new(MemoryStore::new())),
        );
        let socket = daemon.socket_path();

        let runner = Arc::clone(&daemon);
        let handle = tokio::spawn(async move { runner.run().await });

        for _ in 0..50 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(socket.exists());

        daemon.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn test_malformed_store_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_with_server(&dir);
        std::fs::create_dir_all(config.data_dir()).unwrap();
        std::fs::write(config.data_dir().join("store.json"), "[").unwrap();

        let daemon = Daemon::new(config);
        assert!(matches!(daemon.run().await, Err(DaemonError::Store(_))));
    }

    #[tokio::test]
    async fn test_unusable_socket_path_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let mut config = config_with_server(&dir);
        config.daemon.socket_path = Some(
            blocker
                .join("veilproxy.sock")
                .to_string_lossy()
                .into_owned(),
        );

        let daemon = Daemon::new(config).with_store(Arc::new(MemoryStore::new()));
        let result = tokio::time::timeout(Duration::from_secs(2), daemon.run())
            .await
            .expect("run must return instead of idling without IPC");
        assert!(matches!(result, Err(DaemonError::Ipc { .. })));
    }

    #[tokio::test]
    async fn test_second_daemon_does_not_steal_socket() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = Arc::new(
            Daemon::new(config_with_server(&dir)).with_store(Arc::new(MemoryStore::new())),
        );
        let socket = first.socket_path();
        let runner = Arc::clone(&first);
        let handle = tokio::spawn(async move { runner.run().await });
        for _ in 0..50 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(socket.exists());

        let second =
            Daemon::new(config_with_server(&dir)).with_store(Arc::new(MemoryStore::new()));
        match tokio::time::timeout(Duration::from_secs(2), second.run())
            .await
            .unwrap()
        {
            Err(DaemonError::Ipc { source, .. }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse);
            }
            other => panic!("expected an IPC error, got {other:?}"),
        }

        let client = crate::ipc::IpcClient::new(&socket);
        assert_eq!(client.health().await.unwrap().status, "ok");

        first.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
