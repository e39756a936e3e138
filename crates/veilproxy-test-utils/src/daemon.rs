//! Daemon test helpers.
//!
//! [`TestDaemon`] runs a full daemon on a socket inside a temporary
//! directory, backed by an in-memory store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;

use veilproxy_config::AppConfig;
use veilproxy_core::ipc::IpcClient;
use veilproxy_core::store::{DeviceStore, MemoryStore};
use veilproxy_core::{Daemon, DaemonError};

use crate::config::TestConfigBuilder;
use crate::fixtures;

/// A running daemon with an owned temp directory.
///
/// The temp directory is deleted automatically when this value is dropped,
/// guaranteeing cleanup even on panic.
pub struct TestDaemon {
    pub daemon: Arc<Daemon>,
    pub store: Arc<MemoryStore>,
    pub socket_path: PathBuf,
    task: JoinHandle<Result<(), DaemonError>>,
    _temp_dir: TempDir,
}

impl TestDaemon {
    /// Start a daemon over the `alice`/`bob` fixture and wait for its socket.
    pub async fn start() -> Self {
        Self::start_with(fixtures::alice_and_bob(), TestConfigBuilder::new()).await
    }

    /// Start a daemon over `store`. The builder gets a server section,
    /// socket path and data dir filled in.
    pub async fn start_with(store: Arc<MemoryStore>, builder: TestConfigBuilder) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("veilproxy.sock");
        let config: AppConfig = builder
            .server("local", "https://example.org")
            .socket_path(&socket_path)
            .data_dir(&temp_dir.path().join("data"))
            .poll_interval_ms(5)
            .build();

        let daemon = Arc::new(
            Daemon::new(config).with_store(Arc::clone(&store) as Arc<dyn DeviceStore>),
        );
        let runner = Arc::clone(&daemon);
        let task = tokio::spawn(async move { runner.run().await });

        for _ in 0..100 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(socket_path.exists(), "daemon socket never appeared");

        Self {
            daemon,
            store,
            socket_path,
            task,
            _temp_dir: temp_dir,
        }
    }

    pub fn client(&self) -> IpcClient {
        IpcClient::new(&self.socket_path)
    }

    /// Signal shutdown and wait for `run` to return.
    pub async fn shutdown(self) -> Result<(), DaemonError> {
        self.daemon.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("daemon did not stop in time")
            .expect("daemon task panicked")
    }
}
