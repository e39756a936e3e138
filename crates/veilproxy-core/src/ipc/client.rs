//! IPC client: connects to the daemon over a Unix domain socket.
//!
//! Typed access to every daemon route for the CLI and TUI. Uses `hyper`
//! for HTTP/1.1 over the Unix socket, one connection per request.

use std::path::{Path, PathBuf};

use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::UnixStream;
use tracing::debug;

use super::types::*;
use crate::device::Device;

/// Errors from the IPC client.
#[derive(Debug, thiserror::Error)]
pub enum IpcClientError {
    #[error("failed to connect to daemon socket at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("daemon is not running (socket not found at {0})")]
    NotRunning(PathBuf),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("daemon returned error ({status}): {message}")]
    Daemon { status: u16, message: String },
}

/// Client for communicating with the veilproxy daemon via Unix socket.
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    /// Create a new IPC client targeting the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Check if the daemon socket exists (daemon is likely running).
    pub fn daemon_available(&self) -> bool {
        self.socket_path.exists()
    }

    /// Send one HTTP request over the Unix socket and return the response body.
    async fn request(
        &self,
        method: hyper::Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, IpcClientError> {
        if !self.daemon_available() {
            return Err(IpcClientError::NotRunning(self.socket_path.clone()));
        }

        let stream =
            UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| IpcClientError::Connect {
                    path: self.socket_path.clone(),
                    source: e,
                })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake::<
            _,
            http_body_util::Full<Bytes>,
        >(TokioIo::new(stream))
        .await
        .map_err(|e| IpcClientError::Request(format!("HTTP handshake failed: {e}")))?;

        // Drive the connection in the background
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::warn!(error = %e, "IPC connection error");
            }
        });

        debug!(%method, path, "IPC request");

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }

        let req = builder
            .body(http_body_util::Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| IpcClientError::Request(format!("failed to build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| IpcClientError::Request(format!("request failed: {e}")))?;

        let status = resp.status();
        let resp_body = http_body_util::BodyExt::collect(resp.into_body())
            .await
            .map_err(|e| IpcClientError::Request(format!("failed to read response body: {e}")))?
            .to_bytes();

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&resp_body)
                .map(|err| err.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&resp_body).into_owned());
            return Err(IpcClientError::Daemon {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp_body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, IpcClientError> {
        let body = self.request(hyper::Method::GET, path, None).await?;
        serde_json::from_slice(&body).map_err(|e| IpcClientError::Parse(format!("{path}: {e}")))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, IpcClientError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| IpcClientError::Parse(format!("failed to serialize request: {e}")))?;
        let body = self.request(hyper::Method::POST, path, Some(bytes)).await?;
        serde_json::from_slice(&body).map_err(|e| IpcClientError::Parse(format!("{path}: {e}")))
    }

    async fn device_command(
        &self,
        path: &str,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CommandIssued, IpcClientError> {
        let body = DeviceBody {
            identity: identity.to_string(),
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
        };
        self.post(path, &body).await
    }

    // ── Administration ─────────────────────────────────────────────────

    /// Health check: is the daemon running and responsive?
    pub async fn health(&self) -> Result<HealthResponse, IpcClientError> {
        self.get("/health").await
    }

    pub async fn status(&self) -> Result<StatusResponse, IpcClientError> {
        self.get("/status").await
    }

    /// Request daemon shutdown.
    pub async fn stop(&self) -> Result<StopResponse, IpcClientError> {
        let body = self.request(hyper::Method::POST, "/stop", None).await?;
        serde_json::from_slice(&body).map_err(|e| IpcClientError::Parse(format!("stop: {e}")))
    }

    /// The daemon's running configuration as TOML.
    pub async fn config(&self) -> Result<ConfigResponse, IpcClientError> {
        self.get("/config").await
    }

    /// The newest `limit` daemon log entries.
    pub async fn logs(&self, limit: usize) -> Result<LogsResponse, IpcClientError> {
        self.get(&format!("/logs?limit={limit}")).await
    }

    // ── Control surface ────────────────────────────────────────────────

    pub async fn list_users(&self) -> Result<Vec<ManagedIdentity>, IpcClientError> {
        self.get("/control/users").await
    }

    pub async fn export_keys(
        &self,
        identity: &str,
        file_path: &str,
        passphrase: &str,
    ) -> Result<CommandIssued, IpcClientError> {
        let body = KeyFileBody {
            identity: identity.to_string(),
            file_path: file_path.to_string(),
            passphrase: passphrase.to_string(),
        };
        self.post("/control/export-keys", &body).await
    }

    pub async fn import_keys(
        &self,
        identity: &str,
        file_path: &str,
        passphrase: &str,
    ) -> Result<CommandIssued, IpcClientError> {
        let body = KeyFileBody {
            identity: identity.to_string(),
            file_path: file_path.to_string(),
            passphrase: passphrase.to_string(),
        };
        self.post("/control/import-keys", &body).await
    }

    // ── Devices surface ────────────────────────────────────────────────

    pub async fn list_devices(&self, identity: &str) -> Result<Vec<Device>, IpcClientError> {
        let body = IdentityBody {
            identity: identity.to_string(),
        };
        let resp: DevicesResponse = self.post("/devices/list", &body).await?;
        Ok(resp.devices)
    }

    pub async fn list_user_devices(
        &self,
        identity: &str,
        user_id: &str,
    ) -> Result<Vec<Device>, IpcClientError> {
        let body = UserDevicesBody {
            identity: identity.to_string(),
            user_id: user_id.to_string(),
        };
        let resp: DevicesResponse = self.post("/devices/list-user", &body).await?;
        Ok(resp.devices)
    }

    pub async fn verify_device(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CommandIssued, IpcClientError> {
        self.device_command("/devices/verify", identity, user_id, device_id)
            .await
    }

    pub async fn unverify_device(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CommandIssued, IpcClientError> {
        self.device_command("/devices/unverify", identity, user_id, device_id)
            .await
    }

    pub async fn blacklist_device(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CommandIssued, IpcClientError> {
        self.device_command("/devices/blacklist", identity, user_id, device_id)
            .await
    }

    pub async fn unblacklist_device(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CommandIssued, IpcClientError> {
        self.device_command("/devices/unblacklist", identity, user_id, device_id)
            .await
    }

    pub async fn start_verification(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CommandIssued, IpcClientError> {
        self.device_command("/devices/verification/start", identity, user_id, device_id)
            .await
    }

    pub async fn cancel_verification(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CommandIssued, IpcClientError> {
        self.device_command("/devices/verification/cancel", identity, user_id, device_id)
            .await
    }

    pub async fn accept_verification(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CommandIssued, IpcClientError> {
        self.device_command("/devices/verification/accept", identity, user_id, device_id)
            .await
    }

    pub async fn confirm_verification(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CommandIssued, IpcClientError> {
        self.device_command("/devices/verification/confirm", identity, user_id, device_id)
            .await
    }

    // ── Notifications ──────────────────────────────────────────────────

    /// Notifications with a sequence number above `after`.
    pub async fn notifications(
        &self,
        after: u64,
        limit: usize,
    ) -> Result<NotificationsResponse, IpcClientError> {
        self.get(&format!("/notifications?after={after}&limit={limit}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = IpcClient::new("/tmp/test-veilproxy-missing.sock");
        assert!(!client.daemon_available());
    }

    #[tokio::test]
    async fn test_client_not_running_error() {
        let client = IpcClient::new("/tmp/nonexistent-veilproxy.sock");
        let result = client.health().await;
        assert!(matches!(result, Err(IpcClientError::NotRunning(_))));
    }

    #[tokio::test]
    async fn test_integration_server_client() {
        use std::sync::Arc;
        use std::time::Instant;

        use tokio::sync::{broadcast, watch};

        use super::super::server;
        use crate::bridge::Bridge;
        use crate::device::{ManagedIdentity, TrustState};
        use crate::local_core::LocalCore;
        use crate::queue::queues;
        use crate::store::{DeviceStore, MemoryStore};

        let store = Arc::new(MemoryStore::new());
        store
            .add_identity(ManagedIdentity::new("alice", "PAN1"))
            .unwrap();
        store
            .add_device(
                "alice",
                Device {
                    user_id: "bob".to_string(),
                    device_id: "DEV1".to_string(),
                    display_name: None,
                    trust_state: TrustState::Unverified,
                    ed25519: "ed".to_string(),
                    curve25519: "cu".to_string(),
                },
            )
            .unwrap();
        let store: Arc<dyn DeviceStore> = store;

        let (bridge_queues, core_queues) = queues();
        let config = veilproxy_config::AppConfig::default();
        let (bridge, dispatcher) =
            Bridge::build(Arc::clone(&store), bridge_queues, &config.bridge).unwrap();
        let dispatcher = dispatcher.spawn(std::time::Duration::from_millis(10));

        let (shutdown_tx, _) = broadcast::channel(1);
        let (_, config_rx) = watch::channel(config);
        tokio::spawn(LocalCore::new(store, core_queues).run(shutdown_tx.subscribe()));

        let state = Arc::new(server::IpcState {
            config: config_rx,
            shutdown_tx: shutdown_tx.clone(),
            bridge,
            logs: None,
            started_at: Instant::now(),
        });

        let dir = tempfile::TempDir::new().unwrap();
        let sock_path = dir.path().join("veilproxy.sock");

        let sock_path_clone = sock_path.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let server_handle = tokio::spawn(async move {
            server::serve(&sock_path_clone, state, shutdown_rx)
                .await
                .unwrap();
        });

        // Give server time to bind
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let client = IpcClient::new(&sock_path);
        assert!(client.daemon_available());

        let health = client.health().await.unwrap();
        assert_eq!(health.status, "ok");

        let users = client.list_users().await.unwrap();
        assert_eq!(users.len(), 1);

        let issued = client.verify_device("alice", "bob", "DEV1").await.unwrap();
        assert_eq!(issued.id.get(), 0);

        // Wait for the response to come back through the dispatcher
        let mut seen = None;
        for _ in 0..50 {
            let page = client.notifications(0, 10).await.unwrap();
            if let Some(n) = page.notifications.into_iter().next() {
                seen = Some(n);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(seen.is_some(), "no notification arrived");

        let devices = client.list_user_devices("alice", "bob").await.unwrap();
        assert_eq!(devices[0].trust_state, TrustState::Verified);

        let err = client.verify_device("alice", "", "DEV1").await.unwrap_err();
        assert!(matches!(err, IpcClientError::Daemon { status: 400, .. }));

        // Stop the daemon via IPC
        let stop = client.stop().await.unwrap();
        assert!(stop.acknowledged);

        let _ = tokio::time::timeout(std::time::Duration::from_secs(2), server_handle).await;
        dispatcher.stop().await.unwrap();
    }
}
