//! IPC server: axum HTTP router over a Unix domain socket.
//!
//! Routes map one-to-one onto the Control and Devices surfaces plus the
//! notification poll and a handful of administration endpoints. Handlers
//! never wait for the daemon core: command routes return the correlation
//! id as soon as the command is enqueued.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get, post};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use veilproxy_config::AppConfig;

use super::types::*;
use crate::bridge::Bridge;
use crate::correlation::CorrelationId;
use crate::daemon::ShutdownSignal;
use crate::logging::LogReader;
use crate::surface::{DeviceSurface, SurfaceError};

/// Shared state accessible to all IPC route handlers.
pub struct IpcState {
    pub config: watch::Receiver<AppConfig>,
    pub shutdown_tx: broadcast::Sender<ShutdownSignal>,
    pub bridge: Bridge,
    /// Present when the daemon runs with a log collector attached.
    pub logs: Option<LogReader>,
    pub started_at: Instant,
}

/// Default Unix socket path for daemon IPC.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/veilproxy.sock";

/// Page size of `/notifications` when the client gives no limit.
pub const DEFAULT_NOTIFICATION_LIMIT: usize = 100;

/// Entries returned by `/logs` when the client gives no limit.
pub const DEFAULT_LOG_LIMIT: usize = 200;

/// Build the axum router with all IPC routes.
pub fn router(state: Arc<IpcState>) -> axum::Router {
    axum::Router::new()
        // Administration
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/stop", post(handle_stop))
        .route("/config", get(handle_config))
        .route("/logs", get(handle_logs))
        // Control surface
        .route("/control/users", get(handle_list_users))
        .route("/control/export-keys", post(handle_export_keys))
        .route("/control/import-keys", post(handle_import_keys))
        // Devices surface
        .route("/devices/list", post(handle_list_devices))
        .route("/devices/list-user", post(handle_list_user_devices))
        .route("/devices/verify", device_command(DeviceSurface::verify))
        .route("/devices/unverify", device_command(DeviceSurface::unverify))
        .route("/devices/blacklist", device_command(DeviceSurface::blacklist))
        .route("/devices/unblacklist", device_command(DeviceSurface::unblacklist))
        .route(
            "/devices/verification/start",
            device_command(DeviceSurface::start_verification),
        )
        .route(
            "/devices/verification/cancel",
            device_command(DeviceSurface::cancel_verification),
        )
        .route(
            "/devices/verification/accept",
            device_command(DeviceSurface::accept_verification),
        )
        .route(
            "/devices/verification/confirm",
            device_command(DeviceSurface::confirm_verification),
        )
        // Notifications
        .route("/notifications", get(handle_notifications))
        .with_state(state)
}

/// Bind the IPC socket.
///
/// A socket file left behind by a dead daemon is replaced. One that still
/// accepts connections belongs to a live daemon and is refused with
/// `AddrInUse`.
pub fn bind(socket_path: &Path) -> Result<UnixListener, std::io::Error> {
    if socket_path.exists() {
        if std::os::unix::net::UnixStream::connect(socket_path).is_ok() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("another daemon is listening on {}", socket_path.display()),
            ));
        }
        warn!(path = %socket_path.display(), "Removing stale IPC socket");
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "IPC server listening");
    Ok(listener)
}

/// Serve IPC on an already bound listener until the shutdown signal.
///
/// Removes the socket file on the way out.
pub async fn serve_on(
    listener: UnixListener,
    socket_path: &Path,
    state: Arc<IpcState>,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("IPC server shutting down");
        })
        .await?;

    std::fs::remove_file(socket_path).ok();
    Ok(())
}

/// Bind `socket_path` and serve until the shutdown signal.
pub async fn serve(
    socket_path: &Path,
    state: Arc<IpcState>,
    shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) -> Result<(), std::io::Error> {
    let listener = bind(socket_path)?;
    serve_on(listener, socket_path, state, shutdown_rx).await
}

/// Resolve the socket path from config or use the default.
pub fn socket_path_from_config(config: &AppConfig) -> PathBuf {
    config
        .daemon
        .socket_path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

// ── Errors ──────────────────────────────────────────────────────────────

/// A handler failure rendered as `ErrorResponse` JSON.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<SurfaceError> for ApiError {
    fn from(e: SurfaceError) -> Self {
        let status = match e {
            SurfaceError::MissingArgument(_) => StatusCode::BAD_REQUEST,
            SurfaceError::QueueClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ── Administration handlers ─────────────────────────────────────────────

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::build_info::VERSION.to_string(),
        git_hash: crate::build_info::GIT_HASH.to_string(),
        build_profile: crate::build_info::BUILD_PROFILE.to_string(),
    })
}

async fn handle_status(State(state): State<Arc<IpcState>>) -> Json<StatusResponse> {
    let config = state.config.borrow().clone();
    let servers = config
        .resolved_servers()
        .unwrap_or_default()
        .into_iter()
        .map(|s| ServerStatus {
            name: s.name,
            homeserver: s.homeserver.to_string(),
            listen: s.listen.to_string(),
            ssl: s.ssl,
        })
        .collect();

    Json(StatusResponse {
        running: true,
        version: crate::build_info::VERSION.to_string(),
        git_hash: crate::build_info::GIT_HASH.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        pid: std::process::id(),
        log_level: config.log_level().to_string(),
        servers,
        identities: state.bridge.control.list_identities().len(),
        cached_devices: state.bridge.devices.cache().len(),
        next_correlation_id: state.bridge.counter().peek(),
        last_notification_seq: state.bridge.notifications.last_seq(),
    })
}

async fn handle_stop(State(state): State<Arc<IpcState>>) -> Json<StopResponse> {
    info!("Stop requested via IPC");
    let _ = state.shutdown_tx.send(ShutdownSignal);
    Json(StopResponse {
        acknowledged: true,
        message: "Shutdown initiated".to_string(),
    })
}

async fn handle_config(State(state): State<Arc<IpcState>>) -> Result<Json<ConfigResponse>, ApiError> {
    let config = state.config.borrow().clone();
    toml::to_string_pretty(&config)
        .map(|toml| Json(ConfigResponse { toml }))
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("Failed to serialize config: {e}"),
        })
}

async fn handle_logs(
    State(state): State<Arc<IpcState>>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    let Some(reader) = &state.logs else {
        return Json(LogsResponse {
            entries: Vec::new(),
            total: 0,
        });
    };

    let entries = reader
        .tail(query.limit.unwrap_or(DEFAULT_LOG_LIMIT))
        .into_iter()
        .map(|e| LogEntry {
            elapsed_secs: e.elapsed_secs,
            level: e.level.to_string(),
            target: e.target,
            message: e.message,
            fields: e.fields,
        })
        .collect();

    Json(LogsResponse {
        entries,
        total: reader.len(),
    })
}

// ── Control surface handlers ────────────────────────────────────────────

async fn handle_list_users(State(state): State<Arc<IpcState>>) -> Json<Vec<ManagedIdentity>> {
    Json(state.bridge.control.list_identities())
}

async fn handle_export_keys(
    State(state): State<Arc<IpcState>>,
    Json(mut body): Json<KeyFileBody>,
) -> Result<Json<CommandIssued>, ApiError> {
    let passphrase = body.take_passphrase();
    let id = state
        .bridge
        .control
        .export_keys(&body.identity, &body.file_path, passphrase)?;
    Ok(Json(CommandIssued { id }))
}

async fn handle_import_keys(
    State(state): State<Arc<IpcState>>,
    Json(mut body): Json<KeyFileBody>,
) -> Result<Json<CommandIssued>, ApiError> {
    let passphrase = body.take_passphrase();
    let id = state
        .bridge
        .control
        .import_keys(&body.identity, &body.file_path, passphrase)?;
    Ok(Json(CommandIssued { id }))
}

// ── Devices surface handlers ────────────────────────────────────────────

async fn handle_list_devices(
    State(state): State<Arc<IpcState>>,
    Json(body): Json<IdentityBody>,
) -> Json<DevicesResponse> {
    Json(DevicesResponse {
        devices: state.bridge.devices.list(&body.identity),
    })
}

async fn handle_list_user_devices(
    State(state): State<Arc<IpcState>>,
    Json(body): Json<UserDevicesBody>,
) -> Json<DevicesResponse> {
    Json(DevicesResponse {
        devices: state
            .bridge
            .devices
            .list_for_user(&body.identity, &body.user_id),
    })
}

type DeviceOp = fn(&DeviceSurface, &str, &str, &str) -> Result<CorrelationId, SurfaceError>;

/// `POST` route running one device-level surface operation.
fn device_command(op: DeviceOp) -> MethodRouter<Arc<IpcState>> {
    post(
        move |State(state): State<Arc<IpcState>>, Json(body): Json<DeviceBody>| async move {
            let id = op(
                &state.bridge.devices,
                &body.identity,
                &body.user_id,
                &body.device_id,
            )
            .inspect_err(|e| warn!(error = %e, "Device command rejected"))?;
            Ok::<_, ApiError>(Json(CommandIssued { id }))
        },
    )
}

// ── Notifications ───────────────────────────────────────────────────────

async fn handle_notifications(
    State(state): State<Arc<IpcState>>,
    Query(query): Query<NotificationsQuery>,
) -> Json<NotificationsResponse> {
    let bus = &state.bridge.notifications;
    Json(NotificationsResponse {
        notifications: bus.since(
            query.after.unwrap_or(0),
            query.limit.unwrap_or(DEFAULT_NOTIFICATION_LIMIT),
        ),
        last_seq: bus.last_seq(),
    })
}
