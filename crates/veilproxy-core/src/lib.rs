#![deny(unsafe_code)]

//! veilproxy core daemon runtime.
//!
//! Hosts the control-plane bridge between management clients (CLI, TUI)
//! and the daemon core: two surfaces that turn requests into correlated
//! commands, the queues carrying commands and events, the dispatch loop
//! that relays events as notifications, and the device read cache it keeps
//! fresh. The [`daemon`] module wires all of it behind the IPC server.

/// Wiring of surfaces, counter, cache and dispatcher.
pub mod bridge;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Process-wide correlation ids.
pub mod correlation;
/// Async daemon runtime.
pub mod daemon;
/// Devices, managed identities and the read cache.
pub mod device;
/// Event dispatch loop.
pub mod dispatch;
/// HTTP/JSON control interface over a Unix socket.
pub mod ipc;
/// In-process daemon core answering commands.
pub mod local_core;
/// In-memory log collector for `/logs` and the TUI.
pub mod logging;
/// Commands, events and their payloads.
pub mod message;
/// Notification bus with poll history.
pub mod notification;
/// Command and event queues.
pub mod queue;
/// Persistent identity and device store.
pub mod store;
/// Control and Devices surfaces.
pub mod surface;

pub use bridge::Bridge;
pub use correlation::{CorrelationCounter, CorrelationId};
pub use daemon::{Daemon, DaemonError, ShutdownSignal};
pub use device::{Device, DeviceCache, ManagedIdentity, TrustState};
pub use dispatch::{DispatchError, DispatcherHandle, EventDispatcher};
pub use local_core::{CommandHandler, LocalCore};
pub use logging::{LogCollector, LogReader};
pub use message::{Command, CommandKind, Event, Passphrase, Reply, ResponseCode};
pub use notification::{Notification, NotificationBus, SequencedNotification};
pub use store::{DeviceStore, JsonFileStore, MemoryStore, StoreError};
pub use surface::{ControlSurface, DeviceSurface, SurfaceError};
