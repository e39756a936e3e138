//! Daemon IPC: Unix domain socket transport for CLI/TUI control.
//!
//! The daemon exposes the bridge surfaces as an HTTP/JSON API over a Unix
//! socket. Command routes return a correlation id immediately; results are
//! picked up later by polling `/notifications`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐         Unix socket        ┌──────────────┐
//! │   CLI    │───────────────────────────▶│  IPC Server  │
//! │   TUI    │  HTTP/1.1 + JSON           │  (axum)      │
//! └────▲─────┘                            └──────┬───────┘
//!      │ GET /notifications                      │ Control / Devices
//!      │                                  ┌──────▼───────┐   commands   ┌──────────┐
//!      └──────────────────────────────────│    Bridge    │─────────────▶│   Core   │
//!                                         │  dispatcher  │◀─────────────│          │
//!                                         └──────────────┘    events    └──────────┘
//! ```

pub mod client;
pub mod server;
pub mod types;

pub use client::{IpcClient, IpcClientError};
pub use server::{DEFAULT_SOCKET_PATH, IpcState};
pub use types::*;
