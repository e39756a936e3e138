#![deny(unsafe_code)]

//! Shared test utilities for the veilproxy workspace.
//!
//! Provides reusable fixtures, config builders, a bridge harness and
//! tracing helpers so that individual crate tests stay concise and
//! consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! veilproxy-test-utils = { workspace = true }
//! ```

pub mod bridge;
pub mod config;
pub mod daemon;
pub mod fixtures;
pub mod tracing_setup;
