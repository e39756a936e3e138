//! Build-time metadata embedded by the build script.

/// The git commit hash at build time (short form, `-dirty` when modified).
pub const GIT_HASH: &str = env!("VEILPROXY_GIT_HASH");

/// The build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("VEILPROXY_BUILD_TIMESTAMP");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("VEILPROXY_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version line shown by `/health`, `/status` and the CLI banner.
///
/// Example: `"veilproxy 0.1.0 (abc1234, debug)"`
pub fn version_string() -> String {
    format!("veilproxy {VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}
