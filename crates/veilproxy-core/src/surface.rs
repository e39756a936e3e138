//! Externally callable operation groups.
//!
//! A surface validates its arguments, stamps a fresh [`CorrelationId`] on
//! the resulting command, enqueues it and returns the id without waiting
//! for the daemon core. Results arrive later as `Response` notifications.
//!
//! [`CorrelationId`]: crate::correlation::CorrelationId

/// Account-level operations.
pub mod control;
/// Device-level operations and the device read cache.
pub mod devices;

pub use control::ControlSurface;
pub use devices::DeviceSurface;

use crate::queue::QueueClosed;

/// Errors returned synchronously by surface operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error(transparent)]
    QueueClosed(#[from] QueueClosed),
}

/// Presence-only check: the value must be non-empty after trimming.
pub(crate) fn require(name: &'static str, value: &str) -> Result<(), SurfaceError> {
    if value.trim().is_empty() {
        return Err(SurfaceError::MissingArgument(name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require() {
        assert!(require("identity", "alice").is_ok());
        assert_eq!(
            require("identity", "  "),
            Err(SurfaceError::MissingArgument("identity"))
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            SurfaceError::MissingArgument("file_path").to_string(),
            "missing required argument: file_path"
        );
        assert!(
            SurfaceError::from(QueueClosed)
                .to_string()
                .contains("not running")
        );
    }
}
