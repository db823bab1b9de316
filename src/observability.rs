//! Logging conventions for worker events.
//!
//! Events use `tracing` with the single target below and an `event` field
//! for filtering. The library never installs a subscriber; the binary
//! configures one on stderr so the output stream stays reserved for the
//! encoded result.

/// Target for all worker log events.
pub(crate) const WORKER_TARGET: &str = "compact_worker";

/// Macro for info-level log events.
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::WORKER_TARGET, $($field)*)
    };
}

/// Macro for debug-level log events.
macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::WORKER_TARGET, $($field)*)
    };
}

/// Macro for error-level log events.
macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::WORKER_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
