//! Remote execution side of a disaggregated compaction scheme.
//!
//! A host database owns the real LSM tree; instead of merging sorted runs
//! locally it serializes one compaction job to this worker. The worker
//! rebuilds just enough version state to run that single job in isolation,
//! hands it to a compaction engine, and ships the outcome back over its
//! output stream. One job per process invocation; process isolation is the
//! unit of fault containment.

mod observability;

/// Host/worker directory remapping, read once at process start.
pub mod remap;

/// Wire model for the one-request/one-result protocol.
pub mod protocol;

/// Runtime statistics shared between the envelope, the engine, and bound
/// extensions.
pub mod stats;

/// Pluggable engine extensions and their result binding.
pub mod extensions;

/// Minimal on-disk version history for a single job.
pub mod version;

/// Compaction session assembly.
pub mod session;

/// Contract with the compaction engine proper.
pub mod engine;

/// Failure-safe execution envelope.
pub mod worker;

#[cfg(test)]
mod test_util;
