//! Minimal on-disk version history for a single compaction job.
//!
//! The worker synthesizes a metadata log describing exactly one column
//! family holding the request's input files, points the current-pointer
//! file at it, then re-reads everything through the normal recovery path.
//! The round trip is deliberate: state the recovery code rejects means the
//! request and engine disagree, and the job must abort rather than run on
//! unchecked metadata.

pub mod edit;
pub mod log;
pub mod set;

use thiserror::Error;

pub use edit::VersionEdit;
pub use set::VersionSet;

use crate::protocol::FileMeta;

/// Number of levels in the engine's level layout.
pub const MAX_LEVEL: usize = 7;

/// Name of the current-pointer file.
pub const CURRENT_FILE: &str = "CURRENT";

/// Conventional metadata-log file name for a file number.
pub fn manifest_file_name(number: u64) -> String {
    format!("MANIFEST-{number:06}")
}

/// Errors from metadata-log writing and recovery.
#[derive(Debug, Error)]
pub enum VersionError {
    /// Directory creation, log, or pointer I/O failed.
    #[error("version io error: {0}")]
    Io(#[from] std::io::Error),
    /// The metadata log or pointer does not describe a usable state.
    #[error("manifest corrupt: {0}")]
    Corrupt(&'static str),
}

/// Recovered storage-state view: one column family and its level file
/// lists.
#[derive(Debug, Clone)]
pub struct Version {
    /// Column-family identifier.
    pub cf_id: u32,
    /// Column-family name.
    pub cf_name: String,
    /// Monotonic file-number counter the job continues from.
    pub next_file_number: u64,
    /// Last sequence number visible to the job.
    pub last_sequence: u64,
    level_slice: [Vec<FileMeta>; MAX_LEVEL],
}

impl Version {
    /// Files of one level; empty for any level outside the layout.
    pub fn level_files(&self, level: u32) -> &[FileMeta] {
        self.level_slice
            .get(level as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total file count across all levels.
    pub fn file_count(&self) -> usize {
        self.level_slice.iter().map(Vec::len).sum()
    }
}
