//! Assembly of the compaction descriptor for one job.

use thiserror::Error;

use crate::{
    extensions::ExtensionSet,
    protocol::{
        CompactionReason, CompactionRequest, CompressionKind, CompressionOptions, FileMeta,
    },
    remap::{DirMapping, RemapError},
    version::{Version, MAX_LEVEL},
};

/// Errors from session assembly.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A column-family directory failed to translate.
    #[error(transparent)]
    Remap(#[from] RemapError),
    /// The request and recovered state do not describe a runnable job.
    #[error("invalid session: {0}")]
    Invalid(&'static str),
}

/// Input files of one level, after recovery substituted the authoritative
/// descriptors.
#[derive(Debug, Clone)]
pub struct SessionInputs {
    /// Level the files currently live on.
    pub level: u32,
    /// Recovered file descriptors for that level.
    pub files: Vec<FileMeta>,
}

/// Everything the engine needs to execute one compaction, bound to the
/// recovered storage-state view.
#[derive(Clone, Debug)]
pub struct CompactionSession {
    /// Pluggable extensions bound for this job; unset roles fall back to
    /// the engine's built-in defaults.
    pub extensions: ExtensionSet,
    /// Job identifier.
    pub job_id: u32,
    /// Column-family identifier.
    pub cf_id: u32,
    /// Column-family name.
    pub cf_name: String,
    /// Per-level inputs. Recovered descriptors, not the request's advisory
    /// copies.
    pub inputs: Vec<SessionInputs>,
    /// Level receiving the merged output.
    pub output_level: u32,
    /// Index into `paths` of the output directory; the job directory is
    /// always the last, highest-index path.
    pub output_path_index: usize,
    /// Worker-local storage paths: every translated column-family
    /// directory, then the job output directory.
    pub paths: Vec<String>,
    /// Worker-local job output directory.
    pub output_dir: String,
    /// Target size of each output file.
    pub target_file_size: u64,
    /// Byte budget for the whole compaction.
    pub max_compaction_bytes: u64,
    /// Output compression choice.
    pub compression: CompressionKind,
    /// Output compression tuning.
    pub compression_opts: CompressionOptions,
    /// Upper bound on parallel subjobs.
    pub max_subcompactions: u32,
    /// Files one level below the output level.
    pub grandparents: Vec<FileMeta>,
    /// Live snapshot sequence numbers.
    pub snapshots: Vec<u64>,
    /// Earliest snapshot a write conflict may care about.
    pub earliest_write_conflict_snapshot: u64,
    /// Timestamp-retention low-water-mark.
    pub full_history_ts_low: Vec<u8>,
    /// Write-buffer sizing forwarded to the engine.
    pub db_write_buffer_size: u64,
    /// Whether output files are verified after writing.
    pub paranoid_file_checks: bool,
    /// Manual rather than automatic compaction.
    pub manual_compaction: bool,
    /// Priority score the host planner computed.
    pub score: f64,
    /// Whole-level deletion compaction.
    pub deletion_compaction: bool,
    /// Scheduling reason code.
    pub reason: CompactionReason,
    /// Host database identity.
    pub db_id: String,
    /// Host database session identity.
    pub db_session_id: String,
    /// First file number the job may allocate, from the recovered state.
    pub next_file_number: u64,
    /// Last sequence number visible to the job, from the recovered state.
    pub last_sequence: u64,
}

impl CompactionSession {
    /// Bind the request to the recovered storage-state view.
    ///
    /// The recovered file lists are authoritative; the request's own input
    /// descriptors only seeded the manifest.
    pub fn build(
        mapping: &DirMapping,
        request: &CompactionRequest,
        version: &Version,
        extensions: ExtensionSet,
    ) -> Result<Self, SessionError> {
        if request.output_level as usize >= MAX_LEVEL {
            return Err(SessionError::Invalid("output level out of range"));
        }
        let first_cf_path = request
            .cf_paths
            .first()
            .ok_or(SessionError::Invalid("no column family paths"))?;

        let mut paths = Vec::with_capacity(request.cf_paths.len() + 1);
        for cf_path in &request.cf_paths {
            paths.push(mapping.translate(&cf_path.path)?);
        }
        let output_dir = mapping.output_dir(&first_cf_path.path, request.job_id)?;
        let output_path_index = paths.len();
        paths.push(output_dir.clone());

        let mut inputs = Vec::with_capacity(request.inputs.len());
        for level in &request.inputs {
            inputs.push(SessionInputs {
                level: level.level,
                files: version.level_files(level.level).to_vec(),
            });
        }
        if inputs.iter().all(|level| level.files.is_empty()) {
            return Err(SessionError::Invalid("no input files after recovery"));
        }

        Ok(Self {
            extensions,
            job_id: request.job_id,
            cf_id: version.cf_id,
            cf_name: version.cf_name.clone(),
            inputs,
            output_level: request.output_level,
            output_path_index,
            paths,
            output_dir,
            target_file_size: request.target_file_size,
            max_compaction_bytes: request.max_compaction_bytes,
            compression: request.compression,
            compression_opts: request.compression_opts,
            max_subcompactions: request.max_subcompactions,
            grandparents: request.grandparents.clone(),
            snapshots: request.snapshots.clone(),
            earliest_write_conflict_snapshot: request.earliest_write_conflict_snapshot,
            full_history_ts_low: request.full_history_ts_low.clone(),
            db_write_buffer_size: request.db_write_buffer_size,
            paranoid_file_checks: request.paranoid_file_checks,
            manual_compaction: request.manual_compaction,
            score: request.score,
            deletion_compaction: request.deletion_compaction,
            reason: request.reason,
            db_id: request.db_id.clone(),
            db_session_id: request.db_session_id.clone(),
            next_file_number: version.next_file_number,
            last_sequence: version.last_sequence,
        })
    }
}
