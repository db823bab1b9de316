//! Wire model for the one-request/one-result worker protocol.
//!
//! The host writes one encoded [`CompactionRequest`] to the worker's input
//! stream and reads one encoded [`WorkerResult`] back. The request is read
//! fully before any processing begins; the result is written exactly once
//! per invocation, on the success path and on every failure path after a
//! request was read.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::version::MAX_LEVEL;

/// Errors from stream decoding, encoding, and request validation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Stream read or write failed.
    #[error("protocol io error: {0}")]
    Io(#[from] std::io::Error),
    /// The byte stream does not decode to the expected envelope.
    #[error("protocol codec error: {0}")]
    Codec(#[from] bincode::Error),
    /// The decoded request violates a structural invariant.
    #[error("invalid request: {0}")]
    Invalid(&'static str),
}

/// Descriptor of one input sorted-run file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// File number within the host database.
    pub number: u64,
    /// Size in bytes.
    pub file_size: u64,
    /// Smallest user key contained in the file.
    pub smallest_key: Vec<u8>,
    /// Largest user key contained in the file.
    pub largest_key: Vec<u8>,
    /// Lowest sequence number contained in the file.
    pub smallest_seqno: u64,
    /// Highest sequence number contained in the file.
    pub largest_seqno: u64,
}

/// Input files of one level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputLevel {
    /// Level the files currently live on.
    pub level: u32,
    /// Files to merge from that level.
    pub files: Vec<FileMeta>,
}

/// Column-family storage path with its target size.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CfPath {
    /// Host-visible directory path.
    pub path: String,
    /// Byte budget the host assigns to this path.
    pub target_size: u64,
}

/// Version-state snapshot taken by the host when the job was planned.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VersionSnapshot {
    /// First file number the job may allocate.
    pub next_file_number: u64,
    /// Last sequence number visible to the job.
    pub last_sequence: u64,
    /// File number of the metadata log the worker will synthesize.
    pub manifest_file_number: u64,
}

/// Serialized constructor for one pluggable extension.
///
/// An empty `class` leaves the role unset and the engine default applies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginSpec {
    /// Registered class name.
    pub class: String,
    /// JSON constructor parameters.
    pub params: String,
    /// Serialized prior state, restored after construction when non-empty.
    pub state: Vec<u8>,
}

/// Compression applied to output files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionKind {
    /// No compression.
    #[default]
    None,
    /// Snappy block compression.
    Snappy,
    /// LZ4 block compression.
    Lz4,
    /// Zstandard block compression.
    Zstd,
}

/// Tuning knobs for the chosen compression.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CompressionOptions {
    /// Codec-specific compression level.
    pub level: i32,
    /// Dictionary budget in bytes, zero for none.
    pub max_dict_bytes: u32,
}

/// Why the host scheduled this compaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompactionReason {
    /// Reason not communicated.
    #[default]
    Unknown,
    /// Level-0 file count crossed its trigger.
    LevelL0FilesNum,
    /// A level exceeded its size target.
    LevelMaxLevelSize,
    /// Operator-requested compaction.
    ManualCompaction,
    /// Files were explicitly marked for compaction.
    FilesMarkedForCompaction,
    /// Entries aged past their time-to-live.
    TtlExpired,
}

/// One compaction job, decoded fully from the input stream before any
/// processing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompactionRequest {
    /// Job identifier, unique per host database.
    pub job_id: u32,
    /// Column-family identifier.
    pub cf_id: u32,
    /// Column-family name.
    pub cf_name: String,
    /// Input file descriptors per level. Advisory: they seed the synthetic
    /// manifest, and the recovered state is authoritative afterwards.
    pub inputs: Vec<InputLevel>,
    /// Level receiving the merged output.
    pub output_level: u32,
    /// Target size of each output file.
    pub target_file_size: u64,
    /// Byte budget for the whole compaction.
    pub max_compaction_bytes: u64,
    /// Output compression choice.
    pub compression: CompressionKind,
    /// Output compression tuning.
    pub compression_opts: CompressionOptions,
    /// Upper bound on parallel subjobs; sizes the per-subjob result array.
    pub max_subcompactions: u32,
    /// Files one level below the output level, used by the engine for
    /// size-amplification decisions.
    pub grandparents: Vec<FileMeta>,
    /// Host version-state snapshot.
    pub version_state: VersionSnapshot,
    /// Write-buffer sizing forwarded to the engine.
    pub db_write_buffer_size: u64,
    /// User comparator, when not the engine default.
    pub comparator: PluginSpec,
    /// Merge operator.
    pub merge_operator: PluginSpec,
    /// Compaction-filter factory.
    pub compaction_filter_factory: PluginSpec,
    /// Table (storage-format) factory.
    pub table_factory: PluginSpec,
    /// Key-prefix extractor.
    pub prefix_extractor: PluginSpec,
    /// Output-file partitioner factory.
    pub partitioner_factory: PluginSpec,
    /// Column-family storage paths with target sizes.
    pub cf_paths: Vec<CfPath>,
    /// Live snapshot sequence numbers.
    pub snapshots: Vec<u64>,
    /// Earliest snapshot a write conflict may care about.
    pub earliest_write_conflict_snapshot: u64,
    /// Timestamp-retention low-water-mark, empty when timestamps are off.
    pub full_history_ts_low: Vec<u8>,
    /// Whether output files are verified after writing.
    pub paranoid_file_checks: bool,
    /// Manual (operator-requested) rather than automatic compaction.
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
}

impl CompactionRequest {
    /// Check the structural invariants every job must satisfy.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !self.inputs.iter().any(|level| !level.files.is_empty()) {
            return Err(ProtocolError::Invalid("no input files in any level"));
        }
        if self.output_level as usize >= MAX_LEVEL {
            return Err(ProtocolError::Invalid("output level out of range"));
        }
        if self.cf_paths.is_empty() {
            return Err(ProtocolError::Invalid("no column family paths"));
        }
        if self.max_subcompactions == 0 {
            return Err(ProtocolError::Invalid("max_subcompactions must be at least 1"));
        }
        Ok(())
    }
}

/// Outcome classification carried in an [`EngineStatus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// The job completed.
    #[default]
    Ok,
    /// An I/O fault during the merge.
    IoError,
    /// Input or metadata failed integrity checks.
    Corruption,
    /// The request or an extension was malformed.
    InvalidArgument,
    /// The job stopped before completion.
    Aborted,
    /// Unclassified failure.
    Unknown,
}

/// Engine-reported outcome, carried back to the host as data.
///
/// A failed status is an expected execution outcome for the host to act
/// on; it is never escalated to a worker fault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Outcome classification.
    pub code: StatusCode,
    /// Human-readable detail, empty on success.
    pub message: String,
}

impl EngineStatus {
    /// Successful outcome.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Failed outcome with a classification and detail message.
    pub fn failed(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the outcome is success.
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

/// Aggregated job counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    /// Wall-clock duration of the job in microseconds.
    pub elapsed_micros: u64,
    /// Bytes read from input files.
    pub bytes_read: u64,
    /// Bytes written to output files.
    pub bytes_written: u64,
    /// Records consumed from the inputs.
    pub input_records: u64,
    /// Records written to the outputs.
    pub output_records: u64,
    /// Output files produced.
    pub output_files: u64,
}

/// Extension-reported counters, snapshotted from the runtime atomics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionStats {
    /// Entries the extension inspected.
    pub entries_inspected: u64,
    /// Entries the extension dropped.
    pub entries_dropped: u64,
    /// Payload bytes the extension processed.
    pub bytes_processed: u64,
}

/// Result slot for one potential parallel subjob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjobReport {
    /// Whether the engine assigned work to this slot.
    pub touched: bool,
    /// Counters reported by extensions bound at the subjob level.
    pub extension_stats: ExtensionStats,
}

/// Mutable accumulator returned to the host exactly once per invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerResult {
    /// Overall outcome: the engine's status, or the failure that stopped
    /// the job before the engine ran.
    pub status: EngineStatus,
    /// Aggregated job counters.
    pub job_stats: JobStats,
    /// One slot per potential parallel subjob, pre-sized from
    /// `max_subcompactions`.
    pub sub_compacts: Vec<SubjobReport>,
    /// Counters from extensions bound at the whole-job level.
    pub extension_stats: ExtensionStats,
}

impl WorkerResult {
    /// Pre-size the per-subjob array from the request's subjob limit.
    pub fn sized_for(max_subcompactions: u32) -> Self {
        Self {
            sub_compacts: vec![SubjobReport::default(); max_subcompactions as usize],
            ..Self::default()
        }
    }
}

/// Read the single request, fully, before any processing begins.
pub async fn read_request<R>(reader: &mut R) -> Result<CompactionRequest, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw).await?;
    Ok(bincode::deserialize(&raw)?)
}

/// Encode the result to the output stream.
pub async fn write_result<W>(writer: &mut W, result: &WorkerResult) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let raw = bincode::serialize(result)?;
    writer.write_all(&raw).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::test_util::sample_request;

    #[tokio::test]
    async fn request_round_trip() {
        let request = sample_request(7, "/mnt/host/db/cf0");
        let raw = bincode::serialize(&request).unwrap();

        let mut cursor = Cursor::new(raw);
        let decoded = read_request(&mut cursor).await.unwrap();
        assert_eq!(decoded.job_id, 7);
        assert_eq!(decoded.cf_name, request.cf_name);
        assert_eq!(decoded.inputs[0].files, request.inputs[0].files);
        assert_eq!(decoded.version_state.last_sequence, request.version_state.last_sequence);
    }

    #[tokio::test]
    async fn result_round_trip() {
        let mut result = WorkerResult::sized_for(3);
        result.status = EngineStatus::failed(StatusCode::IoError, "disk full");
        result.job_stats.bytes_written = 512;
        result.sub_compacts[1].touched = true;

        let mut raw = Vec::new();
        write_result(&mut raw, &result).await.unwrap();

        let decoded: WorkerResult = bincode::deserialize(&raw).unwrap();
        assert_eq!(decoded.status, result.status);
        assert_eq!(decoded.job_stats, result.job_stats);
        assert_eq!(decoded.sub_compacts.len(), 3);
        assert!(decoded.sub_compacts[1].touched);
    }

    #[tokio::test]
    async fn garbage_bytes_fail_to_decode() {
        let mut cursor = Cursor::new(vec![0xff; 16]);
        let err = read_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Codec(_)));
    }

    #[test]
    fn validate_rejects_structural_violations() {
        let base = sample_request(1, "/mnt/host/db/cf0");
        base.validate().unwrap();

        let mut no_files = base.clone();
        no_files.inputs = vec![InputLevel { level: 0, files: Vec::new() }];
        assert!(no_files.validate().is_err());

        let mut bad_level = base.clone();
        bad_level.output_level = MAX_LEVEL as u32;
        assert!(bad_level.validate().is_err());

        let mut no_paths = base.clone();
        no_paths.cf_paths.clear();
        assert!(no_paths.validate().is_err());

        let mut no_subjobs = base;
        no_subjobs.max_subcompactions = 0;
        assert!(no_subjobs.validate().is_err());
    }

    #[test]
    fn result_is_presized_from_subjob_limit() {
        let result = WorkerResult::sized_for(4);
        assert_eq!(result.sub_compacts.len(), 4);
        assert!(result.sub_compacts.iter().all(|slot| !slot.touched));
    }
}
