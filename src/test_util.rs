//! Shared fixtures for unit tests.

use crate::protocol::{
    CfPath, CompactionRequest, FileMeta, InputLevel, VersionSnapshot,
};

/// File descriptor with a deterministic key range derived from its number.
pub(crate) fn sample_file(number: u64) -> FileMeta {
    FileMeta {
        number,
        file_size: 4096,
        smallest_key: format!("k{number:04}a").into_bytes(),
        largest_key: format!("k{number:04}z").into_bytes(),
        smallest_seqno: number * 100,
        largest_seqno: number * 100 + 99,
    }
}

/// Minimal valid request: two level-0 files compacting into level 1.
pub(crate) fn sample_request(job_id: u32, cf_dir: &str) -> CompactionRequest {
    CompactionRequest {
        job_id,
        cf_id: 4,
        cf_name: "default".to_string(),
        inputs: vec![InputLevel {
            level: 0,
            files: vec![sample_file(11), sample_file(12)],
        }],
        output_level: 1,
        target_file_size: 64 << 20,
        max_compaction_bytes: 256 << 20,
        max_subcompactions: 1,
        version_state: VersionSnapshot {
            next_file_number: 42,
            last_sequence: 9000,
            manifest_file_number: 5,
        },
        cf_paths: vec![CfPath {
            path: cf_dir.to_string(),
            target_size: 0,
        }],
        score: 1.0,
        ..CompactionRequest::default()
    }
}
