//! Failure-safe execution envelope for one compaction job.
//!
//! The envelope owns the result for the lifetime of the job and always
//! hands one back: engine-reported failures travel inside the result as
//! data, while local faults short-circuit to a best-effort result plus the
//! fault itself for the caller to surface.

use std::time::Instant;

use async_lock::Mutex;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::{
    engine::{CompactionEngine, EngineError},
    extensions::{ExtensionError, ExtensionRegistry, ExtensionSet},
    observability::{log_debug, log_error, log_info},
    protocol::{
        CompactionRequest, EngineStatus, ProtocolError, StatusCode, WorkerResult,
    },
    remap::{DirMapping, RemapError},
    session::{CompactionSession, SessionError},
    stats::StatsHub,
    version::{VersionError, VersionSet},
};

/// A locally fatal defect. Expected compaction outcomes travel as
/// [`EngineStatus`] data instead; the host is the sole recovery authority
/// and the worker never retries internally.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Configuration or path translation failed.
    #[error("config error: {0}")]
    Remap(#[from] RemapError),
    /// The request violates the protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Plugin instantiation or state restore failed.
    #[error("extension error: {0}")]
    Extension(#[from] ExtensionError),
    /// Version bootstrap or recovery failed.
    #[error("version bootstrap error: {0}")]
    Version(#[from] VersionError),
    /// Session assembly failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    /// The engine rejected the session during preparation.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl WorkerError {
    /// Status code carried in the best-effort result for this fault.
    fn status_code(&self) -> StatusCode {
        match self {
            WorkerError::Version(VersionError::Io(_)) => StatusCode::IoError,
            WorkerError::Version(_) => StatusCode::Corruption,
            WorkerError::Engine(_) => StatusCode::Aborted,
            WorkerError::Protocol(ProtocolError::Io(_)) => StatusCode::IoError,
            _ => StatusCode::InvalidArgument,
        }
    }
}

/// Stages of one job, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Decoding done, nothing bootstrapped yet.
    Initializing,
    /// Version state written and recovered.
    Bootstrapped,
    /// Engine preparation finished, lock released.
    Prepared,
    /// Engine execution in progress.
    Running,
    /// Execution returned a status.
    Completed,
    /// A local fault stopped the job.
    Faulted,
}

/// The engine's preparation step must not run concurrently with another
/// preparation in this process, per its external locking contract. The
/// lock is released before execution, so the long merge is never
/// serialized by it.
static PREPARE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Run one job to a result.
///
/// Always produces a result. A fault is handed back alongside it so the
/// caller can emit the result best-effort and then surface the fault
/// through the diagnostic channel.
pub async fn run_job(
    mapping: &DirMapping,
    registry: &ExtensionRegistry,
    request: &CompactionRequest,
    engine: &mut dyn CompactionEngine,
) -> (WorkerResult, Option<WorkerError>) {
    let mut result = WorkerResult::sized_for(request.max_subcompactions);
    let hub = StatsHub::new(request.max_subcompactions);
    let started = Instant::now();

    log_info!(
        event = "job_started",
        job_id = request.job_id,
        cf = %request.cf_name,
        subjobs = request.max_subcompactions,
    );

    match execute(mapping, registry, request, engine, &hub, &mut result).await {
        Ok(()) => {
            hub.capture_into(&mut result, started.elapsed().as_micros() as u64);
            log_info!(
                event = "job_finished",
                job_id = request.job_id,
                ok = result.status.is_ok(),
            );
            (result, None)
        }
        Err(err) => {
            result.status = EngineStatus::failed(err.status_code(), err.to_string());
            hub.capture_into(&mut result, started.elapsed().as_micros() as u64);
            log_error!(
                event = "job_faulted",
                job_id = request.job_id,
                state = ?JobState::Faulted,
                error = %err,
            );
            (result, Some(err))
        }
    }
}

async fn execute(
    mapping: &DirMapping,
    registry: &ExtensionRegistry,
    request: &CompactionRequest,
    engine: &mut dyn CompactionEngine,
    hub: &StatsHub,
    result: &mut WorkerResult,
) -> Result<(), WorkerError> {
    trace_state(request.job_id, JobState::Initializing);
    request.validate()?;

    let extensions = ExtensionSet::instantiate(registry, request, hub)?;

    let output_dir = mapping.output_dir(&request.cf_paths[0].path, request.job_id)?;
    let version_set = VersionSet::bootstrap(&output_dir, request).await?;
    trace_state(request.job_id, JobState::Bootstrapped);

    let session = CompactionSession::build(mapping, request, version_set.current(), extensions)?;

    {
        let _guard = PREPARE_LOCK.lock().await;
        engine.prepare(&session).await?;
    }
    trace_state(request.job_id, JobState::Prepared);

    trace_state(request.job_id, JobState::Running);
    let status = engine.run(&session, hub).await;
    // A failed engine status is an expected outcome for the host to act
    // on, not a worker fault; partial statistics still get reported.
    result.status = status;
    trace_state(request.job_id, JobState::Completed);
    Ok(())
}

fn trace_state(job_id: u32, state: JobState) {
    log_debug!(event = "job_state", job_id = job_id, state = ?state);
}

#[cfg(test)]
mod tests {
    use std::{future::Future, pin::Pin};

    use tempfile::TempDir;

    use super::*;
    use crate::{engine::NoopEngine, test_util::sample_request, version::VersionSet};

    /// Engine whose execution step always reports a failure status.
    struct AlwaysFailsEngine;

    impl CompactionEngine for AlwaysFailsEngine {
        fn prepare<'a>(
            &'a mut self,
            _session: &'a CompactionSession,
        ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }

        fn run<'a>(
            &'a mut self,
            _session: &'a CompactionSession,
            stats: &'a StatsHub,
        ) -> Pin<Box<dyn Future<Output = EngineStatus> + Send + 'a>> {
            Box::pin(async move {
                stats.job().add_bytes_read(1024);
                EngineStatus::failed(StatusCode::IoError, "merge hit a bad block")
            })
        }
    }

    /// Engine that refuses to prepare.
    struct RefusesPreparation;

    impl CompactionEngine for RefusesPreparation {
        fn prepare<'a>(
            &'a mut self,
            _session: &'a CompactionSession,
        ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>> {
            Box::pin(async { Err(EngineError::Prepare("no comparator".to_string())) })
        }

        fn run<'a>(
            &'a mut self,
            _session: &'a CompactionSession,
            _stats: &'a StatsHub,
        ) -> Pin<Box<dyn Future<Output = EngineStatus> + Send + 'a>> {
            Box::pin(async { EngineStatus::ok() })
        }
    }

    fn mapping_into(dir: &TempDir) -> DirMapping {
        DirMapping::new("/mnt/host", dir.path().to_str().unwrap())
    }

    #[tokio::test]
    async fn single_file_job_runs_to_ok_result() {
        let dir = TempDir::new().unwrap();
        let mapping = mapping_into(&dir);
        let registry = ExtensionRegistry::new();
        let mut request = sample_request(7, "/mnt/host/db/cf0");
        request.inputs[0].files.truncate(1);
        let mut engine = NoopEngine;

        let (result, fault) = run_job(&mapping, &registry, &request, &mut engine).await;
        assert!(fault.is_none());
        assert!(result.status.is_ok());
        assert_eq!(result.sub_compacts.len(), 1);
        assert!(result.sub_compacts[0].touched);

        // The job directory and the recovered version reflect the request.
        let output_dir = dir.path().join("db/cf0/job-00000007");
        assert!(output_dir.exists());
        let recovered = VersionSet::recover(&output_dir).await.unwrap();
        assert_eq!(recovered.current().file_count(), 1);
        assert_eq!(recovered.current().level_files(0), &request.inputs[0].files[..]);
    }

    #[tokio::test]
    async fn engine_failure_is_data_not_fault() {
        let dir = TempDir::new().unwrap();
        let mapping = mapping_into(&dir);
        let registry = ExtensionRegistry::new();
        let request = sample_request(11, "/mnt/host/db/cf0");
        let mut engine = AlwaysFailsEngine;

        let (result, fault) = run_job(&mapping, &registry, &request, &mut engine).await;
        assert!(fault.is_none(), "engine status must not escalate");
        assert_eq!(result.status.code, StatusCode::IoError);
        assert_eq!(result.status.message, "merge hit a bad block");
        // Statistics gathered before the failure still report.
        assert_eq!(result.job_stats.bytes_read, 1024);
        assert_eq!(result.sub_compacts.len(), 1);
    }

    #[tokio::test]
    async fn preparation_refusal_is_a_fault_with_a_result() {
        let dir = TempDir::new().unwrap();
        let mapping = mapping_into(&dir);
        let registry = ExtensionRegistry::new();
        let request = sample_request(12, "/mnt/host/db/cf0");
        let mut engine = RefusesPreparation;

        let (result, fault) = run_job(&mapping, &registry, &request, &mut engine).await;
        assert!(matches!(fault, Some(WorkerError::Engine(_))));
        assert_eq!(result.status.code, StatusCode::Aborted);
        assert!(!result.status.message.is_empty());
    }

    #[tokio::test]
    async fn invalid_request_faults_before_bootstrap() {
        let dir = TempDir::new().unwrap();
        let mapping = mapping_into(&dir);
        let registry = ExtensionRegistry::new();
        let mut request = sample_request(13, "/mnt/host/db/cf0");
        request.inputs.clear();
        let mut engine = NoopEngine;

        let (result, fault) = run_job(&mapping, &registry, &request, &mut engine).await;
        assert!(matches!(fault, Some(WorkerError::Protocol(_))));
        assert_eq!(result.status.code, StatusCode::InvalidArgument);
        assert!(!dir.path().join("db/cf0/job-00000013").exists());
    }

    #[tokio::test]
    async fn unknown_extension_class_faults_before_bootstrap() {
        let dir = TempDir::new().unwrap();
        let mapping = mapping_into(&dir);
        let registry = ExtensionRegistry::new();
        let mut request = sample_request(14, "/mnt/host/db/cf0");
        request.merge_operator.class = "nobody-registered-this".to_string();
        let mut engine = NoopEngine;

        let (result, fault) = run_job(&mapping, &registry, &request, &mut engine).await;
        assert!(matches!(fault, Some(WorkerError::Extension(_))));
        assert_eq!(result.status.code, StatusCode::InvalidArgument);
        assert!(!dir.path().join("db/cf0/job-00000014").exists());
    }

    #[tokio::test]
    async fn unmapped_cf_path_faults() {
        let dir = TempDir::new().unwrap();
        let mapping = mapping_into(&dir);
        let registry = ExtensionRegistry::new();
        let request = sample_request(15, "/outside/db/cf0");
        let mut engine = NoopEngine;

        let (result, fault) = run_job(&mapping, &registry, &request, &mut engine).await;
        assert!(matches!(fault, Some(WorkerError::Remap(_))));
        assert!(!result.status.is_ok());
    }
}
