//! Contract with the compaction engine proper.
//!
//! The merge itself is an external collaborator. The worker prepares the
//! engine under the process-wide coordination lock, runs it outside the
//! lock, and records whatever status it returns.

use std::{future::Future, pin::Pin};

use thiserror::Error;

use crate::{protocol::EngineStatus, session::CompactionSession, stats::StatsHub};

/// Failure raised while preparing the engine, before it owns the outcome
/// channel. Treated as a worker fault, unlike a status returned from the
/// execution step.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine rejected the session during preparation.
    #[error("engine preparation failed: {0}")]
    Prepare(String),
}

/// A compaction engine executes exactly one session per worker process.
///
/// `prepare` runs under the coordination lock per the engine's external
/// threading contract; `run` executes outside it. The engine may fan the
/// session out into subjobs, each addressing its own slot of the stats hub
/// by the index it assigns.
pub trait CompactionEngine: Send {
    /// Preparation step: subjob boundary planning, file handle setup.
    fn prepare<'a>(
        &'a mut self,
        session: &'a CompactionSession,
    ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>>;

    /// Execution step. The returned status is recorded verbatim in the
    /// result, success or failure.
    fn run<'a>(
        &'a mut self,
        session: &'a CompactionSession,
        stats: &'a StatsHub,
    ) -> Pin<Box<dyn Future<Output = EngineStatus> + Send + 'a>>;
}

/// Stand-in engine that performs no merge work.
///
/// Deployments wire a real engine through [`crate::worker::run_job`]; this
/// one keeps the pipeline exercisable end to end and reports success after
/// touching the first subjob slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEngine;

impl CompactionEngine for NoopEngine {
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
            let slots = stats.subjobs();
            if let Some(slot) = slots.slot(0) {
                slot.mark();
            }
            EngineStatus::ok()
        })
    }
}
