//! One-shot remote compaction worker process.
//!
//! Reads a single encoded request from stdin, executes it, and writes the
//! encoded result to stdout. stderr carries diagnostics only. Exit code 0
//! covers any completed run, engine-reported failure included; a local
//! fault exits 1 after the best-effort result is written.

use std::process::ExitCode;

use compaction_worker::{
    engine::NoopEngine,
    extensions::ExtensionRegistry,
    protocol::{self, EngineStatus, StatusCode, WorkerResult},
    remap::DirMapping,
    worker,
};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Configuration faults precede request I/O: terminate without output.
    let mapping = match DirMapping::from_env() {
        Ok(mapping) => mapping,
        Err(err) => {
            eprintln!("compact-worker: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    let request = match protocol::read_request(&mut stdin).await {
        Ok(request) => request,
        Err(err) => {
            // A request was read; the host still gets a result.
            let result = WorkerResult {
                status: EngineStatus::failed(StatusCode::InvalidArgument, err.to_string()),
                ..WorkerResult::default()
            };
            let _ = protocol::write_result(&mut stdout, &result).await;
            eprintln!("compact-worker: {err}");
            return ExitCode::FAILURE;
        }
    };

    let registry = ExtensionRegistry::new();
    let mut engine = NoopEngine;
    let (result, fault) = worker::run_job(&mapping, &registry, &request, &mut engine).await;

    if let Err(err) = protocol::write_result(&mut stdout, &result).await {
        eprintln!("compact-worker: {err}");
        return ExitCode::FAILURE;
    }

    match fault {
        None => ExitCode::SUCCESS,
        Some(err) => {
            eprintln!("compact-worker: {err}");
            ExitCode::FAILURE
        }
    }
}
