//! Runtime statistics for one job.
//!
//! Extensions and the engine write counters while the job runs; the
//! envelope snapshots them into the serializable result at emission time.
//! Per-subjob slots are index-addressed and disjoint, and every counter is
//! atomic, so concurrent subjobs write without locking.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use crate::protocol::{ExtensionStats, JobStats, SubjobReport, WorkerResult};

/// Atomic counters an extension reports through.
#[derive(Debug, Default)]
pub struct ExtensionCounters {
    entries_inspected: AtomicU64,
    entries_dropped: AtomicU64,
    bytes_processed: AtomicU64,
}

impl ExtensionCounters {
    /// Count entries the extension inspected.
    pub fn add_inspected(&self, n: u64) {
        self.entries_inspected.fetch_add(n, Ordering::Relaxed);
    }

    /// Count entries the extension dropped.
    pub fn add_dropped(&self, n: u64) {
        self.entries_dropped.fetch_add(n, Ordering::Relaxed);
    }

    /// Count payload bytes the extension processed.
    pub fn add_bytes(&self, n: u64) {
        self.bytes_processed.fetch_add(n, Ordering::Relaxed);
    }

    /// Plain snapshot for the result.
    pub fn snapshot(&self) -> ExtensionStats {
        ExtensionStats {
            entries_inspected: self.entries_inspected.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
        }
    }
}

/// One result slot, owned by whichever subjob the engine assigns the index
/// to.
#[derive(Debug, Default)]
pub struct SubjobSlot {
    touched: AtomicBool,
    counters: ExtensionCounters,
}

impl SubjobSlot {
    /// Record that the engine assigned work to this slot.
    pub fn mark(&self) {
        self.touched.store(true, Ordering::Relaxed);
    }

    /// Counters for extensions bound at the subjob level.
    pub fn counters(&self) -> &ExtensionCounters {
        &self.counters
    }

    fn report(&self) -> SubjobReport {
        SubjobReport {
            touched: self.touched.load(Ordering::Relaxed),
            extension_stats: self.counters.snapshot(),
        }
    }
}

/// Pre-sized, disjoint per-subjob slots.
#[derive(Debug)]
pub struct SubjobSlots {
    slots: Vec<SubjobSlot>,
}

impl SubjobSlots {
    fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| SubjobSlot::default()).collect(),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the job admits no subjobs at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot for the given subjob index.
    pub fn slot(&self, index: usize) -> Option<&SubjobSlot> {
        self.slots.get(index)
    }
}

/// Job-level counters the engine updates while running.
#[derive(Debug, Default)]
pub struct JobCounters {
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    input_records: AtomicU64,
    output_records: AtomicU64,
    output_files: AtomicU64,
}

impl JobCounters {
    /// Count bytes read from input files.
    pub fn add_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    /// Count bytes written to output files.
    pub fn add_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    /// Count records consumed from the inputs.
    pub fn add_input_records(&self, n: u64) {
        self.input_records.fetch_add(n, Ordering::Relaxed);
    }

    /// Count records written to the outputs.
    pub fn add_output_records(&self, n: u64) {
        self.output_records.fetch_add(n, Ordering::Relaxed);
    }

    /// Count finished output files.
    pub fn add_output_file(&self) {
        self.output_files.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, elapsed_micros: u64) -> JobStats {
        JobStats {
            elapsed_micros,
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            input_records: self.input_records.load(Ordering::Relaxed),
            output_records: self.output_records.load(Ordering::Relaxed),
            output_files: self.output_files.load(Ordering::Relaxed),
        }
    }
}

/// Every runtime counter of one job.
#[derive(Debug)]
pub struct StatsHub {
    subjobs: Arc<SubjobSlots>,
    aggregate: Arc<ExtensionCounters>,
    job: JobCounters,
}

impl StatsHub {
    /// Allocate counter storage sized from the request's subjob limit.
    pub fn new(max_subcompactions: u32) -> Self {
        Self {
            subjobs: Arc::new(SubjobSlots::new(max_subcompactions as usize)),
            aggregate: Arc::new(ExtensionCounters::default()),
            job: JobCounters::default(),
        }
    }

    /// Shared handle to the per-subjob slots.
    pub fn subjobs(&self) -> Arc<SubjobSlots> {
        Arc::clone(&self.subjobs)
    }

    /// Shared handle to the whole-job extension counters.
    pub fn aggregate(&self) -> Arc<ExtensionCounters> {
        Arc::clone(&self.aggregate)
    }

    /// Job-level counters for the engine.
    pub fn job(&self) -> &JobCounters {
        &self.job
    }

    /// Snapshot every counter into the result.
    pub fn capture_into(&self, result: &mut WorkerResult, elapsed_micros: u64) {
        result.job_stats = self.job.snapshot(elapsed_micros);
        result.extension_stats = self.aggregate.snapshot();
        for (index, report) in result.sub_compacts.iter_mut().enumerate() {
            if let Some(slot) = self.subjobs.slot(index) {
                *report = slot.report();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_disjoint_by_index() {
        let hub = StatsHub::new(3);
        let slots = hub.subjobs();
        slots.slot(0).unwrap().counters().add_inspected(5);
        slots.slot(2).unwrap().counters().add_inspected(7);
        slots.slot(2).unwrap().mark();

        let mut result = WorkerResult::sized_for(3);
        hub.capture_into(&mut result, 0);
        assert_eq!(result.sub_compacts[0].extension_stats.entries_inspected, 5);
        assert_eq!(result.sub_compacts[1].extension_stats.entries_inspected, 0);
        assert_eq!(result.sub_compacts[2].extension_stats.entries_inspected, 7);
        assert!(!result.sub_compacts[0].touched);
        assert!(result.sub_compacts[2].touched);
    }

    #[test]
    fn aggregate_and_job_counters_land_in_result() {
        let hub = StatsHub::new(1);
        hub.aggregate().add_dropped(3);
        hub.aggregate().add_bytes(100);
        hub.job().add_bytes_read(2048);
        hub.job().add_output_file();

        let mut result = WorkerResult::sized_for(1);
        hub.capture_into(&mut result, 1234);
        assert_eq!(result.extension_stats.entries_dropped, 3);
        assert_eq!(result.extension_stats.bytes_processed, 100);
        assert_eq!(result.job_stats.bytes_read, 2048);
        assert_eq!(result.job_stats.output_files, 1);
        assert_eq!(result.job_stats.elapsed_micros, 1234);
    }

    #[test]
    fn out_of_range_slot_is_none() {
        let hub = StatsHub::new(2);
        assert!(hub.subjobs().slot(2).is_none());
        assert_eq!(hub.subjobs().len(), 2);
    }
}
