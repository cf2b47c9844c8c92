//! Export job metrics
//!
//! Thread-safe counters shared between the job and its executions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::batch::ExportStats;

#[derive(Debug, Clone)]
pub struct ExportMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    slices_executed: AtomicUsize,
    slices_failed: AtomicUsize,
    batches_written: AtomicUsize,
    records_exported: AtomicUsize,
    files_copied: AtomicUsize,
    files_missing: AtomicUsize,
    /// Mark updates lost to a concurrent writer
    cas_conflicts: AtomicUsize,
    /// Runs refused because another run was active
    runs_skipped: AtomicUsize,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSummary {
    pub slices_executed: usize,
    pub slices_failed: usize,
    pub batches_written: usize,
    pub records_exported: usize,
    pub files_copied: usize,
    pub files_missing: usize,
    pub cas_conflicts: usize,
    pub runs_skipped: usize,
}

impl Default for ExportMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    /// Record a successful slice and what it exported
    pub fn record_slice(&self, stats: &ExportStats) {
        self.inner.slices_executed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .batches_written
            .fetch_add(stats.batches_written, Ordering::Relaxed);
        self.inner
            .records_exported
            .fetch_add(stats.records, Ordering::Relaxed);
        self.inner
            .files_copied
            .fetch_add(stats.files_copied, Ordering::Relaxed);
        self.inner
            .files_missing
            .fetch_add(stats.files_missing, Ordering::Relaxed);
    }

    pub fn record_slice_failed(&self) {
        self.inner.slices_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cas_conflict(&self) {
        self.inner.cas_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_skipped(&self) {
        self.inner.runs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slices_executed(&self) -> usize {
        self.inner.slices_executed.load(Ordering::Relaxed)
    }

    pub fn slices_failed(&self) -> usize {
        self.inner.slices_failed.load(Ordering::Relaxed)
    }

    pub fn cas_conflicts(&self) -> usize {
        self.inner.cas_conflicts.load(Ordering::Relaxed)
    }

    pub fn runs_skipped(&self) -> usize {
        self.inner.runs_skipped.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            slices_executed: self.slices_executed(),
            slices_failed: self.slices_failed(),
            batches_written: self.inner.batches_written.load(Ordering::Relaxed),
            records_exported: self.inner.records_exported.load(Ordering::Relaxed),
            files_copied: self.inner.files_copied.load(Ordering::Relaxed),
            files_missing: self.inner.files_missing.load(Ordering::Relaxed),
            cas_conflicts: self.cas_conflicts(),
            runs_skipped: self.runs_skipped(),
        }
    }

    /// Emit the current totals as one structured log line
    pub fn log_summary(&self) {
        let s = self.summary();
        tracing::info!(
            slices_executed = s.slices_executed,
            slices_failed = s.slices_failed,
            batches_written = s.batches_written,
            records_exported = s.records_exported,
            files_copied = s.files_copied,
            files_missing = s.files_missing,
            cas_conflicts = s.cas_conflicts,
            runs_skipped = s.runs_skipped,
            "Legal hold export totals"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ExportMetrics::new();
        assert_eq!(metrics.summary(), MetricsSummary::default());
    }

    #[test]
    fn test_record_slice_accumulates() {
        let metrics = ExportMetrics::new();
        let stats = ExportStats {
            fetches: 4,
            batches_written: 3,
            records: 25,
            files_copied: 2,
            files_missing: 1,
        };

        metrics.record_slice(&stats);
        metrics.record_slice(&stats);
        metrics.record_slice_failed();
        metrics.record_cas_conflict();
        metrics.record_run_skipped();

        let summary = metrics.summary();
        assert_eq!(summary.slices_executed, 2);
        assert_eq!(summary.slices_failed, 1);
        assert_eq!(summary.batches_written, 6);
        assert_eq!(summary.records_exported, 50);
        assert_eq!(summary.files_copied, 4);
        assert_eq!(summary.files_missing, 2);
        assert_eq!(summary.cas_conflicts, 1);
        assert_eq!(summary.runs_skipped, 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = ExportMetrics::new();
        let clone = metrics.clone();

        clone.record_cas_conflict();

        assert_eq!(metrics.cas_conflicts(), 1);
    }
}
