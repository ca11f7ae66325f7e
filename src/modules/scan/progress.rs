use crate::modules::utils::format_duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::info;

const REPORT_EVERY: usize = 10;

/// Shared counters for one scan run. Safe to bump from any number of workers;
/// emits a progress line every tenth processed message and when the last one
/// lands.
#[derive(Debug)]
pub struct ProgressTracker {
    total: AtomicUsize,
    processed: AtomicUsize,
    successful: AtomicUsize,
    failed: AtomicUsize,
    started_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSummary {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub elapsed_seconds: f64,
    pub items_per_second: f64,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            total: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            successful: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        info!("Total messages queued for processing: {}", total);
    }

    pub fn increment_processed(&self, success: bool) {
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total.load(Ordering::Relaxed);
        if total > 0 && (processed % REPORT_EVERY == 0 || processed == total) {
            self.report(processed, total);
        }
    }

    fn report(&self, processed: usize, total: usize) {
        let percent = processed as f64 / total as f64 * 100.0;
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            processed as f64 / elapsed
        } else {
            0.0
        };
        let eta_secs = if rate > 0.0 {
            ((total - processed) as f64 / rate) as u64
        } else {
            0
        };
        info!(
            "Progress: {}/{} ({:.1}%) | ok: {} | failed: {} | {:.1} msg/s | eta: {}",
            processed,
            total,
            percent,
            self.successful.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            rate,
            format_duration(eta_secs)
        );
    }

    pub fn summary(&self) -> ProgressSummary {
        let processed = self.processed.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        ProgressSummary {
            total: self.total.load(Ordering::Relaxed),
            processed,
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            elapsed_seconds: elapsed,
            items_per_second: if elapsed > 0.0 {
                processed as f64 / elapsed
            } else {
                0.0
            },
        }
    }
}
