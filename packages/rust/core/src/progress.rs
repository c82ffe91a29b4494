//! Run progress: shared counters, snapshots and the reporter seam.
//!
//! Workers bump [`ProgressCounters`] as rows finish; the aggregator hands a
//! [`ProgressSnapshot`] to the [`ProgressReporter`] after every row. Counters
//! only grow, so snapshots taken in order are monotonic.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tractcheck_shared::{SkipReason, Verdict};

use crate::scheduler::RunSummary;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Lock-free run counters, updated concurrently by worker tasks.
#[derive(Debug)]
pub struct ProgressCounters {
    total: usize,
    completed: AtomicUsize,
    skipped: AtomicUsize,
    elapsed_micros: AtomicU64,
    by_reason: [AtomicUsize; SkipReason::ALL.len()],
}

impl ProgressCounters {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            elapsed_micros: AtomicU64::new(0),
            by_reason: Default::default(),
        }
    }

    /// Count one finished row and the time its task took.
    pub fn record(&self, verdict: &Verdict, elapsed: Duration) {
        if let Some(reason) = verdict.skip_reason() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            self.by_reason[reason.ordinal()].fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.elapsed_micros.fetch_add(micros, Ordering::Relaxed);
        // completed last so a snapshot never shows a row without its time
        self.completed.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let completed = self.completed.load(Ordering::Acquire);
        ProgressSnapshot {
            completed,
            total: self.total,
            skipped: self.skipped.load(Ordering::Relaxed),
            cumulative_elapsed: Duration::from_micros(self.elapsed_micros.load(Ordering::Relaxed)),
        }
    }

    /// Skips per reason. Every reason is present, zero or not.
    pub fn skip_counts(&self) -> BTreeMap<SkipReason, usize> {
        SkipReason::ALL
            .iter()
            .map(|reason| (*reason, self.by_reason[reason.ordinal()].load(Ordering::Relaxed)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Display bucket for the completion percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressTier {
    /// Below 34%.
    Low,
    /// 34% up to 66%.
    Mid,
    /// 67% and above.
    High,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub skipped: usize,
    /// Sum of per-row task durations, not wall-clock time.
    pub cumulative_elapsed: Duration,
}

impl ProgressSnapshot {
    /// Whole-number completion percentage, rounded down. An empty run is 100%.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = self.completed.min(self.total) * 100 / self.total;
        pct as u8
    }

    pub fn tier(&self) -> ProgressTier {
        match self.percent() {
            0..34 => ProgressTier::Low,
            34..67 => ProgressTier::Mid,
            _ => ProgressTier::High,
        }
    }

    /// Estimated time remaining: mean per-row time times rows left.
    ///
    /// `None` until at least one row has completed.
    pub fn eta(&self) -> Option<Duration> {
        if self.completed == 0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.completed) as u128;
        let micros = self.cumulative_elapsed.as_micros() * remaining / self.completed as u128;
        Some(Duration::from_micros(u64::try_from(micros).unwrap_or(u64::MAX)))
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once per finished row, in completion order.
    fn row_completed(&self, index: usize, verdict: &Verdict, progress: &ProgressSnapshot);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn row_completed(&self, _index: usize, _verdict: &Verdict, _progress: &ProgressSnapshot) {}
    fn done(&self, _summary: &RunSummary) {}
}
