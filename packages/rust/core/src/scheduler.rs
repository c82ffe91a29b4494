//! Batched, bounded-concurrency row scheduler.
//!
//! Records are cut into contiguous batches that run one after another. Every
//! row in a batch is its own task; a semaphore shared across batches keeps at
//! most `concurrency` rows in flight. Tasks report back through the batch's
//! `JoinSet` and a single aggregator writes the [`ResultTable`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use tractcheck_geocoder::Geocode;
use tractcheck_shared::{PipelineConfig, Record, Result, RunId, SkipReason, Verdict};

use crate::progress::{ProgressCounters, ProgressReporter};
use crate::results::ResultTable;
use crate::worker::{RowContext, process};

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Summary of a completed (or cancelled) run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    /// Records handed to the scheduler.
    pub total: usize,
    /// Rows with a verdict, skipped ones included.
    pub completed: usize,
    pub qualified: usize,
    pub not_qualified: usize,
    pub skipped: usize,
    /// Every reason, zero counts included.
    pub skip_reasons: BTreeMap<SkipReason, usize>,
    /// Rows a cancelled run never reached.
    pub unresolved: usize,
    /// Sum of per-row task time, in milliseconds.
    pub row_time_ms: u64,
    /// Wall-clock run time, in milliseconds.
    pub elapsed_ms: u64,
    pub cancelled: bool,
}

/// Scheduler output: the filled table and its summary.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub table: ResultTable,
    pub summary: RunSummary,
}

/// What a row task sends back to the aggregator.
#[derive(Debug)]
struct RowResult {
    index: usize,
    verdict: Verdict,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Runs rows through a [`RowContext`] with bounded concurrency.
pub struct Scheduler<G> {
    context: Arc<RowContext<G>>,
    config: PipelineConfig,
}

impl<G: Geocode> Scheduler<G> {
    /// Create a scheduler. Zero `batch_size` or `concurrency` is a config error.
    pub fn new(context: RowContext<G>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            context: Arc::new(context),
            config,
        })
    }

    pub fn context(&self) -> &RowContext<G> {
        &self.context
    }

    /// Process every record and return one table slot per record.
    ///
    /// Duplicate record indices are rejected before anything is dispatched.
    /// Once `cancel` fires no further batch starts and queued rows return
    /// without calling the geocoder; their slots stay unresolved.
    #[instrument(skip_all, fields(records = records.len(), batch_size = self.config.batch_size, concurrency = self.config.concurrency))]
    pub async fn run(
        &self,
        records: Vec<Record>,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = RunId::new();

        let mut table = ResultTable::for_records(&records)?;
        let total = records.len();
        let counters = Arc::new(ProgressCounters::new(total));
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        info!(%run_id, total, "starting run");
        progress.phase("Geocoding addresses");

        let mut pending = records.into_iter().peekable();
        let mut batch_no = 0usize;

        while pending.peek().is_some() {
            if cancel.is_cancelled() {
                warn!(batch = batch_no, "run cancelled, not dispatching further batches");
                break;
            }

            let batch: Vec<Record> = pending.by_ref().take(self.config.batch_size).collect();
            batch_no += 1;
            debug!(batch = batch_no, rows = batch.len(), "dispatching batch");

            let mut tasks = JoinSet::new();
            for record in batch {
                let context = self.context.clone();
                let sem = semaphore.clone();
                let counters = counters.clone();
                let cancel = cancel.clone();

                tasks.spawn(async move {
                    let _permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return None,
                        permit = sem.acquire_owned() => permit.ok()?,
                    };

                    let started = Instant::now();
                    let (index, verdict) = process(&record, context.as_ref()).await;
                    counters.record(&verdict, started.elapsed());

                    Some(RowResult { index, verdict })
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Some(row)) => {
                        table.record(row.index, row.verdict)?;
                        progress.row_completed(row.index, &row.verdict, &counters.snapshot());
                    }
                    Ok(None) => {}
                    Err(e) => error!(error = %e, "row task failed"),
                }
            }
        }

        let snapshot = counters.snapshot();
        let summary = RunSummary {
            run_id,
            started_at,
            total,
            completed: snapshot.completed,
            qualified: table.count_where(|v| *v == Verdict::Qualified),
            not_qualified: table.count_where(|v| *v == Verdict::NotQualified),
            skipped: snapshot.skipped,
            skip_reasons: counters.skip_counts(),
            unresolved: total - table.resolved_count(),
            row_time_ms: duration_ms(snapshot.cumulative_elapsed),
            elapsed_ms: duration_ms(start.elapsed()),
            cancelled: cancel.is_cancelled(),
        };

        info!(
            run_id = %summary.run_id,
            total = summary.total,
            qualified = summary.qualified,
            not_qualified = summary.not_qualified,
            skipped = summary.skipped,
            unresolved = summary.unresolved,
            elapsed_ms = summary.elapsed_ms,
            cancelled = summary.cancelled,
            "run complete"
        );
        progress.done(&summary);

        Ok(RunOutcome { table, summary })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::progress::{ProgressSnapshot, SilentProgress};
    use crate::reference::ReferenceIndex;
    use crate::worker::test_support::{FakeGeocoder, record};

    /// Records every snapshot it is handed.
    #[derive(Default)]
    struct RecordingProgress {
        rows: Mutex<Vec<(usize, ProgressSnapshot)>>,
        done: Mutex<Option<RunSummary>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, _name: &str) {}

        fn row_completed(&self, index: usize, _verdict: &Verdict, progress: &ProgressSnapshot) {
            self.rows.lock().unwrap().push((index, *progress));
        }

        fn done(&self, summary: &RunSummary) {
            *self.done.lock().unwrap() = Some(summary.clone());
        }
    }

    /// Twelve rows over four streets, with delays that shuffle completion order.
    fn geocoder() -> FakeGeocoder {
        FakeGeocoder::default()
            .block("qualified", "110010062021006")
            .block("negative", "240338024051000")
            .with("down", Err(SkipReason::TransportError))
            .delay("qualified", Duration::from_millis(15))
            .delay("negative", Duration::from_millis(5))
    }

    fn records() -> Vec<Record> {
        let streets = ["qualified", "negative", "down", "nowhere"];
        (0..12).map(|i| record(i * 3, streets[i % 4])).collect()
    }

    fn scheduler(concurrency: usize, batch_size: usize) -> Scheduler<FakeGeocoder> {
        scheduler_with(geocoder(), concurrency, batch_size)
    }

    fn scheduler_with(
        geocoder: FakeGeocoder,
        concurrency: usize,
        batch_size: usize,
    ) -> Scheduler<FakeGeocoder> {
        let index = ReferenceIndex::build([("11001006202", "yes")], [("24033802405", "no")]);
        let config = PipelineConfig {
            batch_size,
            concurrency,
            tract_suffix_len: 4,
        };
        Scheduler::new(RowContext::new(geocoder, index, 4), config).unwrap()
    }

    /// Cancels the run once `after` rows have completed.
    struct CancelAfter {
        after: usize,
        seen: std::sync::atomic::AtomicUsize,
        token: CancellationToken,
    }

    impl ProgressReporter for CancelAfter {
        fn phase(&self, _name: &str) {}

        fn row_completed(&self, _index: usize, _verdict: &Verdict, _progress: &ProgressSnapshot) {
            let seen = self.seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if seen == self.after {
                self.token.cancel();
            }
        }

        fn done(&self, _summary: &RunSummary) {}
    }

    #[tokio::test]
    async fn sequential_and_concurrent_runs_agree() {
        let cancel = CancellationToken::new();
        let one = scheduler(1, 5)
            .run(records(), &SilentProgress, &cancel)
            .await
            .unwrap();
        let many = scheduler(8, 5)
            .run(records(), &SilentProgress, &cancel)
            .await
            .unwrap();

        assert_eq!(one.table, many.table);
        assert_eq!(one.table.len(), 12);
        assert_eq!(one.table.resolved_count(), 12);
        assert!(one.table.unresolved_indices().is_empty());

        assert_eq!(one.table.verdict(0), Some(&Verdict::Qualified));
        assert_eq!(one.table.verdict(3), Some(&Verdict::NotQualified));
        assert_eq!(
            one.table.verdict(6),
            Some(&Verdict::Skipped(SkipReason::TransportError))
        );
        assert_eq!(
            one.table.verdict(9),
            Some(&Verdict::Skipped(SkipReason::NoAddressMatch))
        );
    }

    #[tokio::test]
    async fn summary_counts_verdicts_and_reasons() {
        let outcome = scheduler(4, 100)
            .run(records(), &SilentProgress, &CancellationToken::new())
            .await
            .unwrap();
        let summary = outcome.summary;

        assert_eq!(summary.total, 12);
        assert_eq!(summary.completed, 12);
        assert_eq!(summary.qualified, 3);
        assert_eq!(summary.not_qualified, 3);
        assert_eq!(summary.skipped, 6);
        assert_eq!(summary.skip_reasons[&SkipReason::TransportError], 3);
        assert_eq!(summary.skip_reasons[&SkipReason::NoAddressMatch], 3);
        assert_eq!(summary.skip_reasons[&SkipReason::NoFipsCode], 0);
        assert_eq!(summary.unresolved, 0);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_total() {
        let reporter = RecordingProgress::default();
        scheduler(3, 4)
            .run(records(), &reporter, &CancellationToken::new())
            .await
            .unwrap();

        let rows = reporter.rows.lock().unwrap();
        assert_eq!(rows.len(), 12);
        for pair in rows.windows(2) {
            assert!(pair[0].1.completed <= pair[1].1.completed);
            assert!(pair[0].1.skipped <= pair[1].1.skipped);
        }
        for (_, snap) in rows.iter() {
            assert!(snap.completed <= snap.total);
        }
        let last = rows.last().unwrap().1;
        assert_eq!(last.completed, 12);
        assert_eq!(last.percent(), 100);
        assert_eq!(last.eta(), Some(Duration::ZERO));

        let done = reporter.done.lock().unwrap();
        assert_eq!(done.as_ref().map(|s| s.completed), Some(12));
    }

    #[tokio::test]
    async fn single_no_match_row_counts_one_skip() {
        let outcome = scheduler(2, 10)
            .run(vec![record(0, "nowhere")], &SilentProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.summary.skipped, 1);
        assert_eq!(outcome.summary.skip_reasons[&SkipReason::NoAddressMatch], 1);
    }

    #[tokio::test]
    async fn transport_error_is_isolated() {
        let outcome = scheduler(4, 10)
            .run(
                vec![record(0, "qualified"), record(1, "down"), record(2, "negative")],
                &SilentProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.table.verdict(0), Some(&Verdict::Qualified));
        assert_eq!(
            outcome.table.verdict(1),
            Some(&Verdict::Skipped(SkipReason::TransportError))
        );
        assert_eq!(outcome.table.verdict(2), Some(&Verdict::NotQualified));
    }

    #[tokio::test]
    async fn duplicate_indices_are_rejected_before_dispatch() {
        let sched = scheduler(2, 10);
        let result = sched
            .run(
                vec![record(1, "qualified"), record(1, "negative")],
                &SilentProgress,
                &CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(sched.context().geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_run_leaves_rows_unresolved() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let sched = scheduler(2, 5);
        let outcome = sched.run(records(), &SilentProgress, &cancel).await.unwrap();

        assert_eq!(sched.context().geocoder.calls(), 0);
        assert_eq!(outcome.table.len(), 12);
        assert_eq!(outcome.table.unresolved_indices().len(), 12);
        assert_eq!(outcome.summary.unresolved, 12);
        assert_eq!(outcome.summary.completed, 0);
        assert!(outcome.summary.cancelled);
    }

    #[tokio::test]
    async fn cancel_mid_run_keeps_finished_rows() {
        let slow = || {
            geocoder()
                .delay("qualified", Duration::from_millis(20))
                .delay("negative", Duration::from_millis(20))
                .delay("down", Duration::from_millis(20))
                .delay("nowhere", Duration::from_millis(20))
        };
        let streets = ["qualified", "negative", "down", "nowhere"];
        let rows: Vec<Record> = (0..20).map(|i| record(i, streets[i % 4])).collect();
        let total = rows.len();

        let baseline = scheduler_with(slow(), 1, 5)
            .run(rows.clone(), &SilentProgress, &CancellationToken::new())
            .await
            .unwrap();

        let token = CancellationToken::new();
        let reporter = CancelAfter {
            after: 3,
            seen: Default::default(),
            token: token.clone(),
        };
        let sched = scheduler_with(slow(), 2, 5);
        let outcome = sched.run(rows, &reporter, &token).await.unwrap();
        let summary = &outcome.summary;

        assert!(summary.cancelled);
        assert_eq!(outcome.table.len(), total);
        assert_eq!(summary.completed + summary.unresolved, total);
        assert_eq!(summary.completed, outcome.table.resolved_count());
        assert!(summary.completed >= 3);
        // nothing past the first batch is dispatched
        assert!(sched.context().geocoder.calls() <= 5);
        assert!(sched.context().geocoder.calls() < total);
        assert!(summary.unresolved >= total - 5);

        for (index, verdict) in outcome.table.entries() {
            if let Some(verdict) = verdict {
                assert_eq!(baseline.table.verdict(index), Some(&verdict));
            }
        }
    }

    #[tokio::test]
    async fn empty_input_completes() {
        let outcome = scheduler(2, 5)
            .run(Vec::new(), &SilentProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.table.is_empty());
        assert_eq!(outcome.summary.total, 0);
    }

    #[test]
    fn zero_concurrency_is_config_error() {
        let index = ReferenceIndex::default();
        let config = PipelineConfig {
            batch_size: 10,
            concurrency: 0,
            tract_suffix_len: 4,
        };
        assert!(Scheduler::new(RowContext::new(FakeGeocoder::default(), index, 4), config).is_err());
    }

    #[test]
    fn summary_serializes_reason_keys() {
        let mut skip_reasons = BTreeMap::new();
        skip_reasons.insert(SkipReason::NoFipsCode, 2);
        let summary = RunSummary {
            run_id: RunId::new(),
            started_at: Utc::now(),
            total: 2,
            completed: 2,
            qualified: 0,
            not_qualified: 0,
            skipped: 2,
            skip_reasons,
            unresolved: 0,
            row_time_ms: 10,
            elapsed_ms: 12,
            cancelled: false,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["skip_reasons"]["no_fips_code"], 2);
        assert_eq!(json["cancelled"], false);
    }
}
