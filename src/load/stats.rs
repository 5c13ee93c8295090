use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::warn;

use crate::error::LoadError;
use crate::metrics::LatencyHistogram;

use super::outcome::RequestOutcome;

/// Scale used for fixed-point percentages and rates (two decimals).
pub(crate) const PERCENT_DIVISOR: u64 = 100;
const MS_PER_SEC: u128 = 1_000;

/// Why a load run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// Every request reached a terminal state.
    Completed,
    /// The overall run ceiling elapsed first.
    RunTimeout,
    /// A shutdown signal arrived first.
    Shutdown,
}

impl RunEnd {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RunEnd::Completed => "completed",
            RunEnd::RunTimeout => "run timeout",
            RunEnd::Shutdown => "shutdown",
        }
    }
}

/// Snapshot published while a run is executing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadProgress {
    pub requested: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight: u64,
}

/// Latency of successful round trips, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: u64,
    pub total_ms: u64,
    pub min_ms: u64,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}

/// Final aggregate of a load run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRunStats {
    pub requested: u64,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub failure_categories: HashMap<String, u64>,
    pub elapsed: Duration,
    pub end: RunEnd,
    pub peak_in_flight: u64,
    pub latency: LatencySummary,
}

impl LoadRunStats {
    /// `false` when the run was cut short and this is a degraded summary.
    #[must_use]
    pub const fn completed(&self) -> bool {
        matches!(self.end, RunEnd::Completed)
    }

    /// Dispatched requests that never reached a terminal state because the
    /// run was cut short.
    #[must_use]
    pub const fn abandoned(&self) -> u64 {
        self.attempted
            .saturating_sub(self.succeeded)
            .saturating_sub(self.failed)
    }

    /// The `n` most frequent failure categories, by count descending and then
    /// by name.
    #[must_use]
    pub fn top_failures(&self, n: usize) -> Vec<(String, u64)> {
        let mut categories: Vec<(String, u64)> = self
            .failure_categories
            .iter()
            .map(|(category, count)| (category.clone(), *count))
            .collect();
        categories.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
        categories.truncate(n);
        categories
    }

    /// Success share of attempted requests, x100 (`9512` is 95.12%).
    #[must_use]
    pub fn success_rate_x100(&self) -> u64 {
        if self.attempted == 0 {
            return 0;
        }
        let scaled = u128::from(self.succeeded)
            .saturating_mul(u128::from(PERCENT_DIVISOR))
            .saturating_mul(u128::from(PERCENT_DIVISOR));
        let rate = scaled.checked_div(u128::from(self.attempted)).unwrap_or(0);
        u64::try_from(rate).unwrap_or(u64::MAX)
    }

    /// Successful requests per second, x100.
    #[must_use]
    pub fn throughput_x100(&self) -> u64 {
        let elapsed_ms = self.elapsed.as_millis().max(1);
        let scaled = u128::from(self.succeeded)
            .saturating_mul(u128::from(PERCENT_DIVISOR))
            .saturating_mul(MS_PER_SEC);
        let rate = scaled.checked_div(elapsed_ms).unwrap_or(0);
        u64::try_from(rate).unwrap_or(u64::MAX)
    }

    /// Mean latency of successful requests in milliseconds.
    #[must_use]
    pub fn average_success_ms(&self) -> Option<u64> {
        self.latency.total_ms.checked_div(self.latency.count)
    }
}

/// Terminal outcomes of a run. Each outcome is folded in under one lock, so
/// a snapshot never sees a count without its category or latency.
#[derive(Debug)]
struct Tally {
    succeeded: u64,
    failed: u64,
    latency_total_ms: u64,
    categories: HashMap<String, u64>,
    latencies: LatencyHistogram,
}

/// Shared recorder updated by every request task of a run.
#[derive(Debug)]
pub(crate) struct StatsRecorder {
    requested: u64,
    attempted: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
    tally: Mutex<Tally>,
}

impl StatsRecorder {
    pub(crate) fn new(requested: u64) -> Result<Self, LoadError> {
        let latencies =
            LatencyHistogram::new().map_err(|message| LoadError::Histogram { message })?;
        Ok(Self {
            requested,
            attempted: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            peak_in_flight: AtomicU64::new(0),
            tally: Mutex::new(Tally {
                succeeded: 0,
                failed: 0,
                latency_total_ms: 0,
                categories: HashMap::new(),
                latencies,
            }),
        })
    }

    pub(crate) fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) const fn in_flight_counter(&self) -> &AtomicU64 {
        &self.in_flight
    }

    pub(crate) fn observe_in_flight(&self, in_flight: u64) {
        self.peak_in_flight.fetch_max(in_flight, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, outcome: &RequestOutcome) {
        let mut tally = self.lock_tally();
        match outcome {
            RequestOutcome::Succeeded { latency } => {
                let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                if let Err(err) = tally.latencies.record(latency_ms) {
                    warn!("{}", err);
                }
                tally.latency_total_ms = tally.latency_total_ms.saturating_add(latency_ms);
                tally.succeeded = tally.succeeded.saturating_add(1);
            }
            RequestOutcome::Failed(kind) => {
                let count = tally.categories.entry(kind.category()).or_insert(0);
                *count = count.saturating_add(1);
                tally.failed = tally.failed.saturating_add(1);
            }
        }
    }

    pub(crate) fn progress(&self) -> LoadProgress {
        let tally = self.lock_tally();
        let (succeeded, failed) = (tally.succeeded, tally.failed);
        drop(tally);
        LoadProgress {
            requested: self.requested,
            completed: succeeded.saturating_add(failed),
            succeeded,
            failed,
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn snapshot(&self, elapsed: Duration, end: RunEnd) -> LoadRunStats {
        let tally = self.lock_tally();
        let (p50_ms, p90_ms, p99_ms) = tally.latencies.percentiles();
        let latency = LatencySummary {
            count: tally.latencies.count(),
            total_ms: tally.latency_total_ms,
            min_ms: tally.latencies.min(),
            p50_ms,
            p90_ms,
            p99_ms,
            max_ms: tally.latencies.max(),
        };
        let stats = LoadRunStats {
            requested: self.requested,
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: tally.succeeded,
            failed: tally.failed,
            failure_categories: tally.categories.clone(),
            elapsed,
            end,
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
            latency,
        };
        drop(tally);
        stats
    }

    fn lock_tally(&self) -> MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::FailureKind;

    fn stats_with(categories: &[(&str, u64)]) -> LoadRunStats {
        LoadRunStats {
            requested: 10,
            attempted: 10,
            succeeded: 7,
            failed: 3,
            failure_categories: categories
                .iter()
                .map(|(name, count)| ((*name).to_owned(), *count))
                .collect(),
            elapsed: Duration::from_millis(2_000),
            end: RunEnd::Completed,
            peak_in_flight: 4,
            latency: LatencySummary::default(),
        }
    }

    #[test]
    fn top_failures_orders_by_count_then_name() -> Result<(), String> {
        let stats = stats_with(&[("timeout", 2), ("b", 5), ("a", 5), ("z", 1)]);
        let top = stats.top_failures(3);
        let expected = vec![
            ("a".to_owned(), 5),
            ("b".to_owned(), 5),
            ("timeout".to_owned(), 2),
        ];
        if top != expected {
            return Err(format!("unexpected order {:?}", top));
        }
        if !stats.top_failures(0).is_empty() || stats.top_failures(10).len() != 4 {
            return Err("top_failures must honor n".to_owned());
        }
        Ok(())
    }

    #[test]
    fn rates_use_fixed_point() -> Result<(), String> {
        let stats = stats_with(&[]);
        if stats.success_rate_x100() != 7_000 {
            return Err(format!("expected 70.00%, got {}", stats.success_rate_x100()));
        }
        if stats.throughput_x100() != 350 {
            return Err(format!("expected 3.50/s, got {}", stats.throughput_x100()));
        }
        if stats.average_success_ms().is_some() {
            return Err("no latency recorded, no average".to_owned());
        }
        Ok(())
    }

    #[test]
    fn recorder_aggregates_outcomes() -> Result<(), String> {
        let recorder = StatsRecorder::new(4).map_err(|err| err.to_string())?;
        for _ in 0..4 {
            recorder.record_attempt();
        }
        recorder.record(&RequestOutcome::Succeeded {
            latency: Duration::from_millis(10),
        });
        recorder.record(&RequestOutcome::Succeeded {
            latency: Duration::from_millis(30),
        });
        recorder.record(&RequestOutcome::Failed(FailureKind::Rejected(
            " duplicate ".to_owned(),
        )));
        recorder.record(&RequestOutcome::Failed(FailureKind::Rejected(
            "duplicate".to_owned(),
        )));

        let stats = recorder.snapshot(Duration::from_secs(1), RunEnd::Completed);
        if stats.attempted != stats.succeeded.saturating_add(stats.failed) {
            return Err(format!("inconsistent counts {:?}", stats));
        }
        if stats.failure_categories.get("duplicate") != Some(&2) {
            return Err(format!("unexpected categories {:?}", stats.failure_categories));
        }
        if stats.average_success_ms() != Some(20) || stats.latency.max_ms != 30 {
            return Err(format!("unexpected latency {:?}", stats.latency));
        }
        if recorder.progress().completed != 4 {
            return Err("progress must count terminal requests".to_owned());
        }
        Ok(())
    }
}
