use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::rpc::{MAX_REQUEST_TIMEOUT, Reply, RpcClient};
use crate::shutdown::ShutdownReceiver;

use super::outcome::{FailureKind, ReplyVerdict, RequestOutcome};
use super::stats::{LoadProgress, LoadRunStats, RunEnd, StatsRecorder};

/// Produces request payloads for a load run and judges the replies.
pub trait Workload: Send + Sync {
    /// Payload of the `sequence`-th request of the run.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the payload cannot be
    /// built. The request is then counted as an encode failure and never
    /// published.
    fn payload(&self, sequence: u64) -> Result<Vec<u8>, String>;

    fn classify(&self, _reply: &Reply) -> ReplyVerdict {
        ReplyVerdict::Accepted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub requests: u64,
    pub concurrency: usize,
    pub request_timeout: Duration,
    /// Ceiling for the whole run; `None` waits for every request.
    pub run_timeout: Option<Duration>,
}

impl LoadOptions {
    /// # Errors
    ///
    /// Returns an error when the concurrency limit or the request timeout
    /// cannot be honored.
    pub const fn validate(&self) -> Result<(), LoadError> {
        if self.concurrency == 0 {
            return Err(LoadError::ZeroConcurrency);
        }
        if self.concurrency > Semaphore::MAX_PERMITS {
            return Err(LoadError::ConcurrencyTooLarge {
                max: Semaphore::MAX_PERMITS,
            });
        }
        if self.request_timeout.is_zero() {
            return Err(LoadError::ZeroRequestTimeout);
        }
        if self.request_timeout.as_nanos() > MAX_REQUEST_TIMEOUT.as_nanos() {
            return Err(LoadError::RequestTimeoutTooLarge {
                max_secs: MAX_REQUEST_TIMEOUT.as_secs(),
            });
        }
        Ok(())
    }
}

struct InflightGuard<'counter> {
    counter: &'counter AtomicU64,
}

impl<'counter> InflightGuard<'counter> {
    fn acquire(recorder: &'counter StatsRecorder) -> Self {
        let counter = recorder.in_flight_counter();
        let previous = counter.fetch_add(1, Ordering::Relaxed);
        recorder.observe_in_flight(previous.saturating_add(1));
        Self { counter }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        loop {
            let current = self.counter.load(Ordering::Relaxed);
            let Some(next) = current.checked_sub(1) else {
                break;
            };
            if self
                .counter
                .compare_exchange(current, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }
}

/// Drives `requests` dispatches through one client with at most
/// `concurrency` of them unresolved at any time.
pub struct LoadHarness<W> {
    client: Arc<RpcClient>,
    workload: Arc<W>,
    options: LoadOptions,
    progress_tx: Option<Arc<watch::Sender<LoadProgress>>>,
    shutdown_rx: Option<ShutdownReceiver>,
}

impl<W> LoadHarness<W>
where
    W: Workload + 'static,
{
    #[must_use]
    pub const fn new(client: Arc<RpcClient>, workload: Arc<W>, options: LoadOptions) -> Self {
        Self {
            client,
            workload,
            options,
            progress_tx: None,
            shutdown_rx: None,
        }
    }

    /// Publishes a [`LoadProgress`] snapshot after every finished request.
    #[must_use]
    pub fn with_progress(mut self, progress_tx: watch::Sender<LoadProgress>) -> Self {
        self.progress_tx = Some(Arc::new(progress_tx));
        self
    }

    /// Stops dispatching and returns a degraded summary once a shutdown is
    /// broadcast.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown_rx: ShutdownReceiver) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Runs the load to completion, or until the run ceiling or a shutdown
    /// cuts it short. A failed request never aborts the run.
    ///
    /// # Errors
    ///
    /// Returns an error when the options are invalid or the concurrency
    /// limiter breaks down.
    pub async fn run(self) -> Result<LoadRunStats, LoadError> {
        let LoadHarness {
            client,
            workload,
            options,
            progress_tx,
            mut shutdown_rx,
        } = self;
        options.validate()?;

        let recorder = Arc::new(StatsRecorder::new(options.requests)?);
        let started = Instant::now();
        let run_deadline = options
            .run_timeout
            .and_then(|ceiling| started.checked_add(ceiling));
        info!(
            "Starting load: {} requests, concurrency {}, request timeout {}ms",
            options.requests,
            options.concurrency,
            options.request_timeout.as_millis()
        );

        let mut tasks = JoinSet::new();
        let dispatch = dispatch_all(
            &mut tasks,
            client,
            workload,
            options,
            Arc::clone(&recorder),
            progress_tx.clone(),
        );
        let end = tokio::select! {
            result = dispatch => {
                result?;
                RunEnd::Completed
            }
            () = wait_for_deadline(run_deadline) => {
                warn!("Run ceiling reached; abandoning outstanding requests");
                RunEnd::RunTimeout
            }
            () = wait_for_shutdown(shutdown_rx.as_mut()) => {
                warn!("Shutdown requested; abandoning outstanding requests");
                RunEnd::Shutdown
            }
        };

        let elapsed = started.elapsed();
        // Drain before the snapshot: a task may still be recording its
        // outcome, and aborted waiters free their ids as they drop.
        tasks.abort_all();
        let mut abandoned = 0_u64;
        while let Some(joined) = tasks.join_next().await {
            if joined.as_ref().is_err_and(tokio::task::JoinError::is_cancelled) {
                abandoned = abandoned.saturating_add(1);
            } else {
                log_join_result(&joined);
            }
        }
        if abandoned > 0 {
            debug!("Aborted {} outstanding requests", abandoned);
        }

        let stats = recorder.snapshot(elapsed, end);
        if let Some(progress_tx) = progress_tx {
            progress_tx.send_replace(recorder.progress());
        }
        info!(
            "Load finished ({}): {} attempted, {} succeeded, {} failed",
            end.as_str(),
            stats.attempted,
            stats.succeeded,
            stats.failed
        );
        Ok(stats)
    }
}

/// Runs a load with no progress reporting and no external shutdown.
///
/// # Errors
///
/// Returns an error when the options are invalid.
pub async fn run_load<W>(
    client: Arc<RpcClient>,
    workload: Arc<W>,
    options: LoadOptions,
) -> Result<LoadRunStats, LoadError>
where
    W: Workload + 'static,
{
    LoadHarness::new(client, workload, options).run().await
}

async fn dispatch_all<W>(
    tasks: &mut JoinSet<()>,
    client: Arc<RpcClient>,
    workload: Arc<W>,
    options: LoadOptions,
    recorder: Arc<StatsRecorder>,
    progress_tx: Option<Arc<watch::Sender<LoadProgress>>>,
) -> Result<(), LoadError>
where
    W: Workload + 'static,
{
    let limiter = Arc::new(Semaphore::new(options.concurrency));

    for sequence in 0..options.requests {
        // Waiting here is the backpressure: no task exists for a request
        // until a slot is free.
        let permit = Arc::clone(&limiter)
            .acquire_owned()
            .await
            .map_err(|_| LoadError::LimiterClosed)?;
        while let Some(joined) = tasks.try_join_next() {
            log_join_result(&joined);
        }

        recorder.record_attempt();
        let client = Arc::clone(&client);
        let workload = Arc::clone(&workload);
        let recorder = Arc::clone(&recorder);
        let progress_tx = progress_tx.clone();
        let request_timeout = options.request_timeout;
        tasks.spawn(async move {
            let in_flight = InflightGuard::acquire(&recorder);
            let outcome = match workload.payload(sequence) {
                Ok(payload) => {
                    let sent_at = Instant::now();
                    let result = client.send(payload, request_timeout).await;
                    RequestOutcome::from_result(result, sent_at.elapsed(), |reply| {
                        workload.classify(reply)
                    })
                }
                Err(reason) => {
                    warn!("Request {} not sent: {}", sequence, reason);
                    RequestOutcome::Failed(FailureKind::Encode)
                }
            };
            drop(in_flight);
            drop(permit);

            recorder.record(&outcome);
            if let Some(progress_tx) = progress_tx {
                progress_tx.send_replace(recorder.progress());
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        log_join_result(&joined);
    }
    debug!("All {} requests reached a terminal state", options.requests);
    Ok(())
}

fn log_join_result(joined: &Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        warn!("Request task ended abnormally: {}", err);
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_for_shutdown(shutdown_rx: Option<&mut ShutdownReceiver>) {
    let Some(shutdown_rx) = shutdown_rx else {
        return std::future::pending().await;
    };
    match shutdown_rx.recv().await {
        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        // Every sender is gone, so no shutdown can ever arrive.
        Err(broadcast::error::RecvError::Closed) => std::future::pending().await,
    }
}
