//! Status poller: periodically reads tracked objects, computes their
//! statuses and streams changes to the caller.
//!
//! One run goes through states `Idle -> Running -> {Completed, Cancelled, Failed}`.
//! Every cycle fetches all tracked objects (at most `concurrency` lookups
//! at once), emits [`Event::ResourceUpdate`] for every object whose status
//! or message changed, then a single [`Event::Aggregate`]. Cycles never
//! overlap. The last event of every run is [`Event::Finished`].

mod fetch;
mod tracked;

pub use self::tracked::TrackedSet;

use crate::{
    event::{Event, Outcome, ResourceStatus},
    object::ObjectIdentifier,
    policy::{BackoffPolicy, PollInterval, StopCondition},
    reader::ClusterReader,
    registry::EvaluatorRegistry,
};
use anyhow::Context as _;
use futures::{FutureExt, Stream};
use std::{
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 2000;
const DEFAULT_CONCURRENCY: usize = 8;
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;
const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Parameters of a poller run. Unset fields take defaults.
#[derive(Clone, Debug, Default)]
pub struct PollOptions {
    /// When to finish successfully. Default is `AllCurrent`.
    pub stop_condition: Option<StopCondition>,
    /// Delay between cycles. Default is 2 seconds.
    pub interval: Option<PollInterval>,
    /// Delay before retrying a cycle which failed as a whole.
    /// Default starts at 1 second and doubles up to 30 seconds.
    pub retry_backoff: Option<BackoffPolicy>,
    /// Number of failed cycles in a row which is still tolerated.
    /// Default is 3.
    pub max_consecutive_failures: Option<u32>,
    /// Maximum number of lookups in flight. Default is 8.
    pub concurrency: Option<usize>,
    /// Time after which the run is stopped with
    /// [`Outcome::DeadlineExceeded`]. Default is no limit.
    pub timeout: Option<Duration>,
    /// Number of events buffered before the poller waits for the
    /// consumer. Default is 16.
    pub channel_capacity: Option<usize>,
}

impl PollOptions {
    fn stop_condition(&self) -> StopCondition {
        self.stop_condition
            .clone()
            .unwrap_or(StopCondition::AllCurrent)
    }

    fn interval(&self) -> PollInterval {
        self.interval.unwrap_or_else(|| {
            PollInterval::Fixed(Duration::from_millis(DEFAULT_POLL_INTERVAL_MILLIS))
        })
    }

    fn retry_backoff(&self) -> BackoffPolicy {
        self.retry_backoff.unwrap_or_default()
    }

    fn max_consecutive_failures(&self) -> u32 {
        self.max_consecutive_failures
            .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES)
    }

    fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1)
    }

    /// Rejects options which would break the run midway
    fn validate(&self) -> anyhow::Result<()> {
        self.interval().validate().context("invalid poll interval")?;
        self.retry_backoff()
            .validate()
            .context("invalid retry backoff")?;
        Ok(())
    }

    fn channel_capacity(&self) -> usize {
        self.channel_capacity
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
            .max(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum EngineState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Computes statuses of objects by polling cluster.
#[derive(Clone)]
pub struct StatusPoller {
    reader: Arc<dyn ClusterReader>,
    registry: Arc<EvaluatorRegistry>,
}

impl StatusPoller {
    pub fn new(reader: Arc<dyn ClusterReader>, registry: EvaluatorRegistry) -> Self {
        StatusPoller {
            reader,
            registry: Arc::new(registry),
        }
    }

    /// Starts polling given objects in background.
    ///
    /// Fails immediately if some identifier is invalid. Must be called
    /// within Tokio runtime.
    #[tracing::instrument(skip(self, identifiers, options))]
    pub fn poll<I>(&self, identifiers: I, options: PollOptions) -> anyhow::Result<StatusStream>
    where
        I: IntoIterator<Item = ObjectIdentifier>,
    {
        let identifiers = identifiers.into_iter().collect::<Vec<_>>();
        for id in &identifiers {
            id.validate()?;
        }
        options.validate()?;
        let tracked = TrackedSet::new(identifiers);
        tracing::info!(
            resources = tracked.len(),
            stop_condition = ?options.stop_condition(),
            interval = ?options.interval(),
            "Starting status poller"
        );

        let (tx, rx) = mpsc::channel(options.channel_capacity());
        let (state_tx, state_rx) = watch::channel(EngineState::Idle);
        let cancel = CancellationToken::new();

        let engine = Engine {
            reader: self.reader.clone(),
            registry: self.registry.clone(),
            tracked,
            options,
            tx,
            state: state_tx,
            cancel: cancel.clone(),
            timed_out: Arc::new(AtomicBool::new(false)),
        };
        tokio::task::spawn(engine.run().in_current_span());

        Ok(StatusStream {
            events: ReceiverStream::new(rx),
            cancel,
            state: state_rx,
        })
    }
}

/// Events of one poller run.
///
/// Dropping the stream cancels the run.
pub struct StatusStream {
    events: ReceiverStream<Event>,
    cancel: CancellationToken,
    state: watch::Receiver<EngineState>,
}

impl StatusStream {
    /// Requests cancellation. Events of the current cycle which are
    /// already computed are still delivered, followed by
    /// `Finished(Cancelled)`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token which can be used to cancel the run from elsewhere
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<EngineState> {
        self.state.clone()
    }
}

impl Stream for StatusStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for StatusStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State of one run, owned by the poll loop
struct Engine {
    reader: Arc<dyn ClusterReader>,
    registry: Arc<EvaluatorRegistry>,
    tracked: TrackedSet,
    options: PollOptions,
    tx: mpsc::Sender<Event>,
    state: watch::Sender<EngineState>,
    cancel: CancellationToken,
    timed_out: Arc<AtomicBool>,
}

impl Engine {
    async fn run(mut self) {
        let timer = self.start_deadline_timer();
        let _ = self.state.send(EngineState::Running);
        let outcome = match AssertUnwindSafe(self.poll_loop()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown reason".to_string());
                Outcome::Failed(Arc::new(anyhow::anyhow!("poll loop panicked: {}", reason)))
            }
        };
        drop(timer);

        let state = match &outcome {
            Outcome::Completed => EngineState::Completed,
            Outcome::Cancelled => EngineState::Cancelled,
            Outcome::DeadlineExceeded | Outcome::Failed(_) => EngineState::Failed,
        };
        match &outcome {
            Outcome::Failed(err) => tracing::warn!("Status poller failed: {:#}", err),
            other => tracing::info!(outcome = %other, "Status poller finished"),
        }
        let _ = self.state.send(state);
        // receiver may be gone already, nobody to report to then
        let _ = self.tx.send(Event::Finished(outcome)).await;
    }

    /// Cancels the run when timeout passes. Timer is stopped when
    /// returned guard is dropped.
    fn start_deadline_timer(&self) -> Option<tokio_util::sync::DropGuard> {
        let timeout = self.options.timeout?;
        let stop_timer = CancellationToken::new();
        let cancel = self.cancel.clone();
        let timed_out = self.timed_out.clone();
        let guard = stop_timer.clone().drop_guard();
        tokio::task::spawn(async move {
            tokio::select! {
                biased;
                // caller cancelled first, so the run is not timed out
                _ = cancel.cancelled() => {}
                _ = stop_timer.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    tracing::info!(timeout = ?timeout, "Deadline exceeded, stopping");
                    timed_out.store(true, Ordering::SeqCst);
                    cancel.cancel();
                }
            }
        });
        Some(guard)
    }

    fn interrupted(&self) -> Outcome {
        if self.timed_out.load(Ordering::SeqCst) {
            Outcome::DeadlineExceeded
        } else {
            Outcome::Cancelled
        }
    }

    /// Returns false if consumer is gone
    async fn emit(&self, event: Event) -> bool {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("Event stream was dropped");
            self.cancel.cancel();
            return false;
        }
        true
    }

    /// Returns false if interrupted
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    async fn poll_loop(&mut self) -> Outcome {
        let stop_condition = self.options.stop_condition();
        let interval = self.options.interval();
        let retry_backoff = self.options.retry_backoff();
        let max_failures = self.options.max_consecutive_failures();

        let mut cycle = 0u64;
        let mut failures = 0u32;
        let mut quiet_cycles = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return self.interrupted();
            }
            cycle += 1;
            let span = tracing::debug_span!("poll_cycle", cycle);
            let delay = match self.run_cycle(cycle).instrument(span).await {
                CycleResult::Stop(outcome) => return outcome,
                CycleResult::SystemicError(err) => {
                    failures += 1;
                    tracing::warn!(
                        cycle,
                        consecutive_failures = failures,
                        "Failed to read cluster: {:#}",
                        err
                    );
                    let err = Arc::new(err);
                    let event = Event::Error {
                        cycle,
                        error: err.clone(),
                        consecutive_failures: failures,
                    };
                    if !self.emit(event).await {
                        return Outcome::Cancelled;
                    }
                    if failures > max_failures {
                        return Outcome::Failed(err);
                    }
                    retry_backoff.next(failures - 1)
                }
                CycleResult::Done { changed } => {
                    failures = 0;
                    if stop_condition.is_satisfied(&self.tracked) {
                        return Outcome::Completed;
                    }
                    quiet_cycles = if changed {
                        0
                    } else {
                        quiet_cycles.saturating_add(1)
                    };
                    interval.delay(quiet_cycles)
                }
            };
            if !self.sleep(delay).await {
                return self.interrupted();
            }
        }
    }

    /// Fetches and classifies all objects, emitting events for changes
    /// and the aggregate.
    async fn run_cycle(&mut self, cycle: u64) -> CycleResult {
        let mut fetched = fetch::fetch_all(
            self.reader.as_ref(),
            self.tracked.identifiers(),
            self.options.concurrency(),
            &self.cancel,
        )
        .await;
        if let Some(err) = fetched.take_systemic_error() {
            return CycleResult::SystemicError(err);
        }

        let mut changed = false;
        for (id, lookup) in std::mem::take(&mut fetched.results) {
            let status = match lookup {
                Ok(object) => self.registry.classify(&id, object),
                Err(err) => {
                    tracing::warn!(identifier = %id, "Lookup failed: {:#}", err);
                    ResourceStatus::lookup_failed(id, err.into_inner())
                }
            };
            if !self.tracked.update(status.clone()) {
                continue;
            }
            changed = true;
            tracing::debug!(
                identifier = %status.identifier,
                status = %status.status,
                detail = status.message.as_str(),
                "Status changed"
            );
            if !self.emit(Event::ResourceUpdate { cycle, status }).await {
                return CycleResult::Stop(Outcome::Cancelled);
            }
        }
        if !fetched.complete {
            // cycle was interrupted, its aggregate would be partial
            return CycleResult::Stop(self.interrupted());
        }

        let aggregate = self.tracked.aggregate();
        tracing::debug!(status = %aggregate.status, "Cycle finished");
        if !self.emit(Event::Aggregate { cycle, aggregate }).await {
            return CycleResult::Stop(Outcome::Cancelled);
        }
        CycleResult::Done { changed }
    }
}

enum CycleResult {
    Done { changed: bool },
    /// Whole cycle is discarded
    SystemicError(anyhow::Error),
    Stop(Outcome),
}
