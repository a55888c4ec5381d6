//! Bounded-concurrency batch runner with per-item retry.
//!
//! At most `concurrency` operations are in flight at once, and a new
//! operation starts only after `min_dispatch_interval` has elapsed since the
//! previous one. Each item is retried in its own slot with linear backoff.
//! Results are collected in completion order.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, instrument, warn};

use coursebook_shared::{BatchSettings, CoursebookError, Result};

use crate::progress::{ItemOutcome, ProgressReporter};

// ---------------------------------------------------------------------------
// RunnerConfig
// ---------------------------------------------------------------------------

/// Scheduling and retry settings for one [`TaskRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Maximum simultaneous in-flight operations.
    pub concurrency: usize,
    /// Minimum delay between two dispatches. Zero disables the gate.
    pub min_dispatch_interval: Duration,
    /// Attempts per item, including the first.
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff_base * n`.
    pub backoff_base: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            min_dispatch_interval: Duration::ZERO,
            max_attempts: 3,
            backoff_base: Duration::from_millis(2000),
        }
    }
}

impl From<&BatchSettings> for RunnerConfig {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            concurrency: settings.concurrency,
            min_dispatch_interval: Duration::from_millis(settings.min_dispatch_interval_ms),
            max_attempts: settings.max_attempts,
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(CoursebookError::config("concurrency must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(CoursebookError::config("max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.backoff_base * retry
    }
}

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

/// Why an item ended up in [`BatchResult::errors`].
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    /// Every allowed attempt failed; `error` is the last failure.
    #[error("gave up after {attempts} attempt(s): {error}")]
    Exhausted { attempts: u32, error: E },

    /// The operation panicked. Panics are not retried.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl<E: fmt::Display> TaskError<E> {
    /// Flatten into the workspace error type.
    pub fn into_coursebook(self) -> CoursebookError {
        match self {
            Self::Exhausted { attempts, error } => CoursebookError::RetryExhausted {
                attempts,
                message: error.to_string(),
            },
            Self::Panicked(message) => CoursebookError::RetryExhausted {
                attempts: 1,
                message: format!("panicked: {message}"),
            },
        }
    }
}

/// A failed item together with its final error.
#[derive(Debug)]
pub struct BatchError<I, E> {
    pub item: I,
    pub error: TaskError<E>,
}

/// Outcome of a batch, partitioned into successes and failures.
#[derive(Debug)]
pub struct BatchResult<I, T, E> {
    /// Successful outputs, in completion order.
    pub results: Vec<T>,
    /// Failed items, in completion order.
    pub errors: Vec<BatchError<I, E>>,
    /// Items never dispatched because the batch was cancelled.
    pub skipped: usize,
}

impl<I, T, E> BatchResult<I, T, E> {
    fn with_capacity(n: usize) -> Self {
        Self {
            results: Vec::with_capacity(n),
            errors: Vec::new(),
            skipped: 0,
        }
    }

    /// True when every item succeeded and none were skipped.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.skipped == 0
    }
}

// ---------------------------------------------------------------------------
// CancelSignal
// ---------------------------------------------------------------------------

/// Cloneable flag that stops a running batch from dispatching new items.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ---------------------------------------------------------------------------
// TaskRunner
// ---------------------------------------------------------------------------

/// Runs an async operation over a batch of items.
pub struct TaskRunner {
    config: RunnerConfig,
    cancel: CancelSignal,
}

/// What a spawned item task hands back to the dispatcher.
struct Attempted<T, E> {
    attempts: u32,
    outcome: std::result::Result<T, E>,
}

impl TaskRunner {
    /// Create a runner. Rejects a zero pool size or zero attempts.
    pub fn new(config: RunnerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelSignal::new(),
        })
    }

    /// Use an externally owned cancellation signal.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `op` once per item (plus retries) and collect the outcomes.
    ///
    /// Never fails as a whole: per-item failures land in
    /// [`BatchResult::errors`], and items left undispatched after
    /// cancellation are counted in [`BatchResult::skipped`].
    #[instrument(skip_all, fields(items = items.len(), concurrency = self.config.concurrency))]
    pub async fn run<I, T, E, F, Fut>(
        &self,
        items: Vec<I>,
        op: F,
        progress: &dyn ProgressReporter,
    ) -> BatchResult<I, T, E>
    where
        I: Clone + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let total = items.len();
        let op = Arc::new(op);
        let mut pending = items.into_iter();
        let mut next = pending.next();

        let mut in_flight: JoinSet<Attempted<T, E>> = JoinSet::new();
        let mut tracker = Tracker {
            items: HashMap::new(),
            batch: BatchResult::with_capacity(total),
            completed: 0,
            total,
            progress,
        };
        let mut last_dispatch: Option<Instant> = None;

        progress.batch_started(total);
        debug!(
            min_dispatch_interval_ms = self.config.min_dispatch_interval.as_millis() as u64,
            max_attempts = self.config.max_attempts,
            "batch started"
        );

        loop {
            let can_dispatch = next.is_some()
                && !self.cancel.is_cancelled()
                && in_flight.len() < self.config.concurrency;

            if can_dispatch {
                if let Some(ready_at) = self.ready_at(last_dispatch) {
                    // Keep draining completions while the dispatch gate is closed.
                    tokio::select! {
                        () = sleep_until(ready_at) => {}
                        () = self.cancel.cancelled() => {}
                        Some(joined) = in_flight.join_next_with_id() => tracker.record(joined),
                    }
                    continue;
                }

                let Some(item) = next.take() else { continue };
                let task = attempt_with_retry(
                    Arc::clone(&op),
                    item.clone(),
                    self.config.max_attempts,
                    self.config.backoff_base,
                );
                let handle = in_flight.spawn(task);
                tracker.items.insert(handle.id(), item);
                last_dispatch = Some(Instant::now());
                next = pending.next();
                continue;
            }

            match in_flight.join_next_with_id().await {
                Some(joined) => tracker.record(joined),
                None => break,
            }
        }

        let skipped = usize::from(next.is_some()) + pending.count();
        if skipped > 0 {
            warn!(skipped, "batch cancelled before all items were dispatched");
        }

        let mut batch = tracker.batch;
        batch.skipped = skipped;
        progress.batch_finished(batch.results.len(), batch.errors.len());
        info!(
            succeeded = batch.results.len(),
            failed = batch.errors.len(),
            skipped,
            "batch completed"
        );
        batch
    }

    /// When the next dispatch may happen, if that is still in the future.
    fn ready_at(&self, last_dispatch: Option<Instant>) -> Option<Instant> {
        if self.config.min_dispatch_interval.is_zero() {
            return None;
        }
        let ready_at = last_dispatch? + self.config.min_dispatch_interval;
        (Instant::now() < ready_at).then_some(ready_at)
    }
}

/// Run one item to success or exhaustion inside its pool slot.
async fn attempt_with_retry<I, T, E, F, Fut>(
    op: Arc<F>,
    item: I,
    max_attempts: u32,
    backoff_base: Duration,
) -> Attempted<T, E>
where
    I: Clone,
    E: fmt::Display,
    F: Fn(I) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(item.clone()).await {
            Ok(value) => {
                return Attempted {
                    attempts: attempt,
                    outcome: Ok(value),
                };
            }
            Err(error) if attempt >= max_attempts => {
                return Attempted {
                    attempts: attempt,
                    outcome: Err(error),
                };
            }
            Err(error) => {
                let delay = backoff_base * attempt;
                debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "attempt failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Bookkeeping shared by every completion path of [`TaskRunner::run`].
struct Tracker<'a, I, T, E> {
    items: HashMap<Id, I>,
    batch: BatchResult<I, T, E>,
    completed: usize,
    total: usize,
    progress: &'a dyn ProgressReporter,
}

impl<I, T, E: fmt::Display> Tracker<'_, I, T, E> {
    fn record(&mut self, joined: std::result::Result<(Id, Attempted<T, E>), JoinError>) {
        let (id, outcome) = match joined {
            Ok((id, Attempted { attempts, outcome })) => {
                let outcome = outcome.map_err(|error| TaskError::Exhausted { attempts, error });
                (id, (attempts, outcome))
            }
            Err(join_err) => {
                let id = join_err.id();
                let message = panic_message(join_err);
                (id, (1, Err(TaskError::Panicked(message))))
            }
        };
        let Some(item) = self.items.remove(&id) else {
            warn!(task_id = %id, "completion for unknown task");
            return;
        };

        self.completed += 1;
        let (attempts, outcome) = outcome;
        let reported = match outcome {
            Ok(value) => {
                self.batch.results.push(value);
                ItemOutcome::Succeeded { attempts }
            }
            Err(error) => {
                let message = error.to_string();
                warn!(attempts, error = %message, "item failed");
                self.batch.errors.push(BatchError { item, error });
                ItemOutcome::Failed { attempts, message }
            }
        };
        self.progress
            .item_finished(self.completed, self.total, &reported);
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}
