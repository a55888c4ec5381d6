//! Progress reporting for batch runs.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::info;

/// How a single item resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded { attempts: u32 },
    Failed { attempts: u32, message: String },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Callback interface for batch progress.
pub trait ProgressReporter: Send + Sync {
    /// Called once before the first dispatch.
    fn batch_started(&self, total: usize);
    /// Called after each item resolves, successfully or not.
    fn item_finished(&self, completed: usize, total: usize, outcome: &ItemOutcome);
    /// Called once after the last in-flight item resolves.
    fn batch_finished(&self, succeeded: usize, failed: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn batch_started(&self, _total: usize) {}
    fn item_finished(&self, _completed: usize, _total: usize, _outcome: &ItemOutcome) {}
    fn batch_finished(&self, _succeeded: usize, _failed: usize) {}
}

/// Reports progress through `tracing`, at most one line per interval.
pub struct LogProgress {
    label: String,
    interval: Duration,
    state: Mutex<LogState>,
}

struct LogState {
    started: Instant,
    last_logged: Option<Instant>,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_interval(label, Duration::from_secs(1))
    }

    pub fn with_interval(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval,
            state: Mutex::new(LogState {
                started: Instant::now(),
                last_logged: None,
            }),
        }
    }
}

impl ProgressReporter for LogProgress {
    fn batch_started(&self, total: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.started = Instant::now();
            state.last_logged = None;
        }
        info!(label = %self.label, total, "batch started");
    }

    fn item_finished(&self, completed: usize, total: usize, _outcome: &ItemOutcome) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let now = Instant::now();
        let due = state
            .last_logged
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if !due && completed < total {
            return;
        }
        state.last_logged = Some(now);

        let elapsed = now.duration_since(state.started);
        let percent = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        let eta_secs = estimate_remaining(elapsed, completed, total).as_secs();
        info!(
            label = %self.label,
            completed,
            total,
            percent = format!("{percent:.1}"),
            elapsed_secs = elapsed.as_secs(),
            eta_secs,
            "progress"
        );
    }

    fn batch_finished(&self, succeeded: usize, failed: usize) {
        let elapsed = self
            .state
            .lock()
            .map(|s| s.started.elapsed())
            .unwrap_or_default();
        info!(
            label = %self.label,
            succeeded,
            failed,
            duration_ms = elapsed.as_millis() as u64,
            "batch finished"
        );
    }
}

/// Linear extrapolation of the remaining time from the average per item.
fn estimate_remaining(elapsed: Duration, completed: usize, total: usize) -> Duration {
    if completed == 0 || completed >= total {
        return Duration::ZERO;
    }
    let per_item = elapsed / completed as u32;
    per_item * (total - completed) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_extrapolates_average() {
        let eta = estimate_remaining(Duration::from_secs(10), 5, 10);
        assert_eq!(eta, Duration::from_secs(10));
        assert_eq!(estimate_remaining(Duration::from_secs(3), 0, 10), Duration::ZERO);
        assert_eq!(estimate_remaining(Duration::from_secs(3), 10, 10), Duration::ZERO);
    }

    #[test]
    fn log_progress_accepts_updates() {
        let progress = LogProgress::with_interval("test", Duration::from_millis(0));
        progress.batch_started(2);
        progress.item_finished(1, 2, &ItemOutcome::Succeeded { attempts: 1 });
        progress.item_finished(
            2,
            2,
            &ItemOutcome::Failed {
                attempts: 3,
                message: "boom".into(),
            },
        );
        progress.batch_finished(1, 1);
        assert!(progress.state.lock().unwrap().last_logged.is_some());
    }
}
