//! Bounded-concurrency batch execution.
//!
//! This crate provides:
//! - [`TaskRunner`] — runs one async operation per item with a bounded pool,
//!   a minimum dispatch interval, and linear-backoff retries
//! - [`CancelSignal`] — stops new dispatches while in-flight items drain
//! - [`progress`] — the reporter interface the runner calls after each item

pub mod engine;
pub mod progress;

pub use engine::{BatchError, BatchResult, CancelSignal, RunnerConfig, TaskError, TaskRunner};
pub use progress::{ItemOutcome, LogProgress, ProgressReporter, SilentProgress};
