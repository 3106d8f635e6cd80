//! Backoff retry executor
//!
//! Runs fallible store operations with exponential backoff, retrying only
//! transient/network-class failures. Every attempt sequence reports its
//! operation name, duration, and outcome through a non-blocking notice sink.
//! The backoff wait is raced against a cancellation token so shutdown never
//! blocks on a sleeping retry loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retry budget and backoff shape for store operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts (first try included)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on the backoff delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Compute the backoff delay before the attempt following `attempt`.
///
/// `delay = min(initial << (attempt - 1), max)`, with attempts of 1 or less
/// using `initial` unshifted and the shift clamped at 63. A `max_delay`
/// below `initial_delay` degenerates to a constant `initial_delay` wait.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(63);
    let initial = policy.initial_delay.as_millis() as u128;
    let cap = policy.max_delay.max(policy.initial_delay).as_millis() as u128;
    let delay = (initial << shift).min(cap);
    Duration::from_millis(delay as u64)
}

/// Outcome of a reported operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeOutcome {
    /// Operation completed
    Success,
    /// Operation failed with the given error text
    Failure(String),
    /// Operation was cancelled while waiting
    Cancelled,
}

/// A timing/outcome report emitted per operation
#[derive(Debug, Clone)]
pub struct Notice {
    /// Operation name (e.g. "select", "append", "update_batch")
    pub operation: String,
    /// Wall-clock duration across all attempts
    pub duration: Duration,
    /// Final outcome
    pub outcome: NoticeOutcome,
}

/// Non-blocking sink for operation notices
pub trait NoticeSink: Send + Sync {
    /// Report a notice. Must not block or fail.
    fn report(&self, notice: Notice);
}

/// Notice sink that logs through `tracing`
#[derive(Debug, Default)]
pub struct TracingNoticeSink;

impl NoticeSink for TracingNoticeSink {
    fn report(&self, notice: Notice) {
        match &notice.outcome {
            NoticeOutcome::Success => debug!(
                operation = %notice.operation,
                duration_ms = notice.duration.as_millis() as u64,
                "operation completed"
            ),
            NoticeOutcome::Failure(err) => warn!(
                operation = %notice.operation,
                duration_ms = notice.duration.as_millis() as u64,
                error = %err,
                "operation failed"
            ),
            NoticeOutcome::Cancelled => debug!(
                operation = %notice.operation,
                duration_ms = notice.duration.as_millis() as u64,
                "operation cancelled"
            ),
        }
    }
}

/// Notice sink backed by an unbounded channel.
///
/// Sends never block; notices emitted after the receiver is dropped are
/// discarded.
#[derive(Debug, Clone)]
pub struct ChannelNoticeSink {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNoticeSink {
    /// Create a sink and its receiving half
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NoticeSink for ChannelNoticeSink {
    fn report(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }
}

/// Notice sink that drops everything
#[derive(Debug, Default)]
pub struct NullNoticeSink;

impl NoticeSink for NullNoticeSink {
    fn report(&self, _notice: Notice) {}
}

/// Executes fallible operations under a retry policy.
///
/// Non-retriable errors return immediately. Retriable errors wait the
/// backoff delay, racing the wait against the cancellation token; a
/// cancellation received while waiting aborts with [`Error::Cancelled`].
/// After the attempt budget is spent the last error is surfaced wrapped
/// with the attempt count.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    notices: Arc<dyn NoticeSink>,
    cancel: CancellationToken,
}

impl RetryExecutor {
    /// Create an executor
    pub fn new(policy: RetryPolicy, notices: Arc<dyn NoticeSink>, cancel: CancellationToken) -> Self {
        Self {
            policy,
            notices,
            cancel,
        }
    }

    /// The configured policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` up to the configured attempt budget
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let budget = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if self.cancel.is_cancelled() {
                self.report(operation, start, NoticeOutcome::Cancelled);
                return Err(Error::Cancelled);
            }

            let err = match op().await {
                Ok(value) => {
                    self.report(operation, start, NoticeOutcome::Success);
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retriable() {
                self.report(operation, start, NoticeOutcome::Failure(err.to_string()));
                return Err(err);
            }

            if attempt >= budget {
                self.report(operation, start, NoticeOutcome::Failure(err.to_string()));
                return Err(Error::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = backoff_delay(&self.policy, attempt);
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, backing off"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.report(operation, start, NoticeOutcome::Cancelled);
                    return Err(Error::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn report(&self, operation: &str, start: Instant, outcome: NoticeOutcome) {
        self.notices.report(Notice {
            operation: operation.to_string(),
            duration: start.elapsed(),
            outcome,
        });
    }
}
