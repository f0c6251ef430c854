//! Bounded polling primitive.
//!
//! [`poll`] invokes a probe until it reports completion, fails, or the
//! configured deadline passes. Probe errors are never retried: a probe that
//! wants to tolerate transient failures must absorb them itself.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// Immutable settings for a single poll operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Sleep between two probe attempts. Must be non-zero.
    pub interval: Duration,

    /// Overall wall-clock budget, measured from entry into [`poll`].
    pub timeout: Duration,

    /// What is being waited for; embedded in the timeout message.
    pub description: String,
}

impl PollConfig {
    /// Create a poll configuration.
    pub fn new(interval: Duration, timeout: Duration, description: impl Into<String>) -> Self {
        Self {
            interval,
            timeout,
            description: description.into(),
        }
    }
}

/// Why a poll operation stopped without completing.
#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    /// The probe failed; carries the probe's error unchanged.
    #[error(transparent)]
    Probe(E),

    /// The deadline passed while the probe still reported "not done".
    #[error("Timed out waiting for {description} waited for {}", format_duration(.timeout))]
    TimedOut {
        description: String,
        timeout: Duration,
    },
}

impl<E> PollError<E> {
    /// Whether the poll ended because of its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::TimedOut { .. })
    }

    /// Return the probe error, if the poll stopped because of one.
    pub fn into_probe_error(self) -> Option<E> {
        match self {
            PollError::Probe(err) => Some(err),
            PollError::TimedOut { .. } => None,
        }
    }
}

/// Render a duration the way timeout messages show it (`20s`, `40m`, `1m 30s`).
pub fn format_duration(duration: &Duration) -> String {
    humantime::format_duration(*duration).to_string()
}

/// Poll `probe` until it returns `Ok(true)`, an error, or the deadline passes.
///
/// The first probe runs immediately. The deadline is checked after each
/// "not done" answer and before sleeping, so at least one probe always runs
/// and no sleep is taken once the deadline has been reached.
pub async fn poll<F, Fut, E>(config: &PollConfig, mut probe: F) -> Result<(), PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    poll_for(config, || {
        let check = probe();
        async move { check.await.map(|done| done.then_some(())) }
    })
    .await
}

/// Like [`poll`], but the probe hands back a value once it is done.
///
/// `Ok(None)` means "not yet"; `Ok(Some(value))` ends the poll with `value`.
pub async fn poll_for<T, F, Fut, E>(config: &PollConfig, mut probe: F) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    // `None` when the timeout is too large to represent: no deadline.
    let deadline = Instant::now().checked_add(config.timeout);
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        if let Some(value) = probe().await.map_err(PollError::Probe)? {
            trace!(description = %config.description, attempts, "poll complete");
            return Ok(value);
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(PollError::TimedOut {
                description: config.description.clone(),
                timeout: config.timeout,
            });
        }

        trace!(description = %config.description, attempts, "not ready, sleeping");
        tokio::time::sleep(config.interval).await;
    }
}
