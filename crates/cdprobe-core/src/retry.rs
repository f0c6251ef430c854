//! Fixed-attempt retry with error aggregation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Every error collected by [`retry_after`], in the order they occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiError {
    pub errors: Vec<String>,
}

impl MultiError {
    /// Record an error.
    pub fn collect(&mut self, err: impl fmt::Display) {
        self.errors.push(err.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was collected, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.errors.join("\n"))
    }
}

impl std::error::Error for MultiError {}

/// Call `callback` up to `attempts` times, sleeping `delay` after each
/// failure. Returns on the first success; otherwise every failure is
/// reported in the returned [`MultiError`].
pub async fn retry_after<F, Fut, E>(
    attempts: usize,
    delay: Duration,
    mut callback: F,
) -> Result<(), MultiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    let mut failures = MultiError::default();
    for attempt in 1..=attempts {
        match callback().await {
            Ok(()) => return Ok(()),
            Err(err) => {
                debug!(attempt, attempts, error = %err, "attempt failed");
                failures.collect(err);
                tokio::time::sleep(delay).await;
            }
        }
    }
    failures.into_result()
}
