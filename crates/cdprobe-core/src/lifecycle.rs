//! Build lifecycle waits: trigger a job, wait for its build to start, wait
//! for that build to finish, and classify the result.
//!
//! Every wait is a [`poll_for`] loop with a one second interval whose probe
//! makes a single client call per tick.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::{BuildClient, BuildInfo, BuildParameters, ClientError};
use crate::poll::{format_duration, poll_for, PollConfig, PollError};

/// Interval between two client calls while waiting on a build.
pub const BUILD_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The only terminal result that counts as success.
pub const SUCCESS_RESULT: &str = "SUCCESS";

/// Errors produced while triggering or waiting on a build.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WaitError {
    #[error("{context} due to {source}")]
    Client {
        context: String,
        #[source]
        source: ClientError,
    },

    #[error("error triggering build {job} due to {source}")]
    Trigger {
        job: String,
        #[source]
        source: ClientError,
    },

    #[error("Timed out waiting for build to start for {job} waited for {}", format_duration(.timeout))]
    StartTimeout { job: String, timeout: Duration },

    #[error("Timed out waiting for job {job} build #{build_number} to finish. Waited for {}", format_duration(.timeout))]
    FinishTimeout {
        job: String,
        build_number: u64,
        timeout: Duration,
    },

    #[error("Job {job} build {build_number} has result {result}")]
    BuildFailed {
        job: String,
        build_number: u64,
        result: String,
    },
}

impl WaitError {
    fn client(context: impl Into<String>, source: ClientError) -> Self {
        WaitError::Client {
            context: context.into(),
            source,
        }
    }

    /// Whether a deadline elapsed while waiting.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            WaitError::StartTimeout { .. } | WaitError::FinishTimeout { .. }
        )
    }
    /// The build the error is about, once one had been detected.
    pub fn build_number(&self) -> Option<u64> {
        match self {
            WaitError::FinishTimeout { build_number, .. }
            | WaitError::BuildFailed { build_number, .. } => Some(*build_number),
            _ => None,
        }
    }
}

/// A job and, once it has started, the number of the build being tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReference {
    /// Slash-separated job path.
    pub job: String,

    /// `None` until a new build has been detected.
    pub build_number: Option<u64>,
}

impl BuildReference {
    /// Reference to a job whose build has not been detected yet.
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            build_number: None,
        }
    }

    /// Reference to a known build of a job.
    pub fn started(job: impl Into<String>, build_number: u64) -> Self {
        Self {
            job: job.into(),
            build_number: Some(build_number),
        }
    }
}

impl fmt::Display for BuildReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.build_number {
            Some(n) => write!(f, "{} #{}", self.job, n),
            None => write!(f, "{} (not started)", self.job),
        }
    }
}

/// A build detected by [`trigger_and_wait_for_start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedBuild {
    pub reference: BuildReference,
    pub build: BuildInfo,
}

/// Terminal classification of a wait operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum BuildOutcome {
    Succeeded,
    Failed(String),
    TimedOut(String),
    ClientError(String),
    /// A scenario step that has no implementation yet.
    NotImplemented(String),
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Succeeded)
    }

    /// Fold the result of a wait into an outcome.
    pub fn from_wait(result: &Result<BuildInfo, WaitError>) -> Self {
        match result {
            Ok(build) => classify_result(build),
            Err(err) => Self::from_error(err),
        }
    }

    /// Outcome of a wait that ended in `err`.
    pub fn from_error(err: &WaitError) -> Self {
        match err {
            WaitError::BuildFailed { result, .. } => BuildOutcome::Failed(result.clone()),
            err if err.is_timeout() => BuildOutcome::TimedOut(err.to_string()),
            err => BuildOutcome::ClientError(err.to_string()),
        }
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildOutcome::Succeeded => write!(f, "succeeded"),
            BuildOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            BuildOutcome::TimedOut(reason) => write!(f, "timed out: {reason}"),
            BuildOutcome::ClientError(reason) => write!(f, "client error: {reason}"),
            BuildOutcome::NotImplemented(step) => write!(f, "not implemented: {step}"),
        }
    }
}

/// Classify a finished build. Only the exact result `SUCCESS` succeeds.
pub fn classify_result(build: &BuildInfo) -> BuildOutcome {
    if build.result == SUCCESS_RESULT {
        BuildOutcome::Succeeded
    } else {
        BuildOutcome::Failed(build.result.clone())
    }
}

/// Fail with [`WaitError::BuildFailed`] unless the build succeeded.
pub fn assert_build_succeeded(build: &BuildInfo, job: &str) -> Result<(), WaitError> {
    info!(job, build_number = build.number, result = %build.result, "build has result");
    match classify_result(build) {
        BuildOutcome::Succeeded => Ok(()),
        _ => Err(WaitError::BuildFailed {
            job: job.to_string(),
            build_number: build.number,
            result: build.result.clone(),
        }),
    }
}

/// Trigger `job` and wait until a build newer than the current last one
/// shows up.
pub async fn trigger_and_wait_for_start(
    client: &dyn BuildClient,
    job: &str,
    start_timeout: Duration,
) -> Result<StartedBuild, WaitError> {
    trigger_with_parameters_and_wait_for_start(client, job, None, start_timeout).await
}

/// [`trigger_and_wait_for_start`] with build parameters.
pub async fn trigger_with_parameters_and_wait_for_start(
    client: &dyn BuildClient,
    job: &str,
    parameters: Option<&BuildParameters>,
    start_timeout: Duration,
) -> Result<StartedBuild, WaitError> {
    let previous = match client.last_build(job).await {
        Ok(build) => build.number,
        Err(err) if err.is_not_found() => 0,
        Err(err) => {
            return Err(WaitError::client(
                format!("error finding previous build for {job}"),
                err,
            ))
        }
    };
    debug!(job, previous, "recorded previous build");

    match client.trigger_build(job, parameters).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => {
            info!(job, error = %err, "trigger returned not found, waiting for a build anyway");
        }
        Err(source) => {
            return Err(WaitError::Trigger {
                job: job.to_string(),
                source,
            })
        }
    }

    let config = PollConfig::new(
        BUILD_POLL_INTERVAL,
        start_timeout,
        format!("build to start for {job}"),
    );
    let mut attempts: u32 = 0;

    let detected = poll_for(&config, || {
        attempts += 1;
        let attempt = attempts;
        async move {
            match client.last_build(job).await {
                Ok(build) if build.number != previous => Ok(Some(build)),
                Ok(_) => Ok(None),
                Err(err) if err.is_not_found() => {
                    warn!(job, attempt, error = %err, "last build not found while waiting for start");
                    Ok(None)
                }
                Err(err) => Err(WaitError::client(
                    format!("error finding last build attempt {attempt} for {job}"),
                    err,
                )),
            }
        }
    })
    .await;

    let build = match detected {
        Ok(build) => build,
        Err(PollError::Probe(err)) => return Err(err),
        Err(PollError::TimedOut { .. }) => {
            return Err(WaitError::StartTimeout {
                job: job.to_string(),
                timeout: start_timeout,
            })
        }
    };

    info!(job, build_number = build.number, "triggered job build");
    Ok(StartedBuild {
        reference: BuildReference::started(job, build.number),
        build,
    })
}

/// Wait for a started build to stop building.
pub async fn wait_for_finish(
    client: &dyn BuildClient,
    job: &str,
    build_number: u64,
    finish_timeout: Duration,
) -> Result<BuildInfo, WaitError> {
    info!(job, build_number, "waiting for build to finish");

    let config = PollConfig::new(
        BUILD_POLL_INTERVAL,
        finish_timeout,
        format!("job {job} build #{build_number} to finish"),
    );

    poll_for(&config, || async move {
        match client.build(job, build_number).await {
            Ok(build) if build.building => Ok(None),
            Ok(build) => Ok(Some(build)),
            Err(err) => Err(WaitError::client(
                format!("error finding job {job} build #{build_number} status"),
                err,
            )),
        }
    })
    .await
    .map_err(|err| match err {
        PollError::Probe(err) => err,
        PollError::TimedOut { .. } => WaitError::FinishTimeout {
            job: job.to_string(),
            build_number,
            timeout: finish_timeout,
        },
    })
}

/// Trigger `job`, wait for the new build to start, then wait for it to
/// finish. A build that already finished when it was detected is returned
/// without further polling.
pub async fn trigger_and_wait_for_finish(
    client: &dyn BuildClient,
    job: &str,
    start_timeout: Duration,
    finish_timeout: Duration,
) -> Result<BuildInfo, WaitError> {
    trigger_with_parameters_and_wait_for_finish(client, job, None, start_timeout, finish_timeout)
        .await
}

/// [`trigger_and_wait_for_finish`] with build parameters.
pub async fn trigger_with_parameters_and_wait_for_finish(
    client: &dyn BuildClient,
    job: &str,
    parameters: Option<&BuildParameters>,
    start_timeout: Duration,
    finish_timeout: Duration,
) -> Result<BuildInfo, WaitError> {
    let started =
        trigger_with_parameters_and_wait_for_start(client, job, parameters, start_timeout).await?;
    if !started.build.building {
        return Ok(started.build);
    }
    wait_for_finish(client, job, started.build.number, finish_timeout).await
}
