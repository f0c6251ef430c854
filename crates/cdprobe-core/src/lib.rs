//! cdprobe core
//!
//! Behavioural probes for a Jenkins-driven continuous-delivery platform:
//! - `poll`: bounded poll-until-done primitive with a hard deadline
//! - `lifecycle`: trigger a job, wait for its build to start and finish,
//!   classify the result
//! - `steps`: Given/When/Then scenario steps built on the above
//!
//! The build server is reached only through the [`BuildClient`] and
//! [`JobCatalog`] traits; `cdprobe-jenkins` provides the REST implementation.

pub mod client;
pub mod config;
pub mod fakes;
pub mod job_path;
pub mod lifecycle;
pub mod poll;
pub mod retry;
pub mod steps;
pub mod telemetry;

pub use client::{
    BuildClient, BuildInfo, BuildParameters, ClientError, ClientResult, JobCatalog, JobInfo,
};
pub use config::{ConfigError, StepTimeouts};
pub use job_path::{expand_env_vars, JobPath, JobPathError};
pub use lifecycle::{
    assert_build_succeeded, classify_result, trigger_and_wait_for_finish,
    trigger_and_wait_for_start, trigger_with_parameters_and_wait_for_finish,
    trigger_with_parameters_and_wait_for_start, wait_for_finish, BuildOutcome, BuildReference,
    StartedBuild, WaitError, BUILD_POLL_INTERVAL,
};
pub use poll::{format_duration, poll, poll_for, PollConfig, PollError};
pub use retry::{retry_after, MultiError};
pub use steps::{JenkinsSteps, MultibranchJob, StepError, StepResult, MULTIBRANCH_BRANCH};
pub use telemetry::init_tracing;

/// cdprobe version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
