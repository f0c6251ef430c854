//! Build-system client abstraction.
//!
//! These traits are the only way the lifecycle waiter and the scenario steps
//! talk to a build server:
//! - `BuildClient`: last build, trigger, build by number, folder scan result
//! - `JobCatalog`: job lookup, listing, creation and deletion
//!
//! A REST implementation lives in `cdprobe-jenkins`; an in-memory fake for
//! tests lives in [`crate::fakes`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Result type for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Optional string-keyed parameters passed along with a trigger request.
pub type BuildParameters = BTreeMap<String, String>;

/// Errors reported by a build-system client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The job or build does not exist (HTTP 404 for REST clients).
    #[error("not found: {0}")]
    NotFound(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The request could not be built (bad job path, bad base URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Whether the server reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// One execution of a job as reported by the build server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// Build number, unique per job.
    pub number: u64,

    /// Whether the build is still running.
    #[serde(default)]
    pub building: bool,

    /// Terminal result (`SUCCESS`, `FAILURE`, ...). Empty while running.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub result: String,

    /// Browser URL of the build.
    #[serde(default)]
    pub url: Option<String>,

    /// Start time in milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl BuildInfo {
    /// A build that is still running.
    pub fn running(number: u64) -> Self {
        Self {
            number,
            building: true,
            result: String::new(),
            url: None,
            timestamp: None,
        }
    }

    /// A build that finished with the given result.
    pub fn finished(number: u64, result: impl Into<String>) -> Self {
        Self {
            number,
            building: false,
            result: result.into(),
            url: None,
            timestamp: None,
        }
    }

    /// When the build started, if the server reported it.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A job known to the build server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    /// Short name of the job.
    pub name: String,

    /// Slash-separated path including parent folders.
    #[serde(default)]
    pub full_name: Option<String>,

    /// Browser URL of the job.
    #[serde(default)]
    pub url: String,
}

/// Build lifecycle operations on a job.
///
/// `job` is a slash-separated job path such as `demo/build`.
#[async_trait]
pub trait BuildClient: Send + Sync {
    /// Most recent build of the job. `ClientError::NotFound` if there is none.
    async fn last_build(&self, job: &str) -> ClientResult<BuildInfo>;

    /// Ask the server to schedule a new build.
    async fn trigger_build(&self, job: &str, parameters: Option<&BuildParameters>)
        -> ClientResult<()>;

    /// A specific build of the job.
    async fn build(&self, job: &str, number: u64) -> ClientResult<BuildInfo>;

    /// Result of the latest branch/repository scan of an organisation or
    /// multibranch folder; `None` while the scan is still running.
    async fn organisation_scan_result(&self, job: &str) -> ClientResult<Option<String>>;
}

/// Job management operations.
#[async_trait]
pub trait JobCatalog: Send + Sync {
    /// Look up a job by slash-separated path.
    async fn job(&self, path: &str) -> ClientResult<JobInfo>;

    /// Top-level jobs.
    async fn jobs(&self) -> ClientResult<Vec<JobInfo>>;

    /// Create a top-level job from its XML definition.
    async fn create_job(&self, name: &str, config_xml: &str) -> ClientResult<()>;

    /// Delete a job by path.
    async fn delete_job(&self, path: &str) -> ClientResult<()>;
}
