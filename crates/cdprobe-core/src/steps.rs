//! Scenario steps against a Jenkins-like server.
//!
//! `JenkinsSteps` owns the client handle and the state a scenario carries
//! between its Given/When/Then steps (the build number recorded before an
//! import, the build number produced by the last trigger).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::{BuildClient, BuildInfo, BuildParameters, ClientError, JobCatalog, JobInfo};
use crate::config::StepTimeouts;
use crate::job_path::{JobPath, JobPathError};
use crate::lifecycle::{
    assert_build_succeeded, trigger_with_parameters_and_wait_for_finish, wait_for_finish,
    BuildOutcome, WaitError, BUILD_POLL_INTERVAL, SUCCESS_RESULT,
};

/// Branch whose job stands for a multibranch project.
pub const MULTIBRANCH_BRANCH: &str = "master";
use crate::poll::{poll_for, PollConfig, PollError};
use crate::retry::{retry_after, MultiError};

/// Result type for scenario steps
pub type StepResult<T> = std::result::Result<T, StepError>;

/// Why a scenario step failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("{context} due to {source}")]
    Client {
        context: String,
        #[source]
        source: ClientError,
    },

    #[error("error found existing job {0}")]
    UnexpectedJob(String),

    #[error("error matching multi branch Job {requested} with previously configured job {configured}")]
    MismatchedJob { requested: String, configured: String },

    #[error("no multibranch job configured")]
    NoMultibranchJob,

    #[error("error the {job} org scan result was {result}")]
    ScanFailed { job: String, result: String },

    #[error("expected {expected} jobs, but found {actual}")]
    JobCount { expected: usize, actual: usize },

    #[error("No file found at path {}", .0.display())]
    Resource(PathBuf),

    #[error(transparent)]
    Path(#[from] JobPathError),

    #[error(transparent)]
    Retry(#[from] MultiError),

    #[error("{0}")]
    TimedOut(String),

    /// The step has no implementation yet.
    #[error("step is pending: {0}")]
    Pending(String),
}

impl StepError {
    fn client(context: impl Into<String>, source: ClientError) -> Self {
        StepError::Client {
            context: context.into(),
            source,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, StepError::Pending(_))
    }

    /// The build a failed wait was about, if one had been detected.
    pub fn build_number(&self) -> Option<u64> {
        match self {
            StepError::Wait(err) => err.build_number(),
            _ => None,
        }
    }

    /// Classify the failure. Pending steps are `NotImplemented`, never `Failed`.
    pub fn outcome(&self) -> BuildOutcome {
        match self {
            StepError::Wait(err) => BuildOutcome::from_error(err),
            StepError::Client { .. } => BuildOutcome::ClientError(self.to_string()),
            StepError::TimedOut(reason) => BuildOutcome::TimedOut(reason.clone()),
            StepError::Pending(step) => BuildOutcome::NotImplemented(step.clone()),
            _ => BuildOutcome::Failed(self.to_string()),
        }
    }
}

/// The `master` job of a multibranch project inside an organisation folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultibranchJob {
    pub organisation: String,
    pub name: String,
    pub path: String,
}

/// Steps for job and build scenarios.
pub struct JenkinsSteps<C> {
    client: Arc<C>,
    timeouts: StepTimeouts,
    last_build_number: u64,
    triggered_build_number: Option<u64>,
    multibranch_job: Option<MultibranchJob>,
}

impl<C> JenkinsSteps<C>
where
    C: BuildClient + JobCatalog,
{
    pub fn new(client: Arc<C>, timeouts: StepTimeouts) -> Self {
        Self {
            client,
            timeouts,
            last_build_number: 0,
            triggered_build_number: None,
            multibranch_job: None,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn timeouts(&self) -> &StepTimeouts {
        &self.timeouts
    }

    /// Build number recorded by [`Self::record_last_build`].
    pub fn last_build_number(&self) -> u64 {
        self.last_build_number
    }

    /// Build number produced by the last [`Self::trigger_job`].
    pub fn triggered_build_number(&self) -> Option<u64> {
        self.triggered_build_number
    }

    /// Job found by [`Self::organisation_job_contains_a_job`].
    pub fn multibranch_job(&self) -> Option<&MultibranchJob> {
        self.multibranch_job.as_ref()
    }

    /// Given there is a job called `name`.
    pub async fn there_is_a_job(&self, name: &str) -> StepResult<JobInfo> {
        self.client
            .job(name)
            .await
            .map_err(|e| StepError::client(format!("error finding existing job {name}"), e))
    }

    /// Then there should not be a job called `name`.
    pub async fn there_should_not_be_a_job(&self, name: &str) -> StepResult<()> {
        match self.client.job(name).await {
            Ok(job) => Err(StepError::UnexpectedJob(job.name)),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(StepError::client(format!("error looking up job {name}"), err)),
        }
    }

    /// When I delete the job `name`.
    pub async fn delete_job(&self, name: &str) -> StepResult<()> {
        self.there_is_a_job(name).await?;
        self.client
            .delete_job(name)
            .await
            .map_err(|e| StepError::client(format!("error deleting job {name}"), e))?;
        info!(job = name, "deleted job");
        Ok(())
    }

    /// Then there are `expected` top-level jobs.
    pub async fn there_are_jobs(&self, expected: usize) -> StepResult<()> {
        let jobs = self
            .client
            .jobs()
            .await
            .map_err(|e| StepError::client("error listing jobs", e))?;
        if jobs.len() != expected {
            return Err(StepError::JobCount {
                expected,
                actual: jobs.len(),
            });
        }
        Ok(())
    }

    /// Given there is a job `name`, creating it from `xml_path` if missing.
    pub async fn ensure_job_from_xml(&self, name: &str, xml_path: &Path) -> StepResult<JobInfo> {
        match self.client.job(name).await {
            Ok(job) => return Ok(job),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(StepError::client(format!("error finding job {name}"), err)),
        }

        let config_xml = tokio::fs::read_to_string(xml_path)
            .await
            .map_err(|_| StepError::Resource(xml_path.to_path_buf()))?;

        self.client
            .create_job(name, &config_xml)
            .await
            .map_err(|e| StepError::client("error creating Job", e))?;
        info!(job = name, path = %xml_path.display(), "created job from XML");

        self.client
            .job(name)
            .await
            .map_err(|e| StepError::client("error creating Job", e))
    }

    /// Remember the job's current last build number (0 when it has none) so a
    /// later step can tell a new build apart.
    pub async fn record_last_build(&mut self, name: &str) -> StepResult<u64> {
        self.last_build_number = match self.client.last_build(name).await {
            Ok(build) => build.number,
            Err(err) if err.is_not_found() => 0,
            Err(err) => {
                return Err(StepError::client(
                    format!("Failed to find last build for job {name}"),
                    err,
                ))
            }
        };
        Ok(self.last_build_number)
    }

    /// Resolve a job expression to an existing job.
    pub async fn job_by_expression(&self, expr: &str) -> StepResult<(JobPath, JobInfo)> {
        let path = JobPath::from_expression(expr)?;
        let job = self
            .client
            .job(&path.to_string())
            .await
            .map_err(|e| StepError::client(format!("Failed to find job {path}"), e))?;
        Ok((path, job))
    }

    /// When we trigger the job `expr` (and it finishes).
    pub async fn trigger_job(&mut self, expr: &str) -> StepResult<BuildInfo> {
        self.trigger_job_with_parameters(expr, None).await
    }

    /// When we trigger the job `expr` with parameters (and it finishes).
    pub async fn trigger_job_with_parameters(
        &mut self,
        expr: &str,
        parameters: Option<&BuildParameters>,
    ) -> StepResult<BuildInfo> {
        let (path, _) = self.job_by_expression(expr).await?;
        let build = trigger_with_parameters_and_wait_for_finish(
            self.client.as_ref(),
            &path.to_string(),
            parameters,
            self.timeouts.build_start,
            self.timeouts.build_finish,
        )
        .await?;
        self.triggered_build_number = Some(build.number);
        Ok(build)
    }

    /// When I trigger the job `name`, without waiting for its build.
    pub async fn trigger_job_no_wait(&self, name: &str) -> StepResult<()> {
        self.client
            .job(name)
            .await
            .map_err(|e| StepError::client(format!("error finding existing job {name}"), e))?;
        self.client
            .trigger_build(name, None)
            .await
            .map_err(|e| StepError::client(format!("error triggering build {name}"), e))?;
        info!(job = name, "triggered build");
        Ok(())
    }

    /// Given the organisation job `organisation` contains the multibranch
    /// project `name`. Its `master` job is remembered for the steps below.
    pub async fn organisation_job_contains_a_job(
        &mut self,
        organisation: &str,
        name: &str,
    ) -> StepResult<JobInfo> {
        let path = format!("{organisation}/{name}/{MULTIBRANCH_BRANCH}");
        let job = self.client.job(&path).await.map_err(|e| {
            StepError::client(
                format!("error finding multibranch job {name} in organisation job {organisation}"),
                e,
            )
        })?;
        self.multibranch_job = Some(MultibranchJob {
            organisation: organisation.to_string(),
            name: name.to_string(),
            path,
        });
        Ok(job)
    }

    /// When I trigger the multibranch job `name`, which must be the one
    /// found by [`Self::organisation_job_contains_a_job`]. Does not wait.
    pub async fn trigger_multibranch_job(&self, name: &str) -> StepResult<()> {
        let job = self.configured_multibranch_job(name)?;
        self.client
            .trigger_build(&job.path, None)
            .await
            .map_err(|e| StepError::client(format!("error triggering job {}", job.path), e))?;
        info!(job = %job.path, "triggered multibranch job");
        Ok(())
    }

    /// Then the multibranch job `name` is successful.
    pub async fn multibranch_job_succeeds(&self, name: &str) -> StepResult<BuildInfo> {
        let job = self.configured_multibranch_job(name)?;
        self.last_build_succeeds(&job.path).await
    }

    fn configured_multibranch_job(&self, name: &str) -> StepResult<&MultibranchJob> {
        match &self.multibranch_job {
            Some(job) if job.name == name => Ok(job),
            Some(job) => Err(StepError::MismatchedJob {
                requested: name.to_string(),
                configured: job.name.clone(),
            }),
            None => Err(StepError::NoMultibranchJob),
        }
    }

    /// Wait until the job path `expr` resolves on the server.
    pub async fn wait_for_job(&self, expr: &str, timeout: Duration) -> StepResult<JobInfo> {
        let path = JobPath::from_expression(expr)?;
        let full_path = path.to_string();
        let config = PollConfig::new(
            BUILD_POLL_INTERVAL,
            timeout,
            format!("build to be created for {full_path}"),
        );
        let client = self.client.as_ref();
        let full_path = full_path.as_str();

        poll_for(&config, || async move {
            match client.job(full_path).await {
                Ok(job) => Ok(Some(job)),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(StepError::client(
                    format!("Failed to find job {full_path}"),
                    err,
                )),
            }
        })
        .await
        .map_err(|err| match err {
            PollError::Probe(err) => err,
            timed_out => StepError::TimedOut(timed_out.to_string()),
        })
    }

    /// Then there should be a job `expr` that completes successfully.
    ///
    /// Waits for the build recorded by the last trigger; without one, waits
    /// for the job's first build to appear.
    pub async fn job_completes_successfully(&self, expr: &str) -> StepResult<BuildInfo> {
        let job = self.wait_for_job(expr, self.timeouts.job_create).await?;
        let path = JobPath::from_expression(expr)?.to_string();

        let build_number = match self.triggered_build_number {
            Some(n) => n,
            None => self.wait_for_first_build(&path).await?,
        };

        let build = wait_for_finish(
            self.client.as_ref(),
            &path,
            build_number,
            self.timeouts.build_finish,
        )
        .await?;
        let label = if job.url.is_empty() { path } else { job.url };
        assert_build_succeeded(&build, &label)?;
        Ok(build)
    }

    async fn wait_for_first_build(&self, path: &str) -> StepResult<u64> {
        let config = PollConfig::new(
            BUILD_POLL_INTERVAL,
            self.timeouts.build_start,
            format!("first build of {path}"),
        );
        let client = self.client.as_ref();

        poll_for(&config, || async move {
            match client.last_build(path).await {
                Ok(build) => Ok(Some(build.number)),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(StepError::client(
                    format!("error getting last build for job {path}"),
                    err,
                )),
            }
        })
        .await
        .map_err(|err| match err {
            PollError::Probe(err) => err,
            timed_out => StepError::TimedOut(timed_out.to_string()),
        })
    }

    /// Then the last build of `name` is successful.
    ///
    /// Retries until the last build reports a result, then requires `SUCCESS`.
    pub async fn last_build_succeeds(&self, name: &str) -> StepResult<BuildInfo> {
        let client = self.client.as_ref();

        retry_after(
            self.timeouts.result_attempts,
            self.timeouts.result_delay,
            || async move {
                let build = client.last_build(name).await.map_err(|e| {
                    format!("error getting last build for job {name} {e}")
                })?;
                if build.result.is_empty() {
                    return Err("build still running".to_string());
                }
                Ok::<(), String>(())
            },
        )
        .await?;

        let build = client
            .last_build(name)
            .await
            .map_err(|e| StepError::client(format!("error getting last build for job {name}"), e))?;
        assert_build_succeeded(&build, name)?;
        Ok(build)
    }

    /// When we import `repository` through the import job `job`, selecting
    /// `pipeline`. Records the job's last build first so the import build can
    /// be told apart.
    pub async fn trigger_import(
        &mut self,
        job: &str,
        repository: &str,
        pipeline: &str,
    ) -> StepResult<()> {
        self.record_last_build(job).await?;

        let parameters = BuildParameters::from([
            ("repository".to_string(), repository.to_string()),
            ("pipeline".to_string(), pipeline.to_string()),
        ]);
        self.client
            .trigger_build(job, Some(&parameters))
            .await
            .map_err(|e| StepError::client(format!("error triggering Job {job}"), e))?;
        info!(job, repository, pipeline, "triggered import");
        Ok(())
    }

    /// Then the import build started by [`Self::trigger_import`] completes
    /// successfully. Lookup failures are logged and polling continues.
    pub async fn import_completes_successfully(&self, job: &str) -> StepResult<BuildInfo> {
        let config = PollConfig::new(
            BUILD_POLL_INTERVAL,
            self.timeouts.import,
            format!("import job {job} to complete"),
        );
        let client = self.client.as_ref();
        let previous = self.last_build_number;

        let build = poll_for(&config, || async move {
            match client.last_build(job).await {
                Ok(build) if build.number == previous => {
                    debug!(job, build_number = build.number, "import job not started yet");
                    Ok(None)
                }
                Ok(build) if build.building => Ok(None),
                Ok(build) => Ok(Some(build)),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => {
                    warn!(job, error = %err, "could not find last build of import job");
                    Ok::<_, StepError>(None)
                }
            }
        })
        .await
        .map_err(|err| match err {
            PollError::Probe(err) => err,
            timed_out => StepError::TimedOut(timed_out.to_string()),
        })?;

        assert_build_succeeded(&build, job)?;
        Ok(build)
    }

    /// Then wait to check the organisation scan for `name` is successful.
    ///
    /// Retries until the scan reports a result, then requires `SUCCESS`.
    pub async fn organisation_scan_succeeds(&self, name: &str) -> StepResult<String> {
        self.there_is_a_job(name).await?;
        let client = self.client.as_ref();

        retry_after(
            self.timeouts.result_attempts,
            self.timeouts.result_delay,
            || async move {
                match client.organisation_scan_result(name).await {
                    Ok(Some(_)) => Ok(()),
                    Ok(None) => Err("organisation scan still running".to_string()),
                    Err(e) => Err(format!("error getting org scan result {e}")),
                }
            },
        )
        .await?;

        let result = client
            .organisation_scan_result(name)
            .await
            .map_err(|e| StepError::client("error getting org scan result", e))?
            .unwrap_or_default();
        if result != SUCCESS_RESULT {
            return Err(StepError::ScanFailed {
                job: name.to_string(),
                result,
            });
        }
        info!(job = name, "organisation scan succeeded");
        Ok(result)
    }

    /// Then the organisation scan for `name` completes.
    pub async fn organisation_scan_completes(&self, name: &str) -> StepResult<()> {
        warn!(job = name, "organisation scan step is not implemented");
        Err(StepError::Pending(format!(
            "the organisation scan for {name} completes"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeJenkins;

    fn steps(fake: FakeJenkins) -> JenkinsSteps<FakeJenkins> {
        JenkinsSteps::new(Arc::new(fake), StepTimeouts::default())
    }

    #[tokio::test]
    async fn test_there_is_a_job() {
        let s = steps(FakeJenkins::new().with_job("demo"));
        assert_eq!(s.there_is_a_job("demo").await.unwrap().name, "demo");

        let err = s.there_is_a_job("other").await.unwrap_err();
        assert!(err.to_string().starts_with("error finding existing job other"));
        assert!(matches!(err.outcome(), BuildOutcome::ClientError(_)));
    }

    #[tokio::test]
    async fn test_there_should_not_be_a_job() {
        let s = steps(FakeJenkins::new().with_job("demo"));
        assert!(s.there_should_not_be_a_job("other").await.is_ok());

        let err = s.there_should_not_be_a_job("demo").await.unwrap_err();
        assert_eq!(err.to_string(), "error found existing job demo");
    }

    #[tokio::test]
    async fn test_delete_job() {
        let s = steps(FakeJenkins::new().with_job("demo"));
        s.delete_job("demo").await.unwrap();
        assert!(s.there_should_not_be_a_job("demo").await.is_ok());
        assert!(s.delete_job("demo").await.is_err());
    }

    #[tokio::test]
    async fn test_there_are_jobs() {
        let s = steps(FakeJenkins::new().with_job("a").with_job("b"));
        assert!(s.there_are_jobs(2).await.is_ok());

        let err = s.there_are_jobs(3).await.unwrap_err();
        assert_eq!(err.to_string(), "expected 3 jobs, but found 2");
    }

    #[tokio::test]
    async fn test_ensure_job_from_xml_creates_missing_job() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dir.path().join("import_job.xml");
        std::fs::write(&xml, "<project><description>import</description></project>").unwrap();

        let s = steps(FakeJenkins::new());
        let job = s.ensure_job_from_xml("fabric8-import", &xml).await.unwrap();
        assert_eq!(job.name, "fabric8-import");

        // Second call finds the existing job instead of creating it again.
        let again = s.ensure_job_from_xml("fabric8-import", &xml).await.unwrap();
        assert_eq!(again, job);
    }

    #[tokio::test]
    async fn test_ensure_job_from_missing_xml() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.xml");

        let s = steps(FakeJenkins::new());
        let err = s.ensure_job_from_xml("x", &missing).await.unwrap_err();
        assert!(matches!(err, StepError::Resource(_)));
        assert!(err.to_string().starts_with("No file found at path"));
    }

    #[tokio::test]
    async fn test_record_last_build_defaults_to_zero() {
        let fake = FakeJenkins::new().with_job("import").with_job("built");
        fake.script_last_builds("built", [Ok(BuildInfo::finished(9, "SUCCESS"))]);
        let mut s = steps(fake);

        assert_eq!(s.record_last_build("import").await.unwrap(), 0);
        assert_eq!(s.record_last_build("built").await.unwrap(), 9);
        assert_eq!(s.last_build_number(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_job_records_build_number() {
        let fake = FakeJenkins::new().with_job("demo/build");
        fake.script_last_builds(
            "demo/build",
            [
                Ok(BuildInfo::finished(3, "SUCCESS")),
                Ok(BuildInfo::finished(3, "SUCCESS")),
                Ok(BuildInfo::running(4)),
            ],
        );
        fake.script_builds("demo/build", [Ok(BuildInfo::finished(4, "FAILURE"))]);
        let mut s = steps(fake);

        let build = s.trigger_job("demo/build").await.unwrap();
        assert_eq!(build.number, 4);
        assert_eq!(build.result, "FAILURE");
        assert_eq!(s.triggered_build_number(), Some(4));
    }

    #[tokio::test]
    async fn test_trigger_unknown_job_fails_fast() {
        let mut s = steps(FakeJenkins::new());
        let err = s.trigger_job("nope/master").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to find job nope/master"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_job_times_out() {
        let s = steps(FakeJenkins::new());
        let err = s
            .wait_for_job("org/app", Duration::from_secs(3))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Timed out waiting for build to be created for org/app waited for 3s"
        );
        assert!(matches!(err.outcome(), BuildOutcome::TimedOut(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_job_rejects_empty_expression() {
        let s = steps(FakeJenkins::new());
        let err = s.wait_for_job("/", Duration::from_secs(3)).await.unwrap_err();
        assert!(matches!(err, StepError::Path(JobPathError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_completes_successfully_without_trigger() {
        let fake = FakeJenkins::new().with_job("org/app/master");
        fake.script_last_builds("org/app/master", [Ok(BuildInfo::running(1))]);
        fake.script_builds(
            "org/app/master",
            [Ok(BuildInfo::running(1)), Ok(BuildInfo::finished(1, "SUCCESS"))],
        );
        let s = steps(fake);

        let build = s.job_completes_successfully("org/app/master").await.unwrap();
        assert_eq!(build.number, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_completes_with_failure() {
        let fake = FakeJenkins::new().with_job("app");
        fake.script_last_builds("app", [Ok(BuildInfo::finished(2, "UNSTABLE"))]);
        fake.script_builds("app", [Ok(BuildInfo::finished(2, "UNSTABLE"))]);
        let s = steps(fake);

        let err = s.job_completes_successfully("app").await.unwrap_err();
        assert_eq!(err.outcome(), BuildOutcome::Failed("UNSTABLE".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_build_succeeds_waits_for_result() {
        let fake = FakeJenkins::new().with_job("multi");
        fake.script_last_builds(
            "multi",
            [
                Ok(BuildInfo::running(5)),
                Ok(BuildInfo::running(5)),
                Ok(BuildInfo::finished(5, "SUCCESS")),
            ],
        );
        let s = steps(fake);

        let build = s.last_build_succeeds("multi").await.unwrap();
        assert_eq!(build.number, 5);
        assert_eq!(s.client().last_build_calls("multi"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_build_succeeds_gives_up() {
        let fake = FakeJenkins::new().with_job("multi");
        fake.script_last_builds("multi", [Ok(BuildInfo::running(5))]);
        let mut timeouts = StepTimeouts::default();
        timeouts.result_attempts = 3;
        let s = JenkinsSteps::new(Arc::new(fake), timeouts);

        let err = s.last_build_succeeds("multi").await.unwrap_err();
        match err {
            StepError::Retry(multi) => assert_eq!(multi.errors.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_passes_parameters_and_waits_for_new_build() {
        let fake = FakeJenkins::new().with_job("fabric8-import");
        fake.script_last_builds(
            "fabric8-import",
            [
                Ok(BuildInfo::finished(6, "SUCCESS")),
                Ok(BuildInfo::finished(6, "SUCCESS")),
                Err(ClientError::Transport("connection reset".to_string())),
                Ok(BuildInfo::running(7)),
                Ok(BuildInfo::finished(7, "SUCCESS")),
            ],
        );
        let mut s = steps(fake);

        s.trigger_import("fabric8-import", "octo/demo", "maven")
            .await
            .unwrap();
        assert_eq!(s.last_build_number(), 6);

        let triggers = s.client().triggers("fabric8-import");
        let params = triggers[0].as_ref().unwrap();
        assert_eq!(params["repository"], "octo/demo");
        assert_eq!(params["pipeline"], "maven");

        let build = s.import_completes_successfully("fabric8-import").await.unwrap();
        assert_eq!(build.number, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_that_never_starts_times_out() {
        let fake = FakeJenkins::new().with_job("fabric8-import");
        fake.script_last_builds("fabric8-import", [Ok(BuildInfo::finished(6, "SUCCESS"))]);
        let mut s = steps(fake);

        s.trigger_import("fabric8-import", "octo/demo", "maven")
            .await
            .unwrap();
        let err = s
            .import_completes_successfully("fabric8-import")
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::TimedOut(_)));
        assert!(err.to_string().contains("waited for 2m"));
    }

    #[tokio::test]
    async fn test_pending_step_is_not_a_failure() {
        let s = steps(FakeJenkins::new());
        let err = s.organisation_scan_completes("fabric8").await.unwrap_err();
        assert!(err.is_pending());
        assert!(matches!(err.outcome(), BuildOutcome::NotImplemented(_)));
    }

    #[tokio::test]
    async fn test_trigger_job_no_wait() {
        let fake = Arc::new(FakeJenkins::new().with_job("demo"));
        let s = JenkinsSteps::new(fake.clone(), StepTimeouts::default());

        s.trigger_job_no_wait("demo").await.unwrap();
        assert_eq!(fake.triggers("demo"), vec![None]);
        assert_eq!(fake.last_build_calls("demo"), 0);

        let err = s.trigger_job_no_wait("nope").await.unwrap_err();
        assert!(err.to_string().starts_with("error finding existing job nope"));
        assert!(fake.triggers("nope").is_empty());
    }

    #[tokio::test]
    async fn test_organisation_job_contains_a_job() {
        let mut s = steps(FakeJenkins::new().with_job("acme/app/master"));

        let job = s.organisation_job_contains_a_job("acme", "app").await.unwrap();
        assert_eq!(job.name, "master");
        assert_eq!(s.multibranch_job().unwrap().path, "acme/app/master");

        let err = s
            .organisation_job_contains_a_job("acme", "other")
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("error finding multibranch job other in organisation job acme"));
    }

    #[tokio::test]
    async fn test_trigger_multibranch_job_checks_configured_name() {
        let fake = Arc::new(FakeJenkins::new().with_job("acme/app/master"));
        let mut s = JenkinsSteps::new(fake.clone(), StepTimeouts::default());

        let err = s.trigger_multibranch_job("app").await.unwrap_err();
        assert!(matches!(err, StepError::NoMultibranchJob));

        s.organisation_job_contains_a_job("acme", "app").await.unwrap();
        let err = s.trigger_multibranch_job("web").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "error matching multi branch Job web with previously configured job app"
        );

        s.trigger_multibranch_job("app").await.unwrap();
        assert_eq!(fake.triggers("acme/app/master"), vec![None]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multibranch_job_succeeds() {
        let fake = FakeJenkins::new().with_job("acme/app/master");
        fake.script_last_builds(
            "acme/app/master",
            [
                Ok(BuildInfo::running(1)),
                Ok(BuildInfo::finished(1, "SUCCESS")),
            ],
        );
        let mut s = steps(fake);
        s.organisation_job_contains_a_job("acme", "app").await.unwrap();

        let build = s.multibranch_job_succeeds("app").await.unwrap();
        assert_eq!(build.number, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_organisation_scan_succeeds() {
        let fake = FakeJenkins::new().with_job("acme").with_job("broken");
        fake.script_scan_results("acme", [Ok(None), Ok(None), Ok(Some("SUCCESS".to_string()))]);
        fake.script_scan_results("broken", [Ok(Some("FAILURE".to_string()))]);
        let s = steps(fake);

        assert_eq!(s.organisation_scan_succeeds("acme").await.unwrap(), "SUCCESS");

        let err = s.organisation_scan_succeeds("broken").await.unwrap_err();
        assert_eq!(err.to_string(), "error the broken org scan result was FAILURE");
        assert!(matches!(err.outcome(), BuildOutcome::Failed(_)));

        assert!(s.organisation_scan_succeeds("missing").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_organisation_scan_that_never_finishes() {
        let fake = FakeJenkins::new().with_job("acme");
        fake.script_scan_results("acme", [Ok(None)]);
        let timeouts = StepTimeouts {
            result_attempts: 3,
            ..StepTimeouts::default()
        };
        let s = JenkinsSteps::new(Arc::new(fake), timeouts);

        let err = s.organisation_scan_succeeds("acme").await.unwrap_err();
        assert!(matches!(err, StepError::Retry(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_build_keeps_its_number() {
        let fake = FakeJenkins::new().with_job("demo");
        fake.script_builds("demo", [Ok(BuildInfo::finished(6, "FAILURE"))]);
        fake.script_last_builds("demo", [Ok(BuildInfo::finished(6, "FAILURE"))]);
        let s = steps(fake);

        let err = s.job_completes_successfully("demo").await.unwrap_err();
        assert_eq!(err.build_number(), Some(6));
        assert_eq!(StepError::NoMultibranchJob.build_number(), None);
    }
}
