//! In-memory fake build server (testing only)
//!
//! `FakeJenkins` implements [`BuildClient`] and [`JobCatalog`] from scripted
//! responses so lifecycle waits and scenario steps can run without a server.
//! Each scripted queue yields its entries in order and then keeps repeating
//! the final entry.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::client::*;

#[derive(Debug, Default)]
struct FakeJob {
    info: Option<JobInfo>,
    last_builds: VecDeque<ClientResult<BuildInfo>>,
    builds: VecDeque<ClientResult<BuildInfo>>,
    scan_results: VecDeque<ClientResult<Option<String>>>,
    trigger_error: Option<ClientError>,
    triggers: Vec<Option<BuildParameters>>,
    last_build_calls: usize,
    build_calls: usize,
}

impl FakeJob {
    fn exists(&self) -> bool {
        self.info.is_some()
    }
}

fn next_scripted<T: Clone>(
    queue: &mut VecDeque<ClientResult<T>>,
    missing: impl FnOnce() -> ClientError,
) -> ClientResult<T> {
    if queue.len() > 1 {
        queue.pop_front().unwrap_or_else(|| Err(missing()))
    } else {
        queue.front().cloned().unwrap_or_else(|| Err(missing()))
    }
}

/// Scriptable in-memory build server.
#[derive(Debug, Default)]
pub struct FakeJenkins {
    jobs: Mutex<BTreeMap<String, FakeJob>>,
}

impl FakeJenkins {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BTreeMap<String, FakeJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job at `path`.
    pub fn with_job(self, path: &str) -> Self {
        self.add_job(path);
        self
    }

    /// Register a job at `path` (no-op if it already exists).
    pub fn add_job(&self, path: &str) {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let url = format!(
            "http://jenkins.test/{}/",
            path.split('/')
                .map(|segment| format!("job/{segment}"))
                .collect::<Vec<_>>()
                .join("/")
        );
        let mut jobs = self.state();
        let job = jobs.entry(path.to_string()).or_default();
        job.info.get_or_insert(JobInfo {
            name,
            full_name: Some(path.to_string()),
            url,
        });
    }

    /// Script the answers to successive `last_build` calls.
    pub fn script_last_builds<I>(&self, path: &str, responses: I)
    where
        I: IntoIterator<Item = ClientResult<BuildInfo>>,
    {
        let mut jobs = self.state();
        jobs.entry(path.to_string())
            .or_default()
            .last_builds
            .extend(responses);
    }

    /// Script the answers to successive `build` calls.
    pub fn script_builds<I>(&self, path: &str, responses: I)
    where
        I: IntoIterator<Item = ClientResult<BuildInfo>>,
    {
        let mut jobs = self.state();
        jobs.entry(path.to_string()).or_default().builds.extend(responses);
    }

    /// Script the answers to successive `organisation_scan_result` calls.
    pub fn script_scan_results<I>(&self, path: &str, responses: I)
    where
        I: IntoIterator<Item = ClientResult<Option<String>>>,
    {
        let mut jobs = self.state();
        jobs.entry(path.to_string())
            .or_default()
            .scan_results
            .extend(responses);
    }

    /// Make every trigger of `path` fail with `error`.
    pub fn fail_trigger(&self, path: &str, error: ClientError) {
        let mut jobs = self.state();
        jobs.entry(path.to_string()).or_default().trigger_error = Some(error);
    }

    pub fn has_job(&self, path: &str) -> bool {
        self.state().get(path).is_some_and(FakeJob::exists)
    }

    pub fn last_build_calls(&self, path: &str) -> usize {
        self.state().get(path).map_or(0, |job| job.last_build_calls)
    }

    pub fn build_calls(&self, path: &str) -> usize {
        self.state().get(path).map_or(0, |job| job.build_calls)
    }

    /// Parameters of every trigger request received for `path`.
    pub fn triggers(&self, path: &str) -> Vec<Option<BuildParameters>> {
        self.state()
            .get(path)
            .map(|job| job.triggers.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BuildClient for FakeJenkins {
    async fn last_build(&self, job: &str) -> ClientResult<BuildInfo> {
        let mut jobs = self.state();
        let Some(state) = jobs.get_mut(job) else {
            return Err(ClientError::NotFound(job.to_string()));
        };
        state.last_build_calls += 1;
        next_scripted(&mut state.last_builds, || {
            ClientError::NotFound(format!("{job}/lastBuild"))
        })
    }

    async fn trigger_build(
        &self,
        job: &str,
        parameters: Option<&BuildParameters>,
    ) -> ClientResult<()> {
        let mut jobs = self.state();
        let Some(state) = jobs.get_mut(job) else {
            return Err(ClientError::NotFound(job.to_string()));
        };
        state.triggers.push(parameters.cloned());
        match &state.trigger_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn build(&self, job: &str, number: u64) -> ClientResult<BuildInfo> {
        let mut jobs = self.state();
        let Some(state) = jobs.get_mut(job) else {
            return Err(ClientError::NotFound(job.to_string()));
        };
        state.build_calls += 1;
        next_scripted(&mut state.builds, || {
            ClientError::NotFound(format!("{job}/{number}"))
        })
    }

    async fn organisation_scan_result(&self, job: &str) -> ClientResult<Option<String>> {
        let mut jobs = self.state();
        let Some(state) = jobs.get_mut(job) else {
            return Err(ClientError::NotFound(job.to_string()));
        };
        next_scripted(&mut state.scan_results, || {
            ClientError::NotFound(format!("{job}/computation"))
        })
    }
}

#[async_trait]
impl JobCatalog for FakeJenkins {
    async fn job(&self, path: &str) -> ClientResult<JobInfo> {
        self.state()
            .get(path)
            .and_then(|job| job.info.clone())
            .ok_or_else(|| ClientError::NotFound(path.to_string()))
    }

    async fn jobs(&self) -> ClientResult<Vec<JobInfo>> {
        Ok(self
            .state()
            .iter()
            .filter(|(path, _)| !path.contains('/'))
            .filter_map(|(_, job)| job.info.clone())
            .collect())
    }

    async fn create_job(&self, name: &str, config_xml: &str) -> ClientResult<()> {
        if config_xml.trim().is_empty() {
            return Err(ClientError::Http {
                status: 400,
                url: format!("http://jenkins.test/createItem?name={name}"),
                body: "empty job definition".to_string(),
            });
        }
        if self.has_job(name) {
            return Err(ClientError::Http {
                status: 400,
                url: format!("http://jenkins.test/createItem?name={name}"),
                body: format!("A job already exists with the name '{name}'"),
            });
        }
        self.add_job(name);
        Ok(())
    }

    async fn delete_job(&self, path: &str) -> ClientResult<()> {
        let mut jobs = self.state();
        match jobs.get_mut(path) {
            Some(job) if job.exists() => {
                job.info = None;
                Ok(())
            }
            _ => Err(ClientError::NotFound(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_queue_repeats_last_entry() {
        let fake = FakeJenkins::new().with_job("demo");
        fake.script_last_builds(
            "demo",
            [Ok(BuildInfo::finished(1, "SUCCESS")), Ok(BuildInfo::running(2))],
        );

        assert_eq!(fake.last_build("demo").await.unwrap().number, 1);
        assert_eq!(fake.last_build("demo").await.unwrap().number, 2);
        assert_eq!(fake.last_build("demo").await.unwrap().number, 2);
        assert_eq!(fake.last_build_calls("demo"), 3);
    }

    #[tokio::test]
    async fn test_job_without_builds_is_not_found() {
        let fake = FakeJenkins::new().with_job("demo");
        assert!(fake.last_build("demo").await.unwrap_err().is_not_found());
        assert!(fake.last_build("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_catalog_create_list_delete() {
        let fake = FakeJenkins::new().with_job("org/app/master");
        fake.create_job("import", "<project/>").await.unwrap();

        let names: Vec<String> = fake.jobs().await.unwrap().into_iter().map(|j| j.name).collect();
        assert_eq!(names, vec!["import".to_string()]);

        let job = fake.job("org/app/master").await.unwrap();
        assert_eq!(job.name, "master");
        assert_eq!(job.url, "http://jenkins.test/job/org/job/app/job/master/");

        fake.delete_job("import").await.unwrap();
        assert!(!fake.has_job("import"));
        assert!(fake.delete_job("import").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let fake = FakeJenkins::new().with_job("import");
        let err = fake.create_job("import", "<project/>").await.unwrap_err();
        assert!(matches!(err, ClientError::Http { status: 400, .. }));
    }
}
