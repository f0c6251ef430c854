//! Jenkins REST client.
//!
//! Every job path `a/b/c` maps to `<base>/job/a/job/b/job/c/...`. A 404 from
//! any endpoint becomes [`ClientError::NotFound`]; other non-success statuses
//! keep their status code and body.

use async_trait::async_trait;
use cdprobe_core::{
    BuildClient, BuildInfo, BuildParameters, ClientError, ClientResult, JobCatalog, JobInfo,
    JobPath,
};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{JenkinsAuth, JenkinsConfig};

const JOB_LIST_TREE: &str = "jobs[name,url,fullName]";

#[derive(Debug, Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<JobInfo>,
}

/// Client for a single Jenkins server.
#[derive(Debug, Clone)]
pub struct JenkinsClient {
    config: JenkinsConfig,
    http_client: reqwest::Client,
}

impl JenkinsClient {
    /// Create a client for the configured server.
    pub fn new(config: JenkinsConfig) -> ClientResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(format!("cdprobe/{}", cdprobe_core::VERSION))
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(JenkinsClient {
            config,
            http_client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.config.url
    }

    /// `<base>/job/a/job/b` followed by `extra` segments.
    pub fn job_url(&self, path: &str, extra: &[&str]) -> ClientResult<Url> {
        let job = JobPath::parse(path)
            .map_err(|e| ClientError::InvalidRequest(format!("{e}: {path:?}")))?;

        let mut url = self.config.url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ClientError::InvalidRequest(format!("cannot extend base URL {}", self.config.url))
            })?;
            segments.pop_if_empty();
            for name in job.segments() {
                segments.push("job").push(name);
            }
            segments.extend(extra);
        }
        Ok(url)
    }

    /// `<base>/<segments>` for server-level endpoints.
    fn root_url(&self, extra: &[&str]) -> ClientResult<Url> {
        let mut url = self.config.url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ClientError::InvalidRequest(format!("cannot extend base URL {}", self.config.url))
            })?;
            segments.pop_if_empty();
            segments.extend(extra);
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth {
            JenkinsAuth::ApiToken { username, token } => request.basic_auth(username, Some(token)),
            JenkinsAuth::Bearer(token) => request.bearer_auth(token),
        }
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> ClientResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, url, body))
    }

    async fn get_text(&self, url: &Url) -> ClientResult<String> {
        debug!(%url, "GET");
        let response = self.send(self.http_client.get(url.clone()), url).await?;
        response
            .text()
            .await
            .map_err(|e| ClientError::Transport(format!("{url}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ClientResult<T> {
        let body = self.get_text(&url).await?;
        decode(&body, &url)
    }

    async fn post(&self, url: Url, body: Option<String>) -> ClientResult<()> {
        debug!(%url, "POST");
        let mut request = self.http_client.post(url.clone());
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(body);
        }
        self.send(request, &url).await?;
        Ok(())
    }
}

/// Map a non-success status to a client error.
fn status_error(status: StatusCode, url: &Url, body: String) -> ClientError {
    if status == StatusCode::NOT_FOUND {
        ClientError::NotFound(url.to_string())
    } else {
        ClientError::Http {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        }
    }
}

/// The `Finished: <RESULT>` trailer of a folder computation log.
fn scan_result(console: &str) -> Option<String> {
    console
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("Finished: "))
        .map(|result| result.trim().to_string())
}

fn decode<T: DeserializeOwned>(body: &str, url: &Url) -> ClientResult<T> {
    serde_json::from_str(body).map_err(|e| ClientError::Decode(format!("{url}: {e}")))
}

#[async_trait]
impl BuildClient for JenkinsClient {
    async fn last_build(&self, job: &str) -> ClientResult<BuildInfo> {
        let url = self.job_url(job, &["lastBuild", "api", "json"])?;
        self.get_json(url).await
    }

    async fn trigger_build(
        &self,
        job: &str,
        parameters: Option<&BuildParameters>,
    ) -> ClientResult<()> {
        let url = match parameters.filter(|p| !p.is_empty()) {
            Some(parameters) => {
                let mut url = self.job_url(job, &["buildWithParameters"])?;
                {
                    let mut query = url.query_pairs_mut();
                    for (key, value) in parameters {
                        query.append_pair(key, value);
                    }
                }
                url
            }
            None => self.job_url(job, &["build"])?,
        };
        info!(job, "Triggering build");
        self.post(url, None).await
    }

    async fn build(&self, job: &str, number: u64) -> ClientResult<BuildInfo> {
        let number = number.to_string();
        let url = self.job_url(job, &[number.as_str(), "api", "json"])?;
        self.get_json(url).await
    }

    async fn organisation_scan_result(&self, job: &str) -> ClientResult<Option<String>> {
        let url = self.job_url(job, &["computation", "consoleText"])?;
        let console = self.get_text(&url).await?;
        Ok(scan_result(&console))
    }
}

#[async_trait]
impl JobCatalog for JenkinsClient {
    async fn job(&self, path: &str) -> ClientResult<JobInfo> {
        let url = self.job_url(path, &["api", "json"])?;
        self.get_json(url).await
    }

    async fn jobs(&self) -> ClientResult<Vec<JobInfo>> {
        let mut url = self.root_url(&["api", "json"])?;
        url.query_pairs_mut().append_pair("tree", JOB_LIST_TREE);
        let list: JobList = self.get_json(url).await?;
        Ok(list.jobs)
    }

    async fn create_job(&self, name: &str, config_xml: &str) -> ClientResult<()> {
        let mut url = self.root_url(&["createItem"])?;
        url.query_pairs_mut().append_pair("name", name);
        info!(name, "Creating job");
        self.post(url, Some(config_xml.to_string())).await
    }

    async fn delete_job(&self, path: &str) -> ClientResult<()> {
        let url = self.job_url(path, &["doDelete"])?;
        info!(job = path, "Deleting job");
        self.post(url, None).await
    }
}
