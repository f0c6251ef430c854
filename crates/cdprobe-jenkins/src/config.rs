//! Jenkins connection settings read from `BDD_JENKINS_*` variables.

use std::fmt;

use cdprobe_core::ConfigError;
use reqwest::Url;

pub const URL_VAR: &str = "BDD_JENKINS_URL";
pub const USERNAME_VAR: &str = "BDD_JENKINS_USERNAME";
pub const TOKEN_VAR: &str = "BDD_JENKINS_TOKEN";
pub const BEARER_TOKEN_VAR: &str = "BDD_JENKINS_BEARER_TOKEN";

/// How requests authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum JenkinsAuth {
    /// Username plus API token, sent as HTTP basic auth.
    ApiToken { username: String, token: String },
    /// Sent as `Authorization: Bearer <token>`.
    Bearer(String),
}

impl fmt::Debug for JenkinsAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JenkinsAuth::ApiToken { username, .. } => f
                .debug_struct("ApiToken")
                .field("username", username)
                .field("token", &"***")
                .finish(),
            JenkinsAuth::Bearer(_) => f.debug_tuple("Bearer").field(&"***").finish(),
        }
    }
}

/// Where the Jenkins server lives and how to log in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JenkinsConfig {
    /// Base URL, always ending in `/`.
    pub url: Url,
    pub auth: JenkinsAuth,
}

impl JenkinsConfig {
    /// Create a config for `url` with the given authentication.
    pub fn new(url: &str, auth: JenkinsAuth) -> Result<Self, ConfigError> {
        let mut url = Url::parse(url)
            .map_err(|e| ConfigError::Invalid(format!("invalid Jenkins URL {url}: {e}")))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self { url, auth })
    }

    /// Read the config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the config through `lookup`. A bearer token wins over
    /// username + token when both are set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let url = get(URL_VAR)
            .ok_or_else(|| ConfigError::Missing(format!("no {URL_VAR} env var set")))?;

        let auth = match (get(BEARER_TOKEN_VAR), get(USERNAME_VAR), get(TOKEN_VAR)) {
            (Some(bearer), _, _) => JenkinsAuth::Bearer(bearer),
            (None, Some(username), Some(token)) => JenkinsAuth::ApiToken { username, token },
            _ => {
                return Err(ConfigError::Missing(format!(
                    "no {TOKEN_VAR} or {BEARER_TOKEN_VAR} && {USERNAME_VAR} env var set"
                )))
            }
        };

        Self::new(&url, auth)
    }
}
