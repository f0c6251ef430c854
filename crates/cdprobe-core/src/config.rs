//! Timeouts used by the scenario steps, with environment overrides.

use std::time::Duration;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid duration {value:?} in ${var}: {reason}")]
    InvalidDuration {
        var: String,
        value: String,
        reason: String,
    },

    #[error("invalid number {value:?} in ${var}")]
    InvalidNumber { var: String, value: String },

    #[error("{0}")]
    Missing(String),

    #[error("{0}")]
    Invalid(String),
}

pub const BUILD_START_TIMEOUT_VAR: &str = "BDD_BUILD_START_TIMEOUT";
pub const JOB_CREATE_TIMEOUT_VAR: &str = "BDD_JOB_CREATE_TIMEOUT";
pub const BUILD_FINISH_TIMEOUT_VAR: &str = "BDD_BUILD_FINISH_TIMEOUT";
pub const IMPORT_TIMEOUT_VAR: &str = "BDD_IMPORT_TIMEOUT";
pub const RESULT_ATTEMPTS_VAR: &str = "BDD_RESULT_ATTEMPTS";

/// How long each kind of step waits before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTimeouts {
    /// Trigger until a new build number appears.
    pub build_start: Duration,

    /// A job path until it resolves on the server.
    pub job_create: Duration,

    /// A started build until it stops building.
    pub build_finish: Duration,

    /// An import job build, end to end.
    pub import: Duration,

    /// Attempts made while waiting for a last build to report a result.
    pub result_attempts: usize,

    /// Delay between those attempts.
    pub result_delay: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            build_start: Duration::from_secs(20),
            job_create: Duration::from_secs(50),
            build_finish: Duration::from_secs(40 * 60),
            import: Duration::from_secs(2 * 60),
            result_attempts: 200,
            result_delay: Duration::from_secs(5),
        }
    }
}

impl StepTimeouts {
    /// Defaults overridden by `BDD_*` environment variables (humantime syntax,
    /// e.g. `90s`, `5m`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut timeouts = Self::default();
        let duration = |var: &str, current: Duration| -> Result<Duration, ConfigError> {
            match lookup(var) {
                Some(value) if !value.trim().is_empty() => parse_duration(var, &value),
                _ => Ok(current),
            }
        };

        timeouts.build_start = duration(BUILD_START_TIMEOUT_VAR, timeouts.build_start)?;
        timeouts.job_create = duration(JOB_CREATE_TIMEOUT_VAR, timeouts.job_create)?;
        timeouts.build_finish = duration(BUILD_FINISH_TIMEOUT_VAR, timeouts.build_finish)?;
        timeouts.import = duration(IMPORT_TIMEOUT_VAR, timeouts.import)?;

        if let Some(value) = lookup(RESULT_ATTEMPTS_VAR).filter(|v| !v.trim().is_empty()) {
            timeouts.result_attempts =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber {
                        var: RESULT_ATTEMPTS_VAR.to_string(),
                        value: value.clone(),
                    })?;
        }

        Ok(timeouts)
    }
}

/// Parse a humantime duration, naming `var` in the error.
pub fn parse_duration(var: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
        var: var.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
