//! Job expressions as written in scenarios.
//!
//! A job expression such as `$GITHUB_USER/demo/master` is first expanded
//! against the environment, then split into folder segments.

use std::fmt;

/// Errors produced when parsing a job path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobPathError {
    #[error("job path must not be empty")]
    Empty,
}

/// Replace `$NAME` and `${NAME}` with values from the process environment.
/// Unset variables expand to the empty string.
pub fn expand_env_vars(expr: &str) -> String {
    expand_with(expr, |name| std::env::var(name).ok())
}

/// Variable expansion with a caller-supplied lookup.
pub fn expand_with<F>(expr: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(expr.len());
    let mut rest = expr;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                out.push_str(&lookup(&braced[..end]).unwrap_or_default());
                rest = &braced[end + 1..];
                continue;
            }
        } else {
            let len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            if len > 0 {
                out.push_str(&lookup(&after[..len]).unwrap_or_default());
                rest = &after[len..];
                continue;
            }
        }

        out.push('$');
        rest = after;
    }

    out.push_str(rest);
    out
}

/// Slash-separated path of a job inside nested folders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobPath {
    segments: Vec<String>,
}

impl JobPath {
    /// Split `a/b/c` into segments; empty segments are ignored.
    pub fn parse(path: &str) -> Result<Self, JobPathError> {
        let segments: Vec<String> = path
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(JobPathError::Empty);
        }
        Ok(Self { segments })
    }

    /// Expand environment variables in `expr`, then parse it.
    pub fn from_expression(expr: &str) -> Result<Self, JobPathError> {
        Self::parse(&expand_env_vars(expr))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment (the job's own name).
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Jenkins URL form: `job/a/job/b/job/c`.
    pub fn url_path(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!("job/{s}"))
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for JobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}
