//! cdprobe - behavioural checks against a live Jenkins server
//!
//! ## Commands
//!
//! - `trigger`: trigger one or more jobs and wait for their builds to finish
//! - `wait`: wait for a known build number to finish
//! - `job-exists` / `no-job` / `delete-job` / `count-jobs` / `create-job`:
//!   job catalog checks
//! - `wait-for-job` / `completes`: wait for a job to appear and succeed
//! - `last-build-succeeds`: retry until the last build reports a result
//! - `import`: trigger an import job and wait for it
//! - `multibranch` / `org-scan`: organisation folder checks

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cdprobe_core::{
    wait_for_finish, BuildClient, BuildOutcome, BuildParameters, JenkinsSteps, JobCatalog,
    StepResult, StepTimeouts,
};
use cdprobe_jenkins::{JenkinsClient, JenkinsConfig};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "cdprobe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trigger Jenkins jobs and check what their builds do", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON reports
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    timeouts: TimeoutArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the step timeouts. Unset flags fall back to
/// `StepTimeouts::from_env`.
#[derive(clap::Args, Debug, Default)]
struct TimeoutArgs {
    /// How long to wait for a triggered build to start
    #[arg(long, global = true, env = "BDD_BUILD_START_TIMEOUT", value_parser = humantime::parse_duration)]
    start_timeout: Option<Duration>,

    /// How long to wait for a started build to finish
    #[arg(long, global = true, env = "BDD_BUILD_FINISH_TIMEOUT", value_parser = humantime::parse_duration)]
    finish_timeout: Option<Duration>,

    /// How long to wait for a job to be created
    #[arg(long, global = true, env = "BDD_JOB_CREATE_TIMEOUT", value_parser = humantime::parse_duration)]
    job_timeout: Option<Duration>,

    /// How long to wait for an import build
    #[arg(long, global = true, env = "BDD_IMPORT_TIMEOUT", value_parser = humantime::parse_duration)]
    import_timeout: Option<Duration>,
}

impl TimeoutArgs {
    fn apply(&self, mut timeouts: StepTimeouts) -> StepTimeouts {
        if let Some(t) = self.start_timeout {
            timeouts.build_start = t;
        }
        if let Some(t) = self.finish_timeout {
            timeouts.build_finish = t;
        }
        if let Some(t) = self.job_timeout {
            timeouts.job_create = t;
        }
        if let Some(t) = self.import_timeout {
            timeouts.import = t;
        }
        timeouts
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger jobs and wait for each build to finish
    Trigger {
        /// Job paths (`folder/job`); `$VAR` is expanded
        #[arg(required = true)]
        jobs: Vec<String>,

        /// Build parameter, repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Return once the build is requested
        #[arg(long)]
        no_wait: bool,
    },

    /// Wait for a build that is already running
    Wait {
        job: String,
        build: u64,
    },

    /// Check that a job exists
    JobExists { job: String },

    /// Check that a job does not exist
    NoJob { job: String },

    /// Delete an existing job
    DeleteJob { job: String },

    /// Check the number of top-level jobs
    CountJobs { expected: usize },

    /// Create a job from an XML definition unless it already exists
    CreateJob { name: String, xml: PathBuf },

    /// Wait until a job path resolves
    WaitForJob { job: String },

    /// Wait for a job and check that its build succeeds
    Completes { job: String },

    /// Retry until the last build has a result, then require SUCCESS
    LastBuildSucceeds { job: String },

    /// Trigger an import job and wait for it to succeed
    Import {
        job: String,

        #[arg(long)]
        repository: String,

        #[arg(long, default_value = "")]
        pipeline: String,
    },

    /// Trigger the master job of a multibranch project in an organisation
    /// folder and check that it succeeds
    Multibranch {
        /// Organisation folder job
        organisation: String,

        /// Multibranch project inside the folder
        name: String,

        /// Return once the build is requested
        #[arg(long)]
        no_wait: bool,
    },

    /// Wait for an organisation scan and require SUCCESS
    OrgScan { job: String },
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct Report {
    job: String,
    build_number: Option<u64>,
    outcome: BuildOutcome,
}

impl Report {
    fn new(job: &str, result: StepResult<Option<u64>>) -> Self {
        match result {
            Ok(build_number) => Report {
                job: job.to_string(),
                build_number,
                outcome: BuildOutcome::Succeeded,
            },
            Err(err) => Report {
                job: job.to_string(),
                build_number: err.build_number(),
                outcome: err.outcome(),
            },
        }
    }

    fn is_failure(&self) -> bool {
        matches!(
            self.outcome,
            BuildOutcome::Failed(_) | BuildOutcome::TimedOut(_) | BuildOutcome::ClientError(_)
        )
    }
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    cdprobe_core::init_tracing(cli.json, level);

    let timeouts = cli
        .timeouts
        .apply(StepTimeouts::from_env().context("Invalid step timeout")?);
    let config = JenkinsConfig::from_env().context("Failed to read Jenkins settings")?;
    info!(url = %config.url, "using Jenkins server");
    let client = Arc::new(JenkinsClient::new(config).context("Failed to create Jenkins client")?);

    let reports = run(client, timeouts, cli.command).await;
    print_reports(&reports, cli.json)?;

    let failed = reports.iter().filter(|r| r.is_failure()).count();
    if failed > 0 {
        bail!("{failed} of {} checks failed", reports.len());
    }
    Ok(())
}

async fn run<C>(client: Arc<C>, timeouts: StepTimeouts, command: Commands) -> Vec<Report>
where
    C: BuildClient + JobCatalog,
{
    let mut steps = JenkinsSteps::new(client.clone(), timeouts.clone());

    match command {
        Commands::Trigger {
            jobs,
            no_wait: true,
            ..
        } => {
            let mut reports = Vec::with_capacity(jobs.len());
            for job in &jobs {
                let result = steps.trigger_job_no_wait(job).await.map(|_| None);
                reports.push(Report::new(job, result));
            }
            reports
        }
        Commands::Trigger { jobs, params, .. } => {
            let params: BuildParameters = params.into_iter().collect();
            cmd_trigger(client, timeouts, &jobs, &params).await
        }
        Commands::Wait { job, build } => {
            vec![cmd_wait(client.as_ref(), &timeouts, &job, build).await]
        }
        Commands::JobExists { job } => {
            let result = steps.there_is_a_job(&job).await.map(|_| None);
            vec![Report::new(&job, result)]
        }
        Commands::NoJob { job } => {
            let result = steps.there_should_not_be_a_job(&job).await.map(|_| None);
            vec![Report::new(&job, result)]
        }
        Commands::DeleteJob { job } => {
            let result = steps.delete_job(&job).await.map(|_| None);
            vec![Report::new(&job, result)]
        }
        Commands::CountJobs { expected } => {
            let result = steps.there_are_jobs(expected).await.map(|_| None);
            vec![Report::new("*", result)]
        }
        Commands::CreateJob { name, xml } => {
            let result = steps.ensure_job_from_xml(&name, &xml).await.map(|_| None);
            vec![Report::new(&name, result)]
        }
        Commands::WaitForJob { job } => {
            let result = steps
                .wait_for_job(&job, timeouts.job_create)
                .await
                .map(|_| None);
            vec![Report::new(&job, result)]
        }
        Commands::Completes { job } => {
            let result = steps
                .job_completes_successfully(&job)
                .await
                .map(|b| Some(b.number));
            vec![Report::new(&job, result)]
        }
        Commands::LastBuildSucceeds { job } => {
            let result = steps.last_build_succeeds(&job).await.map(|b| Some(b.number));
            vec![Report::new(&job, result)]
        }
        Commands::Import {
            job,
            repository,
            pipeline,
        } => vec![cmd_import(&mut steps, &job, &repository, &pipeline).await],
        Commands::Multibranch {
            organisation,
            name,
            no_wait,
        } => vec![cmd_multibranch(&mut steps, &organisation, &name, no_wait).await],
        Commands::OrgScan { job } => {
            let result = steps.organisation_scan_succeeds(&job).await.map(|_| None);
            vec![Report::new(&job, result)]
        }
    }
}

/// Trigger every job concurrently; each gets its own scenario state.
async fn cmd_trigger<C>(
    client: Arc<C>,
    timeouts: StepTimeouts,
    jobs: &[String],
    params: &BuildParameters,
) -> Vec<Report>
where
    C: BuildClient + JobCatalog,
{
    let params = (!params.is_empty()).then_some(params);

    join_all(jobs.iter().map(|job| {
        let mut steps = JenkinsSteps::new(client.clone(), timeouts.clone());
        async move {
            let result = steps
                .trigger_job_with_parameters(job, params)
                .await
                .and_then(|build| {
                    cdprobe_core::assert_build_succeeded(&build, job)?;
                    Ok(Some(build.number))
                });
            Report::new(job, result)
        }
    }))
    .await
}

async fn cmd_wait(
    client: &dyn BuildClient,
    timeouts: &StepTimeouts,
    job: &str,
    build_number: u64,
) -> Report {
    let result = wait_for_finish(client, job, build_number, timeouts.build_finish).await;
    Report {
        job: job.to_string(),
        build_number: Some(build_number),
        outcome: BuildOutcome::from_wait(&result),
    }
}

async fn cmd_import<C>(
    steps: &mut JenkinsSteps<C>,
    job: &str,
    repository: &str,
    pipeline: &str,
) -> Report
where
    C: BuildClient + JobCatalog,
{
    let result = match steps.trigger_import(job, repository, pipeline).await {
        Ok(()) => steps
            .import_completes_successfully(job)
            .await
            .map(|b| Some(b.number)),
        Err(err) => Err(err),
    };
    Report::new(job, result)
}

async fn cmd_multibranch<C>(
    steps: &mut JenkinsSteps<C>,
    organisation: &str,
    name: &str,
    no_wait: bool,
) -> Report
where
    C: BuildClient + JobCatalog,
{
    let label = format!("{organisation}/{name}");
    if let Err(err) = steps.organisation_job_contains_a_job(organisation, name).await {
        return Report::new(&label, Err(err));
    }
    let result = match steps.trigger_multibranch_job(name).await {
        Ok(()) if no_wait => Ok(None),
        Ok(()) => steps
            .multibranch_job_succeeds(name)
            .await
            .map(|b| Some(b.number)),
        Err(err) => Err(err),
    };
    Report::new(&label, result)
}

fn print_reports(reports: &[Report], json: bool) -> Result<()> {
    for report in reports {
        if json {
            println!("{}", serde_json::to_string(report)?);
        } else {
            match report.build_number {
                Some(n) => println!("{} #{}: {}", report.job, n, report.outcome),
                None => println!("{}: {}", report.job, report.outcome),
            }
        }
    }
    Ok(())
}
