use crate::cache::ResultCache;
use crate::error::JobError;
use crate::model::{ConnectionState, DatasetId, Job, JobConfig, LocalPhase, Settings};
use crate::monitor::ConnectionMonitor;
use crate::orchestrator::{JobHandle, JobOrchestrator, LookupMode};
use crate::remote::HttpJobService;
use crate::session::{CallerIdentity, Session};
use crate::text_summary::{self, TextSummary};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "datagen-cli",
    version,
    about = "Submit synthetic data generation jobs and browse generated datasets"
)]
pub struct Cli {
    /// Base URL of the generation service
    #[arg(long, env = "DATAGEN_BASE_URL", default_value = "http://localhost:4943", global = true)]
    pub base_url: String,

    /// Caller identity token; without one only local validation is possible
    #[arg(long, env = "DATAGEN_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Delay between job status checks
    #[arg(long, default_value = "5s", value_parser = parse_interval, global = true)]
    pub poll_interval: humantime::Duration,

    /// Status checks before a job is failed with a timeout
    #[arg(
        long,
        default_value_t = crate::model::DEFAULT_MAX_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..),
        global = true
    )]
    pub max_attempts: u32,

    /// Delay between service reachability probes
    #[arg(long, default_value = "30s", value_parser = parse_interval, global = true)]
    pub probe_interval: humantime::Duration,

    /// Timeout for each HTTP request
    #[arg(long, default_value = "30s", value_parser = parse_interval, global = true)]
    pub request_timeout: humantime::Duration,

    /// How job status is looked up
    #[arg(long, value_enum, default_value_t = LookupMode::Auto, global = true)]
    pub lookup: LookupMode,

    /// Print JSON result and exit
    #[arg(long, global = true)]
    pub json: bool,

    /// Run silently: suppress all output except errors (for cron usage)
    #[arg(long, global = true)]
    pub silent: bool,

    /// Log at debug level unless DATAGEN_LOG says otherwise
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Submit a prompt and follow the job until it resolves (Ctrl-C cancels)
    Generate(GenerateArgs),
    /// List datasets, or show one by id
    Datasets {
        id: Option<u64>,
    },
    /// List pending jobs
    Jobs,
    /// Probe service reachability
    Status,
}

#[derive(Debug, Args, Clone)]
pub struct GenerateArgs {
    /// What to generate, at least 10 characters
    pub prompt: String,

    #[arg(long, default_value = "text")]
    pub data_type: String,

    #[arg(long, default_value_t = 100)]
    pub max_tokens: u32,

    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,

    #[arg(long, default_value = "gpt-3.5-turbo")]
    pub model: String,
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    let settings = build_settings(&args);
    let session = build_session(&args, &settings)?;
    let (out_tx, out_handle) = if args.silent {
        (None, None)
    } else {
        let (tx, handle) = spawn_output_writer();
        (Some(tx), Some(handle))
    };
    let out = Output {
        tx: out_tx,
        json: args.json,
    };

    let result = match &args.command {
        Command::Generate(gen) => run_generate(gen, &settings, &session, &out).await,
        Command::Datasets { id } => run_datasets(id.map(DatasetId), &settings, &session, &out).await,
        Command::Jobs => run_jobs(&settings, &session, &out).await,
        Command::Status => run_status(&settings, &session, &out).await,
    };

    drop(out);
    if let Some(handle) = out_handle {
        let _ = handle.await;
    }
    result
}

/// A humantime duration that must be greater than zero.
fn parse_interval(value: &str) -> Result<humantime::Duration, String> {
    let parsed: humantime::Duration = value
        .parse()
        .map_err(|e: humantime::DurationError| e.to_string())?;
    if Duration::from(parsed).is_zero() {
        return Err("must be greater than zero".to_string());
    }
    Ok(parsed)
}

/// Build resolved `Settings` from CLI arguments.
pub fn build_settings(args: &Cli) -> Settings {
    Settings {
        base_url: args.base_url.clone(),
        poll_interval: Duration::from(args.poll_interval),
        max_attempts: args.max_attempts,
        probe_interval: Duration::from(args.probe_interval),
        request_timeout: Duration::from(args.request_timeout),
        lookup: args.lookup,
        user_agent: format!("datagen-cli/{}", env!("CARGO_PKG_VERSION")),
    }
}

fn build_session(args: &Cli, settings: &Settings) -> Result<Session> {
    let Some(caller) = args.token.clone().and_then(CallerIdentity::new) else {
        debug!("no caller identity, running anonymously");
        return Ok(Session::anonymous());
    };
    let service = HttpJobService::new(settings, caller).context("failed to build service client")?;
    Ok(Session::connected(Arc::new(service)))
}

/// Where results and progress go. `tx` is `None` in silent mode.
struct Output {
    tx: Option<mpsc::UnboundedSender<OutputLine>>,
    json: bool,
}

impl Output {
    fn json(&self, value: &serde_json::Value) -> Result<()> {
        if let Some(tx) = self.tx.as_ref() {
            let _ = tx.send(OutputLine::Stdout(serde_json::to_string_pretty(value)?));
        }
        Ok(())
    }

    fn summary(&self, summary: TextSummary) {
        if let Some(tx) = self.tx.as_ref() {
            for line in summary.lines {
                let _ = tx.send(OutputLine::Stdout(line));
            }
        }
    }

    /// Progress is shown in text mode only.
    fn progress(&self) -> Option<mpsc::UnboundedSender<OutputLine>> {
        if self.json {
            None
        } else {
            self.tx.clone()
        }
    }
}

async fn run_generate(
    gen: &GenerateArgs,
    settings: &Settings,
    session: &Session,
    out: &Output,
) -> Result<()> {
    let cache = ResultCache::new(session);
    let monitor = ConnectionMonitor::with_cache(settings.probe_interval, cache.clone());
    let state = monitor.attach(session.service().ok()).await;
    debug!(%state, "initial connection state");

    let orchestrator = JobOrchestrator::new(
        session,
        settings.poll_policy(),
        settings.lookup,
        monitor.subscribe(),
        cache.clone(),
    );
    let config = JobConfig::generation(&gen.data_type, gen.max_tokens, gen.temperature, &gen.model);
    let handle = orchestrator
        .submit(&gen.prompt, config)
        .context("job was not submitted")?;

    let progress = out
        .progress()
        .map(|tx| spawn_progress(orchestrator.subscribe(), tx, settings.max_attempts));
    let job = follow(&orchestrator, handle).await;
    monitor.stop();
    if let Some(progress) = progress {
        progress.abort();
    }

    let job = job.context("no job was tracked")?;
    let dataset = job.dataset_id.and_then(|id| cache.dataset(id));
    if out.json {
        out.json(&serde_json::json!({
            "settings": settings,
            "job": &job,
            "dataset": &dataset,
        }))?;
    } else {
        out.summary(text_summary::build_job_summary(&job, dataset.as_ref()));
    }

    match job.phase {
        LocalPhase::Completed => Ok(()),
        LocalPhase::Cancelled => Err(anyhow::anyhow!("job cancelled")),
        _ => Err(anyhow::anyhow!(
            "job failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        )),
    }
}

/// Wait for the job to settle; Ctrl-C cancels it.
async fn follow(orchestrator: &JobOrchestrator, handle: JobHandle) -> Option<Job> {
    tokio::select! {
        job = orchestrator.settled() => job,
        _ = tokio::signal::ctrl_c() => {
            if let Err(err) = orchestrator.cancel(&handle) {
                debug!(error = %err, "job settled before cancellation");
            }
            orchestrator.current()
        }
    }
}

fn spawn_progress(
    mut rx: watch::Receiver<Option<Job>>,
    tx: mpsc::UnboundedSender<OutputLine>,
    max_attempts: u32,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last: Option<String> = None;
        loop {
            let line = rx
                .borrow_and_update()
                .as_ref()
                .filter(|job| job.phase.is_active())
                .map(|job| text_summary::progress_line(job, max_attempts));
            if line.is_some() && line != last {
                if let Some(text) = line.clone() {
                    let _ = tx.send(OutputLine::Stderr(text));
                }
                last = line;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

async fn run_datasets(
    id: Option<DatasetId>,
    settings: &Settings,
    session: &Session,
    out: &Output,
) -> Result<()> {
    if let Some(id) = id {
        let service = session.service()?;
        let dataset = service
            .get_dataset(id)
            .await
            .with_context(|| format!("failed to fetch dataset {id}"))?
            .ok_or(JobError::DatasetNotFound(id))?;
        if out.json {
            out.json(&serde_json::to_value(&dataset)?)?;
        } else {
            out.summary(text_summary::build_dataset_summary(&dataset));
        }
        return Ok(());
    }

    let cache = ResultCache::new(session);
    cache
        .refresh_datasets()
        .await
        .with_context(|| format!("failed to list datasets from {}", settings.base_url))?;
    let datasets = cache.datasets();
    if out.json {
        out.json(&serde_json::to_value(&datasets)?)?;
    } else {
        out.summary(text_summary::build_dataset_list(&datasets));
    }
    Ok(())
}

async fn run_jobs(settings: &Settings, session: &Session, out: &Output) -> Result<()> {
    let cache = ResultCache::new(session);
    cache
        .refresh_jobs()
        .await
        .with_context(|| format!("failed to list pending jobs from {}", settings.base_url))?;
    let jobs = cache.jobs();
    if out.json {
        out.json(&serde_json::to_value(&jobs)?)?;
    } else {
        out.summary(text_summary::build_job_list(&jobs));
    }
    Ok(())
}

async fn run_status(settings: &Settings, session: &Session, out: &Output) -> Result<()> {
    let monitor = ConnectionMonitor::new(settings.probe_interval);
    let state = monitor.attach(session.service().ok()).await;
    monitor.stop();
    let last_error = monitor.last_error();

    if out.json {
        out.json(&serde_json::json!({
            "base_url": settings.base_url,
            "state": state.to_string(),
            "consecutive_failures": monitor.consecutive_failures(),
            "last_error": last_error.as_ref().map(ToString::to_string),
        }))?;
    } else {
        out.summary(text_summary::build_connection_summary(
            state,
            &settings.base_url,
            last_error.as_ref(),
        ));
    }

    match state {
        ConnectionState::Failed => Err(anyhow::anyhow!("{} is unreachable", settings.base_url)),
        _ => Ok(()),
    }
}
