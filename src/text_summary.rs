//! Text summary builder for CLI output.
//!
//! This module formats human-readable lines for jobs, datasets, and connection state.

use crate::error::JobError;
use crate::model::{ConnectionState, Dataset, Job, JobReport, LocalPhase, RemoteStatus};

const CONTENT_PREVIEW_CHARS: usize = 400;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Summary of a settled job and, when it was fetched, its dataset.
pub(crate) fn build_job_summary(job: &Job, dataset: Option<&Dataset>) -> TextSummary {
    let mut lines = Vec::new();
    let id = job.id.map_or_else(|| "-".to_string(), |id| id.to_string());
    lines.push(format!("Job {id}: {} ({})", phase_label(job.phase), status_label(job.status)));
    lines.push(format!("Prompt: {}", job.prompt));
    lines.push(format!("Attempts: {}", job.attempt));
    if let Some(error) = job.error.as_deref() {
        lines.push(format!("Error: {error}"));
    }
    if let Some(notice) = job.notice.as_deref() {
        lines.push(format!("Notice: {notice}"));
    }
    if let Some(dataset) = dataset {
        lines.push(String::new());
        lines.extend(build_dataset_summary(dataset).lines);
    } else if let Some(dataset_id) = job.dataset_id {
        lines.push(format!("Dataset: {dataset_id}"));
    }
    TextSummary { lines }
}

pub(crate) fn build_dataset_summary(dataset: &Dataset) -> TextSummary {
    let mut lines = vec![format!("Dataset {}: {}", dataset.id, dataset.title)];
    if !dataset.description.trim().is_empty() {
        lines.push(format!("Description: {}", dataset.description));
    }
    if !dataset.tags.is_empty() {
        lines.push(format!("Tags: {}", dataset.tags.join(", ")));
    }
    lines.push(format!("Hash: {}", dataset.file_hash));
    lines.push("Content:".to_string());
    lines.extend(content_preview(&dataset.content).lines().map(|l| format!("  {l}")));
    TextSummary { lines }
}

pub(crate) fn build_dataset_list(datasets: &[Dataset]) -> TextSummary {
    if datasets.is_empty() {
        return TextSummary {
            lines: vec!["No datasets.".to_string()],
        };
    }
    let lines = datasets
        .iter()
        .map(|d| {
            if d.tags.is_empty() {
                format!("{:>6}  {}", d.id, d.title)
            } else {
                format!("{:>6}  {} [{}]", d.id, d.title, d.tags.join(", "))
            }
        })
        .collect();
    TextSummary { lines }
}

pub(crate) fn build_job_list(jobs: &[JobReport]) -> TextSummary {
    if jobs.is_empty() {
        return TextSummary {
            lines: vec!["No pending jobs.".to_string()],
        };
    }
    let lines = jobs
        .iter()
        .map(|job| {
            let prompt = job.prompt.as_deref().unwrap_or("-");
            format!("{:>6}  {:<9}  {prompt}", job.id, status_label(job.status))
        })
        .collect();
    TextSummary { lines }
}

pub(crate) fn build_connection_summary(
    state: ConnectionState,
    base_url: &str,
    last_error: Option<&JobError>,
) -> TextSummary {
    let mut lines = vec![format!("{base_url}: {state}")];
    if let Some(err) = last_error {
        lines.push(format!("Last error: {err}"));
    }
    TextSummary { lines }
}

/// One-line progress report written to stderr while a job runs.
pub(crate) fn progress_line(job: &Job, max_attempts: u32) -> String {
    match job.phase {
        LocalPhase::Submitting => "Submitting job...".to_string(),
        LocalPhase::Polling => {
            let id = job.id.map_or_else(|| "-".to_string(), |id| id.to_string());
            format!(
                "Job {id}: {} (attempt {}/{max_attempts})",
                status_label(job.status),
                job.attempt
            )
        }
        phase => format!("Job {}", phase_label(phase)),
    }
}

fn phase_label(phase: LocalPhase) -> &'static str {
    match phase {
        LocalPhase::Idle => "idle",
        LocalPhase::Submitting => "submitting",
        LocalPhase::Polling => "polling",
        LocalPhase::Completed => "completed",
        LocalPhase::Failed => "failed",
        LocalPhase::Cancelled => "cancelled",
    }
}

fn status_label(status: RemoteStatus) -> &'static str {
    match status {
        RemoteStatus::Pending => "pending",
        RemoteStatus::Running => "running",
        RemoteStatus::Completed => "completed",
        RemoteStatus::Failed => "failed",
    }
}

fn content_preview(content: &serde_json::Value) -> String {
    let text = match content {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    if text.chars().count() <= CONTENT_PREVIEW_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(CONTENT_PREVIEW_CHARS).collect();
    cut.push_str("\n...");
    cut
}
