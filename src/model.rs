use crate::orchestrator::LookupMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

pub const MIN_PROMPT_CHARS: usize = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Resolved runtime settings, built from CLI flags and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub probe_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub lookup: LookupMode,
    pub user_agent: String,
}

impl Settings {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval,
            max_attempts: self.max_attempts,
        }
    }
}

/// Polling cadence and attempt budget for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub u64);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation parameters. Opaque to the orchestrator and forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobConfig(serde_json::Value);

impl JobConfig {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The blob the generator worker understands.
    pub fn generation(data_type: &str, max_tokens: u32, temperature: f32, model: &str) -> Self {
        Self(serde_json::json!({
            "data_type": data_type,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "model": model,
        }))
    }
}

/// Authoritative job status as reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RemoteStatus {
    /// Parse a status tag. Only the four known variants are accepted.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "pending" => Some(RemoteStatus::Pending),
            "running" => Some(RemoteStatus::Running),
            "completed" => Some(RemoteStatus::Completed),
            "failed" => Some(RemoteStatus::Failed),
            _ => None,
        }
    }
}

/// The orchestrator's own view of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalPhase {
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
    Cancelled,
}

impl LocalPhase {
    /// Holds the session's single active-job slot.
    pub fn is_active(self) -> bool {
        matches!(self, LocalPhase::Submitting | LocalPhase::Polling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LocalPhase::Completed | LocalPhase::Failed | LocalPhase::Cancelled
        )
    }
}

/// One generation request tracked through submission, polling, and resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Option<JobId>,
    pub prompt: String,
    pub config: JobConfig,
    pub status: RemoteStatus,
    pub phase: LocalPhase,
    pub dataset_id: Option<DatasetId>,
    pub error: Option<String>,
    /// Secondary, non-fatal outcome such as an unavailable result.
    pub notice: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub attempt: u32,
}

impl Job {
    pub(crate) fn submitting(prompt: String, config: JobConfig) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: None,
            prompt,
            config,
            status: RemoteStatus::Pending,
            phase: LocalPhase::Submitting,
            dataset_id: None,
            error: None,
            notice: None,
            created_at: now,
            updated_at: now,
            attempt: 0,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc().max(self.created_at);
    }
}

/// A job as the remote service describes it (query result or pending-list entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub id: JobId,
    #[serde(default)]
    pub prompt: Option<String>,
    pub status: RemoteStatus,
    #[serde(default)]
    pub dataset_id: Option<DatasetId>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// A generated artifact. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Plain text or structured payload.
    pub content: serde_json::Value,
    #[serde(alias = "fileHash")]
    pub file_hash: String,
}

/// Reachability of the remote service as last observed by the connection monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(label)
    }
}
