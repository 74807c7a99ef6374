//! JSON payloads exchanged with the generation service.

use crate::error::JobError;
use crate::model::{DatasetId, JobConfig, JobId, JobReport, RemoteStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct SubmitRequest<'a> {
    pub prompt: &'a str,
    pub config: &'a JobConfig,
}

/// The remote acknowledges a submission with either `{"id": n}` or a bare `n`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SubmitAck {
    Object {
        #[serde(alias = "jobId", alias = "job_id")]
        id: u64,
    },
    Bare(u64),
}

impl SubmitAck {
    pub fn job_id(&self) -> JobId {
        match self {
            SubmitAck::Object { id } | SubmitAck::Bare(id) => JobId(*id),
        }
    }
}

/// Optional dataset reference: a number, or an empty/one-element array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum DatasetRef {
    One(u64),
    Many(Vec<u64>),
}

impl DatasetRef {
    fn first(&self) -> Option<DatasetId> {
        match self {
            DatasetRef::One(id) => Some(DatasetId(*id)),
            DatasetRef::Many(ids) => ids.first().copied().map(DatasetId),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobPayload {
    pub id: u64,
    #[serde(default)]
    pub prompt: Option<String>,
    pub status: Value,
    #[serde(default, alias = "datasetId")]
    pub dataset_id: Option<DatasetRef>,
    #[serde(default, alias = "failureReason")]
    pub failure_reason: Option<String>,
}

impl TryFrom<JobPayload> for JobReport {
    type Error = JobError;

    fn try_from(payload: JobPayload) -> Result<Self, Self::Error> {
        let (status, detail) = parse_status(&payload.status)?;
        // The variant detail wins over the separate field.
        let failure_reason = match status {
            RemoteStatus::Failed => detail.or_else(|| {
                payload
                    .failure_reason
                    .map(|reason| reason.trim().to_string())
                    .filter(|reason| !reason.is_empty())
            }),
            _ => None,
        };
        Ok(JobReport {
            id: JobId(payload.id),
            prompt: payload.prompt,
            status,
            dataset_id: payload.dataset_id.as_ref().and_then(DatasetRef::first),
            failure_reason,
        })
    }
}

/// Decode one job entry from a list, where entries are checked one at a time.
pub(crate) fn decode_job(raw: Value) -> Result<JobReport, JobError> {
    let payload: JobPayload = serde_json::from_value(raw)
        .map_err(|e| JobError::Remote(format!("malformed job payload: {e}")))?;
    JobReport::try_from(payload)
}

pub(crate) fn payload_id(raw: &Value) -> Option<u64> {
    raw.get("id").and_then(Value::as_u64)
}

/// Decode a status tag: `"Running"` or a single-key variant such as `{"Failed": "reason"}`.
pub(crate) fn parse_status(value: &Value) -> Result<(RemoteStatus, Option<String>), JobError> {
    let (tag, detail) = match value {
        Value::String(tag) => (tag.as_str(), None),
        Value::Object(map) if map.len() == 1 => {
            // The length guard makes this infallible.
            let Some((tag, detail)) = map.iter().next() else {
                return Err(unrecognized(value));
            };
            (tag.as_str(), Some(detail))
        }
        _ => return Err(unrecognized(value)),
    };
    let status = RemoteStatus::from_tag(tag).ok_or_else(|| unrecognized(value))?;
    let reason = match (status, detail) {
        (RemoteStatus::Failed, Some(Value::String(reason))) if !reason.trim().is_empty() => {
            Some(reason.trim().to_string())
        }
        _ => None,
    };
    Ok((status, reason))
}

fn unrecognized(value: &Value) -> JobError {
    JobError::Remote(format!("unrecognized job status `{value}`"))
}
