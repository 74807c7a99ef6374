//! Error taxonomy shared by the orchestrator, the connection monitor, and the remote client.

use crate::model::DatasetId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Bad input; never reaches the network.
    #[error("invalid prompt: {0}")]
    Validation(String),

    /// No session or no live connection to the remote service.
    #[error("not ready: {0}")]
    NotReady(String),

    /// A job is already submitting or polling in this session.
    #[error("a job is already active")]
    Conflict,

    /// The remote service answered with a failure. Carries the remote's own reason.
    #[error("{0}")]
    Remote(String),

    /// The job is unknown to the remote service.
    #[error("not found")]
    NotFound,

    #[error("dataset {0} not found")]
    DatasetNotFound(DatasetId),

    /// Attempt budget exhausted.
    #[error("timeout")]
    Timeout,

    /// Network failure before the remote could answer.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote service does not support `{0}`")]
    Unsupported(&'static str),

    #[error("no active job matches this handle")]
    NotCancellable,
}

impl From<reqwest::Error> for JobError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            JobError::Remote(format!("malformed response: {err}"))
        } else {
            JobError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_reasons_are_distinguishable() {
        assert_eq!(JobError::Timeout.to_string(), "timeout");
        assert_eq!(JobError::NotFound.to_string(), "not found");
        assert_eq!(
            JobError::Remote("model crashed".into()).to_string(),
            "model crashed"
        );
        assert_eq!(
            JobError::DatasetNotFound(DatasetId(42)).to_string(),
            "dataset 42 not found"
        );
    }
}
