//! Remote job service boundary.
//!
//! The orchestrator, monitor, and cache are written against [`RemoteJobService`] only;
//! `http` provides the production implementation.

mod http;
mod wire;

pub use http::HttpJobService;

use crate::error::JobError;
use crate::model::{Dataset, DatasetId, JobConfig, JobId, JobReport};
use async_trait::async_trait;

#[async_trait]
pub trait RemoteJobService: Send + Sync {
    async fn submit(&self, prompt: &str, config: &JobConfig) -> Result<JobId, JobError>;

    /// Whether `query` is available. When it is not, callers scan `list_pending` instead.
    fn supports_query(&self) -> bool {
        true
    }

    /// Direct status lookup. `Ok(None)` means the remote does not know the job.
    async fn query(&self, id: JobId) -> Result<Option<JobReport>, JobError> {
        let _ = id;
        Err(JobError::Unsupported("query"))
    }

    /// Pending jobs the remote reports. Entries it cannot decode are left out.
    async fn list_pending(&self) -> Result<Vec<JobReport>, JobError>;

    /// One job from the pending list. Only an undecodable entry for `id` itself is an error.
    async fn find_pending(&self, id: JobId) -> Result<Option<JobReport>, JobError> {
        let jobs = self.list_pending().await?;
        Ok(jobs.into_iter().find(|job| job.id == id))
    }

    async fn get_dataset(&self, id: DatasetId) -> Result<Option<Dataset>, JobError>;

    /// Cheap and idempotent; doubles as the reachability probe.
    async fn list_datasets(&self) -> Result<Vec<Dataset>, JobError>;
}
