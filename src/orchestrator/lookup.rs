//! Job status lookup strategies.

use crate::error::JobError;
use crate::model::{JobId, JobReport};
use crate::remote::RemoteJobService;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LookupMode {
    /// Query directly when the service supports it, otherwise scan pending jobs
    Auto,
    /// Always query the job by id
    Query,
    /// Always scan the pending-jobs list
    Scan,
}

#[async_trait]
pub(crate) trait StatusLookup: Send + Sync {
    /// `Ok(None)` when the remote has no record of the job.
    async fn fetch_status(&self, id: JobId) -> Result<Option<JobReport>, JobError>;

    fn name(&self) -> &'static str;
}

pub(crate) struct DirectQuery {
    service: Arc<dyn RemoteJobService>,
}

#[async_trait]
impl StatusLookup for DirectQuery {
    async fn fetch_status(&self, id: JobId) -> Result<Option<JobReport>, JobError> {
        self.service.query(id).await
    }

    fn name(&self) -> &'static str {
        "query"
    }
}

pub(crate) struct PendingScan {
    service: Arc<dyn RemoteJobService>,
}

#[async_trait]
impl StatusLookup for PendingScan {
    async fn fetch_status(&self, id: JobId) -> Result<Option<JobReport>, JobError> {
        self.service.find_pending(id).await
    }

    fn name(&self) -> &'static str {
        "scan"
    }
}

pub(crate) fn select_lookup(
    mode: LookupMode,
    service: Arc<dyn RemoteJobService>,
) -> Arc<dyn StatusLookup> {
    let direct = match mode {
        LookupMode::Auto => service.supports_query(),
        LookupMode::Query => true,
        LookupMode::Scan => false,
    };
    if direct {
        Arc::new(DirectQuery { service })
    } else {
        Arc::new(PendingScan { service })
    }
}
