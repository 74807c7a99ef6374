//! Post-completion processing.
//!
//! Fetches the produced dataset, refreshes the cached lists, and reconciles the dataset
//! into the cache. Dataset retrieval is independent of job success: failures here become a
//! notice on an otherwise completed job.

use crate::cache::ResultCache;
use crate::error::JobError;
use crate::model::{Dataset, DatasetId};
use crate::remote::RemoteJobService;
use tracing::warn;

pub(crate) struct CompletionOutcome {
    pub dataset: Option<Dataset>,
    pub notice: Option<String>,
}

pub(crate) async fn process_completion(
    service: &dyn RemoteJobService,
    cache: &ResultCache,
    dataset_id: DatasetId,
) -> CompletionOutcome {
    let (dataset, notice) = match service.get_dataset(dataset_id).await {
        Ok(Some(dataset)) => (Some(dataset), None),
        Ok(None) => {
            let err = JobError::DatasetNotFound(dataset_id);
            (None, Some(format!("result unavailable: {err}")))
        }
        Err(err) => (None, Some(format!("result unavailable: {err}"))),
    };
    if let Some(notice) = notice.as_deref() {
        warn!(%dataset_id, notice, "completed job without a retrievable dataset");
    }

    if let Err(err) = cache.refresh_datasets().await {
        warn!(error = %err, "dataset refresh after completion failed");
    }
    if let Err(err) = cache.refresh_jobs().await {
        warn!(error = %err, "job refresh after completion failed");
    }
    // The list may lag behind the job; the fetched copy is authoritative.
    if let Some(dataset) = dataset.as_ref() {
        cache.reconcile_dataset(dataset.clone());
    }

    CompletionOutcome { dataset, notice }
}
