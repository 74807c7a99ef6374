//! Last-fetched dataset and job lists.

use crate::error::JobError;
use crate::model::{Dataset, DatasetId, JobReport};
use crate::remote::RemoteJobService;
use crate::session::Session;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Each refresh replaces its whole list when it completes, so with overlapping refreshes
/// the one that finishes last wins. Refreshes are never cancelled by later ones.
#[derive(Clone)]
pub struct ResultCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    service: Option<Arc<dyn RemoteJobService>>,
    datasets: watch::Sender<Vec<Dataset>>,
    jobs: watch::Sender<Vec<JobReport>>,
}

impl ResultCache {
    pub fn new(session: &Session) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                service: session.service().ok(),
                datasets: watch::Sender::new(Vec::new()),
                jobs: watch::Sender::new(Vec::new()),
            }),
        }
    }

    fn service(&self) -> Result<&Arc<dyn RemoteJobService>, JobError> {
        self.inner
            .service
            .as_ref()
            .ok_or_else(|| JobError::NotReady("no authenticated session".into()))
    }

    /// Returns the number of datasets now cached.
    pub async fn refresh_datasets(&self) -> Result<usize, JobError> {
        let fetched = self.service()?.list_datasets().await?;
        let count = fetched.len();
        self.inner.datasets.send_replace(fetched);
        debug!(count, "datasets refreshed");
        Ok(count)
    }

    pub async fn refresh_jobs(&self) -> Result<usize, JobError> {
        let fetched = self.service()?.list_pending().await?;
        let count = fetched.len();
        self.inner.jobs.send_replace(fetched);
        debug!(count, "jobs refreshed");
        Ok(count)
    }

    /// Make a single fetched dataset visible without refetching the list.
    pub fn reconcile_dataset(&self, dataset: Dataset) {
        self.inner.datasets.send_modify(|datasets| {
            match datasets.iter_mut().find(|d| d.id == dataset.id) {
                Some(existing) => *existing = dataset,
                None => datasets.push(dataset),
            }
        });
    }

    pub fn datasets(&self) -> Vec<Dataset> {
        self.inner.datasets.borrow().clone()
    }

    pub fn jobs(&self) -> Vec<JobReport> {
        self.inner.jobs.borrow().clone()
    }

    pub fn dataset(&self, id: DatasetId) -> Option<Dataset> {
        self.inner.datasets.borrow().iter().find(|d| d.id == id).cloned()
    }

    pub fn subscribe_datasets(&self) -> watch::Receiver<Vec<Dataset>> {
        self.inner.datasets.subscribe()
    }

    pub fn subscribe_jobs(&self) -> watch::Receiver<Vec<JobReport>> {
        self.inner.jobs.subscribe()
    }
}
