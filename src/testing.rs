//! Scripted in-memory service for unit tests.

use crate::error::JobError;
use crate::model::{Dataset, DatasetId, JobConfig, JobId, JobReport, RemoteStatus};
use crate::remote::RemoteJobService;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Scripted = Result<Option<JobReport>, JobError>;

/// Status lookups (direct or scan) pop from one shared script. An empty script answers
/// `Running` for the job being asked about.
#[derive(Default)]
pub(crate) struct ScriptedService {
    next_id: AtomicU64,
    has_query: bool,
    query_delay: Duration,
    submit_delay: Duration,
    listing_delay: Duration,
    submit_failure: Mutex<Option<JobError>>,
    statuses: Mutex<VecDeque<Scripted>>,
    listings: Mutex<VecDeque<(Duration, Vec<Dataset>)>>,
    datasets: Mutex<Vec<Dataset>>,
    dataset_lookup: Mutex<Vec<Dataset>>,
    pending: Mutex<Vec<JobReport>>,
    last_submitted: Mutex<Option<JobId>>,
    last_prompt: Mutex<Option<String>>,
    listing_fails: AtomicBool,
    pending_fails: AtomicBool,
    dataset_fetch_fails: AtomicBool,
    submit_count: AtomicUsize,
    query_count: AtomicUsize,
    scan_count: AtomicUsize,
    fetch_count: AtomicUsize,
    listing_count: AtomicUsize,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            has_query: true,
            ..Default::default()
        }
    }

    pub fn with_first_job_id(self, id: u64) -> Self {
        self.next_id.store(id, Ordering::SeqCst);
        self
    }

    pub fn without_query(mut self) -> Self {
        self.has_query = false;
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }

    pub fn script_status(&self, report: JobReport) {
        self.statuses.lock().unwrap().push_back(Ok(Some(report)));
    }

    pub fn script_missing(&self) {
        self.statuses.lock().unwrap().push_back(Ok(None));
    }

    pub fn script_error(&self, err: JobError) {
        self.statuses.lock().unwrap().push_back(Err(err));
    }

    pub fn fail_submit(&self, err: JobError) {
        *self.submit_failure.lock().unwrap() = Some(err);
    }

    /// One `list_datasets` answer, returned after `delay`. Queued answers are used in order
    /// before falling back to `set_datasets`.
    pub fn script_listing(&self, delay: Duration, datasets: Vec<Dataset>) {
        self.listings.lock().unwrap().push_back((delay, datasets));
    }

    pub fn set_datasets(&self, datasets: Vec<Dataset>) {
        *self.datasets.lock().unwrap() = datasets;
    }

    /// Datasets visible to `get_dataset` but absent from `list_datasets`.
    pub fn set_dataset_lookup(&self, datasets: Vec<Dataset>) {
        *self.dataset_lookup.lock().unwrap() = datasets;
    }

    pub fn set_pending(&self, jobs: Vec<JobReport>) {
        *self.pending.lock().unwrap() = jobs;
    }

    pub fn fail_listing(&self, fail: bool) {
        self.listing_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_pending(&self, fail: bool) {
        self.pending_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_dataset_fetch(&self, fail: bool) {
        self.dataset_fetch_fails.store(fail, Ordering::SeqCst);
    }

    pub fn submits(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    pub fn pending_scans(&self) -> usize {
        self.scan_count.load(Ordering::SeqCst)
    }

    pub fn dataset_fetches(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn listings(&self) -> usize {
        self.listing_count.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }

    pub fn report(id: u64, status: RemoteStatus) -> JobReport {
        JobReport {
            id: JobId(id),
            prompt: None,
            status,
            dataset_id: None,
            failure_reason: None,
        }
    }

    pub fn completed(id: u64, dataset: u64) -> JobReport {
        JobReport {
            dataset_id: Some(DatasetId(dataset)),
            ..Self::report(id, RemoteStatus::Completed)
        }
    }

    pub fn failed(id: u64, reason: Option<&str>) -> JobReport {
        JobReport {
            failure_reason: reason.map(str::to_string),
            ..Self::report(id, RemoteStatus::Failed)
        }
    }

    pub fn dataset(id: u64) -> Dataset {
        Dataset {
            id: DatasetId(id),
            title: format!("dataset {id}"),
            description: "generated".into(),
            tags: vec!["synthetic".into()],
            content: serde_json::json!(["row 1", "row 2"]),
            file_hash: format!("hash-{id}"),
        }
    }

    fn next_status(&self) -> Option<Scripted> {
        self.statuses.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl RemoteJobService for ScriptedService {
    async fn submit(&self, prompt: &str, _config: &JobConfig) -> Result<JobId, JobError> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        if let Some(err) = self.submit_failure.lock().unwrap().clone() {
            return Err(err);
        }
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        *self.last_submitted.lock().unwrap() = Some(id);
        Ok(id)
    }

    fn supports_query(&self) -> bool {
        self.has_query
    }

    async fn query(&self, id: JobId) -> Result<Option<JobReport>, JobError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
        match self.next_status() {
            Some(scripted) => scripted,
            None => Ok(Some(Self::report(id.0, RemoteStatus::Running))),
        }
    }

    async fn list_pending(&self) -> Result<Vec<JobReport>, JobError> {
        self.scan_count.fetch_add(1, Ordering::SeqCst);
        if self.pending_fails.load(Ordering::SeqCst) {
            return Err(JobError::Transport("pending list unavailable".into()));
        }
        let mut jobs = self.pending.lock().unwrap().clone();
        match self.next_status() {
            Some(Ok(Some(report))) => jobs.push(report),
            Some(Ok(None)) => {}
            Some(Err(err)) => return Err(err),
            None => {
                let last = *self.last_submitted.lock().unwrap();
                if let Some(id) = last {
                    jobs.push(Self::report(id.0, RemoteStatus::Running));
                }
            }
        }
        Ok(jobs)
    }

    async fn get_dataset(&self, id: DatasetId) -> Result<Option<Dataset>, JobError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if self.dataset_fetch_fails.load(Ordering::SeqCst) {
            return Err(JobError::Transport("dataset store unavailable".into()));
        }
        let find = |list: &Mutex<Vec<Dataset>>| {
            list.lock().unwrap().iter().find(|d| d.id == id).cloned()
        };
        Ok(find(&self.dataset_lookup).or_else(|| find(&self.datasets)))
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>, JobError> {
        self.listing_count.fetch_add(1, Ordering::SeqCst);
        if !self.listing_delay.is_zero() {
            tokio::time::sleep(self.listing_delay).await;
        }
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(JobError::Transport("connection refused".into()));
        }
        let scripted = self.listings.lock().unwrap().pop_front();
        match scripted {
            Some((delay, datasets)) => {
                tokio::time::sleep(delay).await;
                Ok(datasets)
            }
            None => Ok(self.datasets.lock().unwrap().clone()),
        }
    }
}
