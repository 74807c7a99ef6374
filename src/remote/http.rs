use super::wire::{decode_job, payload_id, JobPayload, SubmitAck, SubmitRequest};
use super::RemoteJobService;
use crate::error::JobError;
use crate::model::{Dataset, DatasetId, JobConfig, JobId, JobReport, Settings};
use crate::session::CallerIdentity;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// JSON-over-HTTP client for the generation service.
pub struct HttpJobService {
    http: reqwest::Client,
    base_url: Url,
    caller: CallerIdentity,
}

impl HttpJobService {
    pub fn new(settings: &Settings, caller: CallerIdentity) -> Result<Self, JobError> {
        let base_url = Url::parse(&settings.base_url).map_err(|e| {
            JobError::NotReady(format!("invalid base url `{}`: {e}", settings.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(JobError::NotReady(format!(
                "base url `{}` cannot carry a path",
                settings.base_url
            )));
        }
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            caller,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET a JSON body; 404 maps to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, JobError> {
        debug!(%url, "GET");
        let resp = self
            .http
            .get(url)
            .bearer_auth(self.caller.expose())
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(remote_error(resp).await);
        }
        Ok(Some(resp.json::<T>().await?))
    }

    /// Raw pending entries, so one bad entry cannot spoil the rest.
    async fn pending_entries(&self) -> Result<Vec<Value>, JobError> {
        let mut url = self.endpoint(&["jobs"]);
        url.query_pairs_mut().append_pair("status", "pending");
        self.get_list(url).await
    }

    async fn get_list<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, JobError> {
        let what = url.path().to_string();
        self.get_optional(url)
            .await?
            .ok_or_else(|| JobError::Remote(format!("endpoint {what} is missing")))
    }
}

async fn remote_error(resp: reqwest::Response) -> JobError {
    let status = resp.status().as_u16();
    let message = resp
        .text()
        .await
        .unwrap_or_else(|_| "failed to read response text".to_string());
    let message = message.trim();
    if message.is_empty() {
        JobError::Remote(format!("HTTP {status}"))
    } else {
        JobError::Remote(format!("HTTP {status}: {message}"))
    }
}

#[async_trait]
impl RemoteJobService for HttpJobService {
    async fn submit(&self, prompt: &str, config: &JobConfig) -> Result<JobId, JobError> {
        let url = self.endpoint(&["jobs"]);
        debug!(%url, "POST");
        let resp = self
            .http
            .post(url)
            .bearer_auth(self.caller.expose())
            .json(&SubmitRequest { prompt, config })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(remote_error(resp).await);
        }
        let ack: SubmitAck = resp.json().await?;
        Ok(ack.job_id())
    }

    async fn query(&self, id: JobId) -> Result<Option<JobReport>, JobError> {
        let url = self.endpoint(&["jobs", &id.to_string()]);
        match self.get_optional::<JobPayload>(url).await? {
            Some(payload) => Ok(Some(JobReport::try_from(payload)?)),
            None => Ok(None),
        }
    }

    async fn list_pending(&self) -> Result<Vec<JobReport>, JobError> {
        let entries = self.pending_entries().await?;
        let reports = entries
            .into_iter()
            .filter_map(|raw| {
                let id = payload_id(&raw);
                match decode_job(raw) {
                    Ok(report) => Some(report),
                    Err(err) => {
                        warn!(id = ?id, error = %err, "skipping undecodable pending job");
                        None
                    }
                }
            })
            .collect();
        Ok(reports)
    }

    async fn find_pending(&self, id: JobId) -> Result<Option<JobReport>, JobError> {
        let entries = self.pending_entries().await?;
        match entries.into_iter().find(|raw| payload_id(raw) == Some(id.0)) {
            Some(raw) => decode_job(raw).map(Some),
            None => Ok(None),
        }
    }

    async fn get_dataset(&self, id: DatasetId) -> Result<Option<Dataset>, JobError> {
        let url = self.endpoint(&["datasets", &id.to_string()]);
        self.get_optional(url).await
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>, JobError> {
        let url = self.endpoint(&["datasets"]);
        self.get_list(url).await
    }
}
