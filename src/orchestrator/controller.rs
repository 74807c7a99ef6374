//! Job lifecycle controller.
//!
//! Drives one job at a time through submit, poll, and resolve, and publishes every change
//! as a job snapshot for presentation layers.

use super::lookup::{select_lookup, LookupMode, StatusLookup};
use super::post_process::process_completion;
use super::schedule::{ScheduledTask, TickOutcome};
use crate::cache::ResultCache;
use crate::error::JobError;
use crate::model::{
    ConnectionState, DatasetId, Job, JobConfig, JobId, JobReport, LocalPhase, PollPolicy,
    RemoteStatus, MIN_PROMPT_CHARS,
};
use crate::remote::RemoteJobService;
use crate::session::Session;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const FALLBACK_FAILURE_REASON: &str = "job processing failed";

/// Identifies one submission for `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    epoch: u64,
}

/// Mutable state scoped to this session. Holds the single active-job slot.
#[derive(Default)]
struct SessionState {
    job: Option<Job>,
    /// Bumped on every submit; results carrying an older epoch are discarded.
    epoch: u64,
    in_flight: bool,
    schedule: Option<ScheduledTask>,
}

impl SessionState {
    fn active_job(&self) -> Option<&Job> {
        self.job.as_ref().filter(|job| job.phase.is_active())
    }

    fn current(&mut self, epoch: u64, phase: LocalPhase) -> Option<&mut Job> {
        if self.epoch != epoch {
            return None;
        }
        self.job.as_mut().filter(|job| job.phase == phase)
    }
}

struct Inner {
    service: Option<Arc<dyn RemoteJobService>>,
    lookup: Option<Arc<dyn StatusLookup>>,
    policy: PollPolicy,
    connection: watch::Receiver<ConnectionState>,
    cache: ResultCache,
    state: Mutex<SessionState>,
    job_tx: watch::Sender<Option<Job>>,
}

/// Terminal or non-terminal result of one status lookup.
enum Resolution {
    StillRunning(RemoteStatus),
    Completed {
        dataset_id: DatasetId,
    },
    Failed {
        status: Option<RemoteStatus>,
        reason: String,
    },
}

#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    pub fn new(
        session: &Session,
        policy: PollPolicy,
        lookup: LookupMode,
        connection: watch::Receiver<ConnectionState>,
        cache: ResultCache,
    ) -> Self {
        let service = session.service().ok();
        let lookup = service
            .as_ref()
            .map(|service| select_lookup(lookup, Arc::clone(service)));
        Self {
            inner: Arc::new(Inner {
                service,
                lookup,
                policy,
                connection,
                cache,
                state: Mutex::new(SessionState::default()),
                job_tx: watch::Sender::new(None),
            }),
        }
    }

    /// Start a job. Rejections happen before any state changes; remote failures after this
    /// returns are recorded on the job itself.
    pub fn submit(&self, prompt: &str, config: JobConfig) -> Result<JobHandle, JobError> {
        let prompt = validate_prompt(prompt)?;
        let (service, lookup) = match (&self.inner.service, &self.inner.lookup) {
            (Some(service), Some(lookup)) => (Arc::clone(service), Arc::clone(lookup)),
            _ => return Err(JobError::NotReady("no authenticated session".into())),
        };
        if *self.inner.connection.borrow() == ConnectionState::Failed {
            return Err(JobError::NotReady("remote service is unreachable".into()));
        }

        let epoch = {
            let mut st = self.inner.lock();
            if st.active_job().is_some() {
                return Err(JobError::Conflict);
            }
            st.epoch += 1;
            st.in_flight = false;
            st.schedule = None;
            st.job = Some(Job::submitting(prompt.clone(), config.clone()));
            self.inner.publish(&st);
            st.epoch
        };
        info!(epoch, lookup = lookup.name(), "submitting generation job");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = service.submit(&prompt, &config).await;
            Inner::acknowledge(&inner, epoch, result);
        });

        Ok(JobHandle { epoch })
    }

    pub fn cancel(&self, handle: &JobHandle) -> Result<(), JobError> {
        let mut st = self.inner.lock();
        if st.epoch != handle.epoch || st.active_job().is_none() {
            return Err(JobError::NotCancellable);
        }
        let job_id = st.job.as_ref().and_then(|job| job.id);
        self.inner.settle(&mut st, LocalPhase::Cancelled, None);
        info!(job_id = ?job_id, "job cancelled");
        Ok(())
    }

    pub fn current(&self) -> Option<Job> {
        self.inner.job_tx.borrow().clone()
    }

    pub fn phase(&self) -> LocalPhase {
        self.inner
            .job_tx
            .borrow()
            .as_ref()
            .map_or(LocalPhase::Idle, |job| job.phase)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Job>> {
        self.inner.job_tx.subscribe()
    }

    /// Resolves once no job is active, with the last job snapshot.
    pub async fn settled(&self) -> Option<Job> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|job| job.as_ref().map_or(true, |job| !job.phase.is_active()))
            .await
            .map(|job| job.clone());
        snapshot.unwrap_or_else(|_| self.current())
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, st: &SessionState) {
        self.job_tx.send_replace(st.job.clone());
    }

    /// Move the active job to a terminal phase and release the slot. No-op when nothing is
    /// active, so the slot is released at most once.
    fn settle(&self, st: &mut SessionState, phase: LocalPhase, error: Option<String>) -> bool {
        let Some(job) = st.job.as_mut().filter(|job| job.phase.is_active()) else {
            return false;
        };
        job.phase = phase;
        job.error = error;
        job.touch();
        st.in_flight = false;
        if let Some(schedule) = st.schedule.take() {
            schedule.cancel();
        }
        self.publish(st);
        true
    }

    fn acknowledge(inner: &Arc<Inner>, epoch: u64, result: Result<JobId, JobError>) {
        let mut st = inner.lock();
        let Some(job) = st.current(epoch, LocalPhase::Submitting) else {
            debug!(epoch, "discarding submit acknowledgement for a job no longer submitting");
            return;
        };
        match result {
            Ok(job_id) => {
                job.id = Some(job_id);
                job.phase = LocalPhase::Polling;
                job.attempt = 0;
                job.touch();
                info!(%job_id, "job accepted, polling");
                let ticker = Arc::downgrade(inner);
                st.schedule = Some(ScheduledTask::every(inner.policy.interval, move || {
                    let inner = ticker.upgrade();
                    async move {
                        match inner {
                            Some(inner) => Inner::tick(&inner, epoch).await,
                            None => TickOutcome::Stop,
                        }
                    }
                }));
                inner.publish(&st);
            }
            Err(err) => {
                warn!(error = %err, "job submission failed");
                inner.settle(&mut st, LocalPhase::Failed, Some(failure_text(&err)));
            }
        }
    }

    async fn tick(inner: &Arc<Inner>, epoch: u64) -> TickOutcome {
        let (job_id, lookup) = {
            let mut st = inner.lock();
            if st.in_flight {
                return TickOutcome::Continue;
            }
            let max_attempts = inner.policy.max_attempts;
            let Some(job) = st.current(epoch, LocalPhase::Polling) else {
                return TickOutcome::Stop;
            };
            let (Some(job_id), Some(lookup)) = (job.id, inner.lookup.clone()) else {
                return TickOutcome::Stop;
            };
            if job.attempt >= max_attempts {
                warn!(%job_id, attempts = job.attempt, "attempt budget exhausted");
                inner.settle(&mut st, LocalPhase::Failed, Some(JobError::Timeout.to_string()));
                return TickOutcome::Stop;
            }
            job.attempt += 1;
            job.touch();
            debug!(%job_id, attempt = job.attempt, max_attempts, "polling job status");
            st.in_flight = true;
            inner.publish(&st);
            (job_id, lookup)
        };

        let resolution = match lookup.fetch_status(job_id).await {
            Ok(Some(report)) => resolve(report),
            Ok(None) => Resolution::Failed {
                status: None,
                reason: failure_text(&JobError::NotFound),
            },
            Err(err) => Resolution::Failed {
                status: None,
                reason: failure_text(&err),
            },
        };

        match resolution {
            Resolution::StillRunning(status) => {
                let mut st = inner.lock();
                let Some(job) = st.current(epoch, LocalPhase::Polling) else {
                    debug!(%job_id, "discarding status for a job no longer polling");
                    return TickOutcome::Stop;
                };
                job.status = status;
                job.touch();
                st.in_flight = false;
                inner.publish(&st);
                TickOutcome::Continue
            }
            Resolution::Failed { status, reason } => {
                let mut st = inner.lock();
                let Some(job) = st.current(epoch, LocalPhase::Polling) else {
                    return TickOutcome::Stop;
                };
                if let Some(status) = status {
                    job.status = status;
                }
                warn!(%job_id, reason, "job failed");
                inner.settle(&mut st, LocalPhase::Failed, Some(reason));
                TickOutcome::Stop
            }
            Resolution::Completed { dataset_id } => {
                let still_polling = inner.lock().current(epoch, LocalPhase::Polling).is_some();
                if !still_polling {
                    return TickOutcome::Stop;
                }
                let Some(service) = inner.service.clone() else {
                    return TickOutcome::Stop;
                };
                let outcome = process_completion(service.as_ref(), &inner.cache, dataset_id).await;

                let mut st = inner.lock();
                let Some(job) = st.current(epoch, LocalPhase::Polling) else {
                    debug!(%job_id, "discarding completion for a job no longer polling");
                    return TickOutcome::Stop;
                };
                job.status = RemoteStatus::Completed;
                job.dataset_id = Some(dataset_id);
                job.notice = outcome.notice;
                info!(
                    %job_id,
                    %dataset_id,
                    title = outcome.dataset.as_ref().map(|d| d.title.as_str()),
                    "job completed"
                );
                inner.settle(&mut st, LocalPhase::Completed, None);
                TickOutcome::Stop
            }
        }
    }
}

fn resolve(report: JobReport) -> Resolution {
    match report.status {
        RemoteStatus::Pending | RemoteStatus::Running => Resolution::StillRunning(report.status),
        RemoteStatus::Completed => match report.dataset_id {
            Some(dataset_id) => Resolution::Completed { dataset_id },
            None => Resolution::Failed {
                status: None,
                reason: "remote reported completion without a dataset".into(),
            },
        },
        RemoteStatus::Failed => Resolution::Failed {
            status: Some(RemoteStatus::Failed),
            reason: report
                .failure_reason
                .filter(|reason| !reason.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_FAILURE_REASON.to_string()),
        },
    }
}

/// Every failed job carries a non-empty reason.
fn failure_text(err: &JobError) -> String {
    let text = err.to_string();
    if text.trim().is_empty() {
        FALLBACK_FAILURE_REASON.to_string()
    } else {
        text
    }
}

fn validate_prompt(prompt: &str) -> Result<String, JobError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(JobError::Validation("prompt is empty".into()));
    }
    let chars = trimmed.chars().count();
    if chars < MIN_PROMPT_CHARS {
        return Err(JobError::Validation(format!(
            "prompt must be at least {MIN_PROMPT_CHARS} characters, got {chars}"
        )));
    }
    Ok(trimmed.to_string())
}
