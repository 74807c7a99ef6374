//! Remote service reachability monitor.
//!
//! Probes the service with `list_datasets` once when a service is attached and then on a
//! fixed interval, independent of any job. The result is published as a
//! [`ConnectionState`]; nothing else is shared with the orchestrator. When a cache is
//! attached, recovering from `Failed` refreshes it.

use crate::cache::ResultCache;
use crate::error::JobError;
use crate::model::ConnectionState;
use crate::orchestrator::{ScheduledTask, TickOutcome};
use crate::remote::RemoteJobService;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

type ProbeFuture = Shared<BoxFuture<'static, ConnectionState>>;

/// A shared probe tagged with the attach generation it was started under.
struct InFlight {
    generation: u64,
    probe: ProbeFuture,
}

#[derive(Clone)]
pub struct ConnectionMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    interval: Duration,
    cache: Option<ResultCache>,
    service: Mutex<Option<Arc<dyn RemoteJobService>>>,
    /// Bumped by every `attach`; probe results from an older generation are dropped.
    generation: AtomicU64,
    state_tx: watch::Sender<ConnectionState>,
    in_flight: Mutex<Option<InFlight>>,
    schedule: Mutex<Option<ScheduledTask>>,
    consecutive_failures: AtomicU32,
    last_error: Mutex<Option<JobError>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionMonitor {
    pub fn new(interval: Duration) -> Self {
        Self::build(interval, None)
    }

    /// Like `new`, but a `Failed -> Connected` recovery also refreshes `cache`.
    pub fn with_cache(interval: Duration, cache: ResultCache) -> Self {
        Self::build(interval, Some(cache))
    }

    fn build(interval: Duration, cache: Option<ResultCache>) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                interval,
                cache,
                service: Mutex::new(None),
                generation: AtomicU64::new(0),
                state_tx: watch::Sender::new(ConnectionState::Disconnected),
                in_flight: Mutex::new(None),
                schedule: Mutex::new(None),
                consecutive_failures: AtomicU32::new(0),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// (Re)establish the service connection: probe eagerly, then keep probing.
    /// Detaching (`None`) stops probing and reports `Disconnected`.
    pub async fn attach(&self, service: Option<Arc<dyn RemoteJobService>>) -> ConnectionState {
        let attached = service.is_some();
        {
            let mut slot = lock(&self.inner.in_flight);
            *lock(&self.inner.service) = service;
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            // A probe bound to the previous service may still finish, but is never joined.
            slot.take();
        }
        self.inner.consecutive_failures.store(0, Ordering::Relaxed);
        lock(&self.inner.last_error).take();

        let previous = lock(&self.inner.schedule).take();
        if let Some(schedule) = previous {
            schedule.cancel();
        }

        if !attached {
            self.inner.state_tx.send_replace(ConnectionState::Disconnected);
            info!("remote service detached");
            return ConnectionState::Disconnected;
        }

        let state = self.retry().await;
        let weak = Arc::downgrade(&self.inner);
        let schedule = ScheduledTask::every(self.inner.interval, move || {
            let inner = weak.upgrade();
            async move {
                let Some(inner) = inner else {
                    return TickOutcome::Stop;
                };
                MonitorInner::probe(&inner).await;
                TickOutcome::Continue
            }
        });
        *lock(&self.inner.schedule) = Some(schedule);
        state
    }

    /// Probe now. Concurrent callers share one in-flight probe.
    pub async fn retry(&self) -> ConnectionState {
        MonitorInner::probe(&self.inner).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<JobError> {
        lock(&self.inner.last_error).clone()
    }

    pub fn stop(&self) {
        if let Some(schedule) = lock(&self.inner.schedule).take() {
            schedule.cancel();
        }
    }
}

impl MonitorInner {
    fn probe(inner: &Arc<MonitorInner>) -> ProbeFuture {
        let mut slot = lock(&inner.in_flight);
        if let Some(pending) = slot.as_ref() {
            debug!("joining in-flight probe");
            return pending.probe.clone();
        }
        let generation = inner.generation.load(Ordering::SeqCst);
        let runner = Arc::clone(inner);
        let probe = async move {
            let state = runner.run_probe(generation).await;
            let mut slot = lock(&runner.in_flight);
            if slot.as_ref().is_some_and(|f| f.generation == generation) {
                slot.take();
            }
            state
        }
        .boxed()
        .shared();
        *slot = Some(InFlight {
            generation,
            probe: probe.clone(),
        });
        probe
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run_probe(&self, generation: u64) -> ConnectionState {
        let service = lock(&self.service).clone();
        let Some(service) = service else {
            self.state_tx.send_replace(ConnectionState::Disconnected);
            return ConnectionState::Disconnected;
        };

        let recovering = *self.state_tx.borrow() == ConnectionState::Failed;
        // A healthy connection stays `Connected` while being re-checked.
        if *self.state_tx.borrow() != ConnectionState::Connected {
            self.state_tx.send_replace(ConnectionState::Connecting);
        }

        let result = service.list_datasets().await;
        if !self.is_current(generation) {
            debug!(generation, "discarding probe result for a replaced service");
            return *self.state_tx.borrow();
        }

        let state = match result {
            Ok(datasets) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                lock(&self.last_error).take();
                debug!(datasets = datasets.len(), "probe succeeded");
                ConnectionState::Connected
            }
            Err(err) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(error = %err, failures, "probe failed");
                *lock(&self.last_error) = Some(err);
                ConnectionState::Failed
            }
        };
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "connection state changed");
        }

        if recovering && state == ConnectionState::Connected {
            self.refresh_cache().await;
        }
        state
    }

    async fn refresh_cache(&self) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        if let Err(err) = cache.refresh_datasets().await {
            warn!(error = %err, "dataset refresh after reconnect failed");
        }
        if let Err(err) = cache.refresh_jobs().await {
            warn!(error = %err, "job refresh after reconnect failed");
        }
    }
}
