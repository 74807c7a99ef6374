//! Cancellable periodic task.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Shortest period a task runs with; shorter periods, including zero, are raised to it.
pub(crate) const MIN_PERIOD: Duration = Duration::from_millis(1);

/// What the task body wants after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Continue,
    Stop,
}

/// Handle to a spawned periodic task.
///
/// Ticks run strictly one after another; the first fires one `period` after creation.
/// After `cancel()` (or drop) no new tick starts. A tick already running is not
/// interrupted, so its body must check whether its result is still wanted.
pub(crate) struct ScheduledTask {
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn every<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickOutcome> + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    // Also resolves when the handle is dropped.
                    _ = cancel_rx.changed() => break,
                    _ = ticker.tick() => {
                        if *cancel_rx.borrow() {
                            break;
                        }
                        if tick().await == TickOutcome::Stop {
                            break;
                        }
                    }
                }
            }
        });
        Self { cancel_tx, handle }
    }

    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
