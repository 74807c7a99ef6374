//! Job lifecycle orchestration.
//!
//! This module owns the submit/poll/cancel lifecycle of the session's single active job,
//! the status lookup strategies it polls with, the cancellable schedule driving the polls,
//! and post-completion reconciliation into the result cache. CLI layers call into this
//! module and observe job snapshots through a watch channel.

mod controller;
mod lookup;
mod post_process;
mod schedule;

pub(crate) use controller::{JobHandle, JobOrchestrator};
pub(crate) use lookup::LookupMode;
pub(crate) use schedule::{ScheduledTask, TickOutcome};
