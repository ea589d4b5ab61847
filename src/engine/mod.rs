// src/engine/mod.rs

//! Orchestration engine for dbmirror.
//!
//! This module ties together:
//! - the bounded [`scheduler`] that dispatches tasks to executors
//! - the session-wide [`cancel`] state machine (Ctrl-C, grace, abort)
//! - the [`monitor`] that reports progress while work is in flight
//! - the [`session`] that owns the run id and aggregator and runs the
//!   scheduler and monitor side by side

pub mod cancel;
pub mod monitor;
pub mod scheduler;
pub mod session;

pub use cancel::Cancellation;
pub use monitor::{ProgressMonitor, ProgressSnapshot};
pub use scheduler::{Scheduler, SchedulerReport};
pub use session::{Session, SessionOutcome, new_session_id};
