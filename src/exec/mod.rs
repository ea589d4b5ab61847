// src/exec/mod.rs

//! Execution layer.
//!
//! - [`backend`] provides the `TransferBackend` trait plus the per-call
//!   `StageContext` (timeout + cancellation) that every stage runs under.
//! - [`command_backend`] is the production backend, running configured shell
//!   templates.
//! - [`process`] spawns those commands in their own process group and
//!   handles terminate/wait/kill escalation.
//! - [`executor`] drives one task's pipeline with bounded retries and
//!   reports to the status aggregator.

pub mod backend;
pub mod command_backend;
pub mod executor;
pub mod process;

pub use backend::{Artifact, BackendFuture, StageContext, StageReport, TransferBackend};
pub use command_backend::CommandBackend;
pub use executor::{ExecutorSettings, TaskExecutor};
