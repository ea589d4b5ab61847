// src/status/mod.rs

//! Session status: outcome/error records and the shared aggregator that
//! executors write to and the progress monitor and report read from.

pub mod aggregator;
pub mod journal;
pub mod records;

pub use aggregator::{StatusAggregator, StatusCounts};
pub use journal::{Journal, JournalContents};
pub use records::{ErrorRecord, OutcomeRecord, RecordParseError};
