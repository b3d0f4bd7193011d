//! Data models for catclass runs
//!
//! Counters and diagnostics produced by rule loading and batch classification.

pub mod error_channel;
pub mod run_report;

pub use error_channel::{ErrorChannel, RecordError};
pub use run_report::{BatchStats, LoadStats, PageFailure, RunReport, SkipReason};
