//! Pipeline worker.
//!
//! This crate provides:
//! - Consumer loops for the audio, clip and finishing queues
//! - Synthesis poll loops with per-service interval and timeout
//! - The finishing stage: assembly, mux, cover, upload and catalog write
//! - Attempt retries with backoff, dead-lettering and graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod handler;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod polling;
pub mod tasks;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use ledger::JobLedger;
pub use logging::JobLogger;
pub use polling::{PollEnd, PollPolicy};
pub use tasks::{PipelineTask, TaskOutcome, TaskSet};
