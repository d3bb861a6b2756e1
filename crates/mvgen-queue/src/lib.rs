//! Redis Streams job graph.
//!
//! This crate provides:
//! - Named queues for audio, clip and finishing jobs, with retry and DLQ
//! - Job status records
//! - The join barrier between fan-out and finishing
//! - Pipeline planning and submission

pub mod barrier;
pub mod config;
pub mod error;
pub mod graph;
pub mod job;
pub mod queue;
pub mod status;

pub use barrier::{BarrierArrival, JoinBarrier};
pub use config::{QueueConfig, QueueName};
pub use error::{QueueError, QueueResult};
pub use graph::{PipelineGraph, PipelinePlan, SubmittedPipeline};
pub use job::{AudioSynthesisJob, ClipSynthesisJob, FinishingJob, QueueJob};
pub use queue::{Delivery, JobQueue};
pub use status::JobStatusStore;
