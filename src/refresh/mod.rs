//! Refresh jobs: queueing, execution and status.
//!
//! # Architecture
//!
//! - **Jobs** (`job.rs`) - one evaluate-and-apply cycle and its state machine
//! - **Queue** (`queue.rs`) - per-target dedup, rerun flag, worker pool
//! - **Pipeline** (`pipeline.rs`) - the work a job does against the host
//! - **Status** (`status.rs`) - live job state and bounded history

mod job;
mod pipeline;
mod queue;
mod status;

pub use job::{JobState, JobSummary, RefreshJob, RefreshReason};
pub use pipeline::{DEFAULT_BATCH_SIZE, RefreshPipeline};
pub use queue::{EnqueueOutcome, JobRunner, QueueConfig, RefreshQueue};
pub use status::{DEFAULT_HISTORY_SIZE, StatusReport, StatusTracker};
