//! Durable background job queue with retry, backoff, and dead-letter handling.
//!
//! ## Design
//!
//! - Three logical queues: media, notification, delayed order advancement
//! - At-least-once delivery; handlers must be idempotent
//! - Retry policy with exponential backoff (default 3 attempts, 1s base)
//! - Visibility timeout: jobs claimed by a crashed worker are redelivered
//! - Dead-letter set for exhausted jobs, inspectable and retriable by an
//!   operator; requeued on worker startup
//!
//! ## Components
//!
//! - `Job`: queue item with JSON payload and retry metadata
//! - `JobStore`: persistence for jobs (in-memory here; swappable)
//! - `JobExecutor`: polling worker loop dispatching to per-queue handlers

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{JobExecutor, JobExecutorConfig, JobExecutorHandle};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    DeadLetterEntry, Job, JobId, JobOutcome, JobStatus, QueueName, RetryPolicy,
};
