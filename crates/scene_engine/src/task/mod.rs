//! Parallel job execution
//!
//! Jobs are queued into a [`JobQueue`] and executed by a [`WorkerPool`] with
//! a barrier at the end of every batch.

pub mod job;
pub mod worker_pool;

pub use job::{JobContext, JobFn, JobQueue};
pub use worker_pool::{TaskError, WorkerPool};
