//! Idempotent job dispatch and execution pipeline.
//!
//! ## Components
//!
//! - `types`: `Job` record, status state machine, retry policy
//! - `store`: `JobStore` — durable record keyed by idempotency key, with
//!   compare-and-swap status transitions
//! - `queue`: `JobQueue` — at-least-once task hand-off with attempt tracking
//!   and exponential redelivery backoff
//! - `runtime`: `ExecutionRuntime` — the sandboxed execution boundary
//!   (treated as a black box)
//! - `worker`: `ExecutionWorker` — claims deliveries, runs the runtime,
//!   reconciles the store
//! - `dispatch`: `Dispatcher` — API-facing submission with idempotency-key
//!   dedup
//!
//! The queue never dedupes by key; redelivery safety comes from the worker's
//! completed-check against the store.

pub mod dispatch;
pub mod queue;
pub mod runtime;
pub mod store;
pub mod types;
pub mod worker;

pub use dispatch::{Dispatcher, Submission};
pub use queue::{Delivery, JobQueue, Redelivery};
pub use runtime::{ExecutionRuntime, MockRuntime, RuntimeError};
pub use store::{InMemoryJobStore, JobStore, JobStoreError, Transition, RECENT_JOBS_LIMIT};
#[cfg(feature = "postgres")]
pub use store::PostgresJobStore;
pub use types::{BackoffStrategy, ExecutionOutput, Job, JobStatus, QueuedTask, RetryPolicy};
pub use worker::{ExecutionWorker, TaskOutcome, WorkerConfig, WorkerHandle, WorkerStats};
