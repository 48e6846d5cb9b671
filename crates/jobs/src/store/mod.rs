//! Job Store — durable record of jobs keyed by idempotency key.
//!
//! The store is the single source of truth for job state. Status mutations go
//! through [`JobStore::transition`], a compare-and-swap on the forward-only
//! status ordering: a request to move to an already-terminal or out-of-order
//! state is a no-op logged at warn, not an error.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use codehive_core::WorkspaceId;

use super::types::{Job, JobStatus};

mod in_memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use in_memory::InMemoryJobStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresJobStore;

/// Upper bound on `find_by_workspace` results (newest first).
pub const RECENT_JOBS_LIMIT: usize = 50;

/// Outcome of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status moved forward and `updated_at` was refreshed.
    Applied,
    /// The request was out of order (stale or already terminal); nothing
    /// changed.
    Ignored,
}

/// Job store error.
#[derive(Debug, Clone, Error)]
pub enum JobStoreError {
    /// The idempotency key already exists. Callers treat this as "already
    /// submitted", not a hard failure.
    #[error("job already exists for idempotency key: {0}")]
    Conflict(String),
    /// No job exists for the idempotency key.
    #[error("no job for idempotency key: {0}")]
    NotFound(String),
    /// Infrastructure failure; propagated so the delivery mechanism can
    /// redeliver.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable job record store.
///
/// Implementations must serialize transitions per idempotency key (row-level
/// locking or an equivalent guarded update).
pub trait JobStore: Send + Sync {
    /// Create a job in `queued` state. Fails with [`JobStoreError::Conflict`]
    /// when the idempotency key already exists.
    fn create(
        &self,
        workspace_id: WorkspaceId,
        input: JsonValue,
        idempotency_key: &str,
    ) -> Result<Job, JobStoreError>;

    /// Look up a job by idempotency key.
    fn find_by_idempotency(&self, idempotency_key: &str) -> Result<Option<Job>, JobStoreError>;

    /// The most recent jobs of a workspace, newest first, capped at
    /// [`RECENT_JOBS_LIMIT`].
    fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<Job>, JobStoreError>;

    /// Compare-and-swap status transition.
    ///
    /// Applies `new_status` (plus `output`, and `retries` when given) only if
    /// it ranks strictly ahead of the current status; otherwise returns
    /// [`Transition::Ignored`]. Unknown keys are an error.
    fn transition(
        &self,
        idempotency_key: &str,
        new_status: JobStatus,
        output: Option<JsonValue>,
        retries: Option<u32>,
    ) -> Result<Transition, JobStoreError>;
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn create(
        &self,
        workspace_id: WorkspaceId,
        input: JsonValue,
        idempotency_key: &str,
    ) -> Result<Job, JobStoreError> {
        (**self).create(workspace_id, input, idempotency_key)
    }

    fn find_by_idempotency(&self, idempotency_key: &str) -> Result<Option<Job>, JobStoreError> {
        (**self).find_by_idempotency(idempotency_key)
    }

    fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<Job>, JobStoreError> {
        (**self).find_by_workspace(workspace_id)
    }

    fn transition(
        &self,
        idempotency_key: &str,
        new_status: JobStatus,
        output: Option<JsonValue>,
        retries: Option<u32>,
    ) -> Result<Transition, JobStoreError> {
        (**self).transition(idempotency_key, new_status, output, retries)
    }
}
