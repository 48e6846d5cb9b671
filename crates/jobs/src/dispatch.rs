//! Job dispatch — idempotency-key dedup in front of the queue.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, info};

use codehive_core::WorkspaceId;

use crate::queue::JobQueue;
use crate::store::{JobStore, JobStoreError};
use crate::types::{Job, QueuedTask};

/// Result of a submission.
#[derive(Debug, Clone)]
pub enum Submission {
    /// A new job was created and enqueued.
    Accepted(Job),
    /// A job with this idempotency key already exists; nothing was enqueued.
    Existing(Job),
}

impl Submission {
    pub fn job(&self) -> &Job {
        match self {
            Submission::Accepted(job) | Submission::Existing(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            Submission::Accepted(job) | Submission::Existing(job) => job,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Submission::Accepted(_))
    }
}

/// Accepts job submissions, deduplicating on the idempotency key.
pub struct Dispatcher<S: JobStore> {
    store: S,
    queue: Arc<JobQueue>,
}

impl<S: JobStore> Dispatcher<S> {
    pub fn new(store: S, queue: Arc<JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Submit a job. Duplicate keys return the existing job unchanged,
    /// regardless of its current status; only a fresh key creates and
    /// enqueues.
    pub fn submit(
        &self,
        workspace_id: WorkspaceId,
        input: JsonValue,
        idempotency_key: &str,
    ) -> Result<Submission, JobStoreError> {
        if let Some(existing) = self.store.find_by_idempotency(idempotency_key)? {
            debug!(
                idempotency_key,
                job_id = %existing.id,
                status = %existing.status,
                "duplicate submission; returning existing job"
            );
            return Ok(Submission::Existing(existing));
        }

        match self.store.create(workspace_id, input.clone(), idempotency_key) {
            Ok(job) => {
                self.queue.enqueue(QueuedTask {
                    workspace_id,
                    input,
                    idempotency_key: idempotency_key.to_string(),
                });
                info!(
                    idempotency_key,
                    job_id = %job.id,
                    workspace_id = %workspace_id,
                    "job accepted"
                );
                Ok(Submission::Accepted(job))
            }
            // Two submissions raced on the same key; the loser reads back
            // the winner's job.
            Err(JobStoreError::Conflict(_)) => {
                let existing = self.store.find_by_idempotency(idempotency_key)?.ok_or_else(|| {
                    JobStoreError::Storage(format!(
                        "job for key '{idempotency_key}' vanished after conflict"
                    ))
                })?;
                Ok(Submission::Existing(existing))
            }
            Err(e) => Err(e),
        }
    }

    /// Recent jobs for a workspace, newest first.
    pub fn list_jobs(&self, workspace_id: WorkspaceId) -> Result<Vec<Job>, JobStoreError> {
        self.store.find_by_workspace(workspace_id)
    }
}
