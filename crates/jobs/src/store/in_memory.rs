//! In-memory job store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::warn;

use codehive_core::WorkspaceId;

use super::{JobStore, JobStoreError, Transition, RECENT_JOBS_LIMIT};
use crate::types::{Job, JobStatus};

/// In-memory job store.
///
/// A single map keyed by idempotency key behind one lock; holding the write
/// lock across a transition gives the per-key serialization the contract
/// requires.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl JobStore for InMemoryJobStore {
    fn create(
        &self,
        workspace_id: WorkspaceId,
        input: JsonValue,
        idempotency_key: &str,
    ) -> Result<Job, JobStoreError> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;

        if jobs.contains_key(idempotency_key) {
            return Err(JobStoreError::Conflict(idempotency_key.to_string()));
        }

        let job = Job::new(workspace_id, input, idempotency_key);
        jobs.insert(idempotency_key.to_string(), job.clone());
        Ok(job)
    }

    fn find_by_idempotency(&self, idempotency_key: &str) -> Result<Option<Job>, JobStoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;
        Ok(jobs.get(idempotency_key).cloned())
    }

    fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;

        let mut result: Vec<Job> = jobs
            .values()
            .filter(|j| j.workspace_id == workspace_id)
            .cloned()
            .collect();

        // Newest first; JobId is time-ordered (uuid v7) and breaks
        // same-millisecond ties.
        result.sort_by(|a, b| (b.created_at, b.id.as_uuid()).cmp(&(a.created_at, a.id.as_uuid())));
        result.truncate(RECENT_JOBS_LIMIT);
        Ok(result)
    }

    fn transition(
        &self,
        idempotency_key: &str,
        new_status: JobStatus,
        output: Option<JsonValue>,
        retries: Option<u32>,
    ) -> Result<Transition, JobStoreError> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;

        let job = jobs
            .get_mut(idempotency_key)
            .ok_or_else(|| JobStoreError::NotFound(idempotency_key.to_string()))?;

        if new_status.rank() <= job.status.rank() {
            warn!(
                idempotency_key,
                current = %job.status,
                requested = %new_status,
                "ignoring out-of-order status transition"
            );
            return Ok(Transition::Ignored);
        }

        job.status = new_status;
        if let Some(output) = output {
            job.output = Some(output);
        }
        if let Some(retries) = retries {
            job.retries = retries;
        }
        job.updated_at = Utc::now();
        Ok(Transition::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(id: i64) -> WorkspaceId {
        WorkspaceId::new(id)
    }

    #[test]
    fn create_enforces_key_uniqueness() {
        let store = InMemoryJobStore::new();
        store.create(ws(1), serde_json::json!({}), "k1").unwrap();

        let err = store.create(ws(1), serde_json::json!({}), "k1").unwrap_err();
        assert!(matches!(err, JobStoreError::Conflict(_)));

        // A different key in the same workspace is fine.
        store.create(ws(1), serde_json::json!({}), "k2").unwrap();
    }

    #[test]
    fn concurrent_creates_yield_exactly_one_row() {
        let store = Arc::new(InMemoryJobStore::new());
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.create(ws(1), serde_json::json!({}), "race")
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(created, 1);
        assert_eq!(store.find_by_workspace(ws(1)).unwrap().len(), 1);
    }

    #[test]
    fn transitions_move_forward_only() {
        let store = InMemoryJobStore::new();
        store.create(ws(1), serde_json::json!({}), "k1").unwrap();

        assert_eq!(
            store
                .transition("k1", JobStatus::Processing, None, None)
                .unwrap(),
            Transition::Applied
        );
        assert_eq!(
            store
                .transition(
                    "k1",
                    JobStatus::Completed,
                    Some(serde_json::json!({"success": true})),
                    None
                )
                .unwrap(),
            Transition::Applied
        );

        // A stale processing write after completion is a no-op.
        assert_eq!(
            store
                .transition("k1", JobStatus::Processing, None, None)
                .unwrap(),
            Transition::Ignored
        );
        // Terminal states never yield to each other.
        assert_eq!(
            store
                .transition("k1", JobStatus::Failed, Some(serde_json::json!({"error": "x"})), None)
                .unwrap(),
            Transition::Ignored
        );

        let job = store.find_by_idempotency("k1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.output, Some(serde_json::json!({"success": true})));
    }

    #[test]
    fn transition_unknown_key_is_an_error() {
        let store = InMemoryJobStore::new();
        let err = store
            .transition("missing", JobStatus::Processing, None, None)
            .unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound(_)));
    }

    #[test]
    fn failed_transition_records_retries() {
        let store = InMemoryJobStore::new();
        store.create(ws(1), serde_json::json!({}), "k1").unwrap();
        store
            .transition("k1", JobStatus::Processing, None, None)
            .unwrap();
        store
            .transition(
                "k1",
                JobStatus::Failed,
                Some(serde_json::json!({"error": "boom"})),
                Some(3),
            )
            .unwrap();

        let job = store.find_by_idempotency("k1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retries, 3);
        assert_eq!(job.output, Some(serde_json::json!({"error": "boom"})));
    }

    #[test]
    fn find_by_workspace_is_newest_first_and_bounded() {
        let store = InMemoryJobStore::new();
        for i in 0..(RECENT_JOBS_LIMIT + 5) {
            store
                .create(ws(1), serde_json::json!({"i": i}), &format!("k{i}"))
                .unwrap();
        }
        // Another workspace's jobs are not included.
        store.create(ws(2), serde_json::json!({}), "other").unwrap();

        let jobs = store.find_by_workspace(ws(1)).unwrap();
        assert_eq!(jobs.len(), RECENT_JOBS_LIMIT);

        // Newest first: the last key created is the first returned, and the
        // oldest five fell off the end.
        assert_eq!(jobs[0].idempotency_key, format!("k{}", RECENT_JOBS_LIMIT + 4));
        assert!(jobs.iter().all(|j| j.idempotency_key != "k0"));
        for pair in jobs.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }
}
