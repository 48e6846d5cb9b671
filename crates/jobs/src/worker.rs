//! Execution Worker — claims deliveries, invokes the runtime, reconciles the
//! store.
//!
//! Several workers may poll the same queue concurrently, including two
//! holding redelivered copies of the same idempotency key; the store's
//! compare-and-swap transitions and the completed-check here keep that safe.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::queue::{Delivery, JobQueue, Redelivery};
use crate::runtime::ExecutionRuntime;
use crate::store::{JobStore, JobStoreError};
use crate::types::JobStatus;

/// Terminal disposition of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The job was already completed; acknowledged without re-executing.
    Skipped,
    /// Executed and recorded as completed.
    Succeeded,
    /// Execution (or a store write) failed with attempts remaining; a
    /// redelivery is scheduled.
    Retrying,
    /// Attempt ceiling reached; the terminal failure was recorded.
    Failed,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to poll the queue when it is empty.
    pub poll_interval: Duration,
    /// Thread name for logging.
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            name: "execution-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retries_scheduled: u64,
}

/// Handle to control a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Executes queued tasks against the runtime and reconciles job state.
pub struct ExecutionWorker<S: JobStore, R: ExecutionRuntime> {
    store: S,
    queue: Arc<JobQueue>,
    runtime: R,
}

impl<S, R> ExecutionWorker<S, R>
where
    S: JobStore + 'static,
    R: ExecutionRuntime + 'static,
{
    pub fn new(store: S, queue: Arc<JobQueue>, runtime: R) -> Self {
        Self {
            store,
            queue,
            runtime,
        }
    }

    /// Process one delivery to a terminal disposition.
    ///
    /// State machine: received → (skipped | processing → succeeded |
    /// retrying | failed). Store errors are not swallowed — the delivery is
    /// nacked so the queue redelivers; the completed-check makes redelivery
    /// safe.
    pub fn process_delivery(&self, delivery: Delivery) -> TaskOutcome {
        let key = delivery.task.idempotency_key.clone();

        // Dedup backstop: the queue may deliver the same key twice.
        match self.store.find_by_idempotency(&key) {
            Ok(Some(job)) if job.status == JobStatus::Completed => {
                info!(idempotency_key = %key, "job already completed; skipping redelivery");
                self.queue.ack(delivery);
                return TaskOutcome::Skipped;
            }
            Ok(_) => {}
            Err(e) => return self.retry_after_store_error(delivery, &e),
        }

        if let Err(e) = self
            .store
            .transition(&key, JobStatus::Processing, None, None)
        {
            return self.retry_after_store_error(delivery, &e);
        }

        match self.runtime.execute(&delivery.task.input) {
            Ok(output) => {
                match self.store.transition(
                    &key,
                    JobStatus::Completed,
                    Some(output.into_document()),
                    None,
                ) {
                    Ok(_) => {
                        debug!(idempotency_key = %key, "job completed");
                        self.queue.ack(delivery);
                        TaskOutcome::Succeeded
                    }
                    Err(e) => self.retry_after_store_error(delivery, &e),
                }
            }
            Err(runtime_err) => {
                let attempt = delivery.attempt;
                match self.queue.nack(delivery) {
                    Redelivery::Scheduled(delay) => {
                        warn!(
                            idempotency_key = %key,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %runtime_err,
                            "execution failed; redelivery scheduled"
                        );
                        TaskOutcome::Retrying
                    }
                    Redelivery::Exhausted => {
                        let document = serde_json::json!({ "error": runtime_err.to_string() });
                        match self.store.transition(
                            &key,
                            JobStatus::Failed,
                            Some(document),
                            Some(attempt),
                        ) {
                            Ok(_) => error!(
                                idempotency_key = %key,
                                attempt,
                                error = %runtime_err,
                                "job failed permanently"
                            ),
                            // The delivery is already spent; nothing left to
                            // redeliver, so surface this loudly.
                            Err(e) => error!(
                                idempotency_key = %key,
                                error = %e,
                                "failed to record terminal failure"
                            ),
                        }
                        TaskOutcome::Failed
                    }
                }
            }
        }
    }

    fn retry_after_store_error(&self, delivery: Delivery, err: &JobStoreError) -> TaskOutcome {
        let key = delivery.task.idempotency_key.clone();
        let attempt = delivery.attempt;
        match self.queue.nack(delivery) {
            Redelivery::Scheduled(delay) => {
                warn!(
                    idempotency_key = %key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "store error; redelivery scheduled"
                );
                TaskOutcome::Retrying
            }
            Redelivery::Exhausted => {
                error!(
                    idempotency_key = %key,
                    attempt,
                    error = %err,
                    "store error with attempts exhausted"
                );
                TaskOutcome::Failed
            }
        }
    }

    /// Spawn the worker's polling loop in a background thread.
    pub fn spawn(self, config: WorkerConfig) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(self, config, shutdown_rx, stats_clone))
            .expect("failed to spawn execution worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn worker_loop<S, R>(
    worker: ExecutionWorker<S, R>,
    config: WorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) where
    S: JobStore + 'static,
    R: ExecutionRuntime + 'static,
{
    info!(worker = %config.name, "execution worker started");

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match worker.queue.claim() {
            Some(delivery) => {
                debug!(
                    worker = %config.name,
                    idempotency_key = %delivery.task.idempotency_key,
                    attempt = delivery.attempt,
                    "claimed task"
                );

                let outcome = worker.process_delivery(delivery);

                let mut s = stats.lock().unwrap();
                s.processed += 1;
                match outcome {
                    TaskOutcome::Skipped => s.skipped += 1,
                    TaskOutcome::Succeeded => s.succeeded += 1,
                    TaskOutcome::Retrying => s.retries_scheduled += 1,
                    TaskOutcome::Failed => s.failed += 1,
                }
            }
            None => thread::sleep(config.poll_interval),
        }
    }

    info!(worker = %config.name, "execution worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RuntimeError};
    use crate::store::InMemoryJobStore;
    use crate::types::{QueuedTask, RetryPolicy};
    use codehive_core::WorkspaceId;
    use serde_json::Value as JsonValue;
    use std::time::Duration;

    struct FailingRuntime;

    impl ExecutionRuntime for FailingRuntime {
        fn execute(&self, _input: &JsonValue) -> Result<crate::types::ExecutionOutput, RuntimeError> {
            Err(RuntimeError::Failed("runtime exploded".to_string()))
        }
    }

    fn ws() -> WorkspaceId {
        WorkspaceId::new(1)
    }

    fn instant_queue() -> Arc<JobQueue> {
        // Zero backoff so redeliveries are claimable immediately in tests.
        Arc::new(JobQueue::new(RetryPolicy::exponential(
            3,
            Duration::ZERO,
            Duration::ZERO,
        )))
    }

    fn submit(store: &InMemoryJobStore, queue: &JobQueue, key: &str) {
        let input = serde_json::json!({"cmd": "run"});
        store.create(ws(), input.clone(), key).unwrap();
        queue.enqueue(QueuedTask {
            workspace_id: ws(),
            input,
            idempotency_key: key.to_string(),
        });
    }

    #[test]
    fn successful_task_completes_the_job() {
        let store = InMemoryJobStore::arc();
        let queue = instant_queue();
        let worker = ExecutionWorker::new(store.clone(), queue.clone(), MockRuntime::instant());

        submit(&store, &queue, "k1");
        let delivery = queue.claim().unwrap();
        assert_eq!(worker.process_delivery(delivery), TaskOutcome::Succeeded);

        let job = store.find_by_idempotency("k1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let output = job.output.unwrap();
        assert_eq!(output["success"], serde_json::json!(true));
        assert!(output["stdout"].as_str().unwrap().contains("Mock execution"));
        assert!(queue.claim().is_none());
    }

    #[test]
    fn redelivery_of_a_completed_job_is_skipped() {
        let store = InMemoryJobStore::arc();
        let queue = instant_queue();
        let worker = ExecutionWorker::new(store.clone(), queue.clone(), MockRuntime::instant());

        submit(&store, &queue, "k1");
        let first = queue.claim().unwrap();
        worker.process_delivery(first);
        let completed = store.find_by_idempotency("k1").unwrap().unwrap();

        // Simulate a duplicate delivery of the same key.
        queue.enqueue(QueuedTask {
            workspace_id: ws(),
            input: serde_json::json!({"cmd": "run"}),
            idempotency_key: "k1".to_string(),
        });
        let duplicate = queue.claim().unwrap();
        assert_eq!(worker.process_delivery(duplicate), TaskOutcome::Skipped);

        // Output untouched by the duplicate.
        let after = store.find_by_idempotency("k1").unwrap().unwrap();
        assert_eq!(after.output, completed.output);
        assert_eq!(after.updated_at, completed.updated_at);
    }

    #[test]
    fn failing_task_exhausts_after_three_attempts() {
        let store = InMemoryJobStore::arc();
        let queue = instant_queue();
        let worker = ExecutionWorker::new(store.clone(), queue.clone(), FailingRuntime);

        submit(&store, &queue, "k1");

        let d1 = queue.claim().unwrap();
        assert_eq!(worker.process_delivery(d1), TaskOutcome::Retrying);
        let d2 = queue.claim().unwrap();
        assert_eq!(d2.attempt, 2);
        assert_eq!(worker.process_delivery(d2), TaskOutcome::Retrying);
        let d3 = queue.claim().unwrap();
        assert_eq!(d3.attempt, 3);
        assert_eq!(worker.process_delivery(d3), TaskOutcome::Failed);

        let job = store.find_by_idempotency("k1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retries, 3);
        assert!(job.output.unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("runtime exploded"));

        // Never redelivered a fourth time.
        assert!(queue.claim().is_none());
    }

    #[test]
    fn store_error_leaves_the_task_to_redelivery() {
        let store = InMemoryJobStore::arc();
        let queue = instant_queue();
        let worker = ExecutionWorker::new(store.clone(), queue.clone(), MockRuntime::instant());

        // Task delivered for a job the store has never seen: the processing
        // transition fails with NotFound and the delivery is nacked.
        queue.enqueue(QueuedTask {
            workspace_id: ws(),
            input: serde_json::json!({}),
            idempotency_key: "ghost".to_string(),
        });
        let delivery = queue.claim().unwrap();
        assert_eq!(worker.process_delivery(delivery), TaskOutcome::Retrying);
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn spawned_worker_drains_the_queue() {
        let store = InMemoryJobStore::arc();
        let queue = instant_queue();
        let worker = ExecutionWorker::new(store.clone(), queue.clone(), MockRuntime::instant());

        submit(&store, &queue, "k1");
        submit(&store, &queue, "k2");

        let handle = worker.spawn(WorkerConfig {
            poll_interval: Duration::from_millis(5),
            name: "test-worker".to_string(),
        });

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let done = ["k1", "k2"].iter().all(|k| {
                store
                    .find_by_idempotency(k)
                    .unwrap()
                    .map(|j| j.status == JobStatus::Completed)
                    .unwrap_or(false)
            });
            if done {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "jobs did not complete");
            std::thread::sleep(Duration::from_millis(5));
        }

        let stats = handle.stats();
        assert_eq!(stats.succeeded, 2);
        handle.shutdown();
    }
}
