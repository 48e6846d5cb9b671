//! Job Queue — at-least-once task hand-off with attempt tracking.
//!
//! Delivers [`QueuedTask`]s to workers at least once: a claimed delivery that
//! is nacked comes back after the policy's backoff with its attempt count
//! bumped, until the attempt ceiling. The queue never dedupes by idempotency
//! key; that backstop belongs to the worker's completed-check against the
//! store.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::types::{QueuedTask, RetryPolicy};

/// One claimed instance of a task.
///
/// At most one worker holds a given delivery, but the same idempotency key
/// may surface in multiple deliveries across redeliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub task: QueuedTask,
    /// 1-indexed attempt number.
    pub attempt: u32,
}

/// Outcome of a nack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redelivery {
    /// The task will be delivered again after the given delay.
    Scheduled(Duration),
    /// The attempt ceiling was reached; the task is dropped and the worker
    /// owns recording the terminal failure.
    Exhausted,
}

#[derive(Debug, Default)]
struct QueueInner {
    ready: VecDeque<Delivery>,
    delayed: Vec<(Instant, Delivery)>,
}

/// In-process task queue shared by the dispatcher and the workers.
#[derive(Debug)]
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    policy: RetryPolicy,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl JobQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Enqueue a task for its first delivery.
    pub fn enqueue(&self, task: QueuedTask) {
        let mut inner = self.inner.lock().unwrap();
        inner.ready.push_back(Delivery { task, attempt: 1 });
    }

    /// Claim the next due delivery, FIFO among ready tasks. Returns `None`
    /// when nothing is due.
    pub fn claim(&self) -> Option<Delivery> {
        let mut inner = self.inner.lock().unwrap();

        // Promote redeliveries whose backoff has elapsed.
        let now = Instant::now();
        let mut i = 0;
        while i < inner.delayed.len() {
            if inner.delayed[i].0 <= now {
                let (_, delivery) = inner.delayed.remove(i);
                inner.ready.push_back(delivery);
            } else {
                i += 1;
            }
        }

        inner.ready.pop_front()
    }

    /// Acknowledge a delivery as settled; it is never redelivered.
    pub fn ack(&self, delivery: Delivery) {
        debug!(
            idempotency_key = %delivery.task.idempotency_key,
            attempt = delivery.attempt,
            "task acknowledged"
        );
    }

    /// Report a failed delivery. Schedules a redelivery with backoff while
    /// attempts remain; otherwise the task is dropped.
    pub fn nack(&self, delivery: Delivery) -> Redelivery {
        if !self.policy.should_retry(delivery.attempt) {
            return Redelivery::Exhausted;
        }

        let delay = self.policy.delay_for_attempt(delivery.attempt);
        let next = Delivery {
            task: delivery.task,
            attempt: delivery.attempt + 1,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.delayed.push((Instant::now() + delay, next));
        Redelivery::Scheduled(delay)
    }

    /// Tasks currently queued or awaiting redelivery (claimed in-flight
    /// deliveries are not counted).
    pub fn depth(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.ready.len() + inner.delayed.len()
    }
}
