//! Job record, status state machine, and retry policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use codehive_core::{JobId, WorkspaceId};

/// Job execution status.
///
/// Transitions are forward-only: queued → processing → {completed | failed}.
/// The ordering is enforced by [`rank`](JobStatus::rank) in the store's
/// compare-and-swap transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting to be picked up.
    Queued,
    /// A worker is executing it.
    Processing,
    /// Finished successfully; `output` holds the result document.
    Completed,
    /// Retries exhausted; `output` holds the error document.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Position in the forward-only ordering. A transition is accepted only
    /// when the new status ranks strictly higher than the current one, which
    /// prevents a stale `processing` write from clobbering a later terminal
    /// write under redelivery races.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted job.
///
/// Exactly one row exists per idempotency key. Created by the dispatcher in
/// `queued` state and mutated only by the execution worker thereafter.
/// `output` is present iff the status is terminal.
///
/// Serialized in camelCase — this is also the wire shape returned by the
/// HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub workspace_id: WorkspaceId,
    /// Caller-supplied dedup key; unique across all jobs.
    pub idempotency_key: String,
    /// Opaque structured input, handed to the execution runtime as-is.
    pub input: JsonValue,
    pub status: JobStatus,
    /// Opaque structured result (success or error document), terminal only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    /// Attempts made; persisted on the terminal failed transition.
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job in `queued` state.
    pub fn new(workspace_id: WorkspaceId, input: JsonValue, idempotency_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            workspace_id,
            idempotency_key: idempotency_key.into(),
            input,
            status: JobStatus::Queued,
            output: None,
            retries: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The transient queue message derived from a job.
///
/// Owned by the queue until claimed; the same idempotency key may be
/// represented by multiple task instances across redeliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTask {
    pub workspace_id: WorkspaceId,
    pub input: JsonValue,
    pub idempotency_key: String,
}

/// Backoff strategy for redeliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between redeliveries.
    Fixed,
    /// Exponential backoff: base * 2^(attempt - 1).
    Exponential,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential
    }
}

/// Retry policy configuration for the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first delivery).
    pub max_attempts: u32,
    /// Base delay before the first redelivery.
    pub base_delay: Duration,
    /// Cap on the computed delay.
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 3 attempts, 2s/4s exponential backoff.
        Self::exponential(3, Duration::from_secs(2), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    /// Create a policy with fixed delays.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before redelivering after the given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                base_ms.saturating_mul(exp).min(max_ms)
            }
        };

        Duration::from_millis(delay_ms.min(max_ms))
    }

    /// Whether another delivery is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Result of a successful runtime invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub execution_time_ms: u64,
}

impl ExecutionOutput {
    /// Render the terminal output document persisted on the job:
    /// `{success, stdout, executionTime}`.
    pub fn into_document(self) -> JsonValue {
        serde_json::json!({
            "success": true,
            "stdout": self.stdout,
            "executionTime": format!("{}ms", self.execution_time_ms),
        })
    }
}
