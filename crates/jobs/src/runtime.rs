//! Execution runtime boundary.
//!
//! The sandboxed code-execution runtime is a black box to this crate: it
//! consumes the job's opaque input and produces structured output within
//! bounded time, or fails with a runtime error that the worker treats as
//! transient.

use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::types::ExecutionOutput;

/// Runtime invocation failure. Retried by the queue up to the attempt
/// ceiling.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("execution failed: {0}")]
    Failed(String),
}

/// The execution runtime the worker invokes.
pub trait ExecutionRuntime: Send + Sync {
    fn execute(&self, input: &JsonValue) -> Result<ExecutionOutput, RuntimeError>;
}

impl<R: ExecutionRuntime + ?Sized> ExecutionRuntime for std::sync::Arc<R> {
    fn execute(&self, input: &JsonValue) -> Result<ExecutionOutput, RuntimeError> {
        (**self).execute(input)
    }
}

/// Stand-in runtime for dev and tests: sleeps for the configured duration and
/// echoes the input.
#[derive(Debug, Clone)]
pub struct MockRuntime {
    delay: Duration,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl MockRuntime {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// No artificial delay; useful in tests.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl ExecutionRuntime for MockRuntime {
    fn execute(&self, input: &JsonValue) -> Result<ExecutionOutput, RuntimeError> {
        let started = Instant::now();
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        Ok(ExecutionOutput {
            stdout: format!("Mock execution: {input}"),
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}
