//! Postgres-backed job store.
//!
//! Uniqueness of the idempotency key and the forward-only status transition
//! are both enforced at the database level: the unique constraint maps
//! `23505` to [`JobStoreError::Conflict`], and `transition` is a single
//! guarded `UPDATE ... WHERE status = ANY(<prior statuses>)` — the SQL form
//! of the compare-and-swap.
//!
//! The [`JobStore`] trait is synchronous (worker threads poll it directly),
//! so queries run through a captured tokio runtime handle. Construct the
//! store from within the runtime (`Handle::current()`) and call it from
//! plain threads or `spawn_blocking` contexts.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use tracing::warn;

use codehive_core::{JobId, WorkspaceId};
use serde_json::Value as JsonValue;

use super::{JobStore, JobStoreError, Transition, RECENT_JOBS_LIMIT};
use crate::types::{Job, JobStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id              UUID PRIMARY KEY,
    workspace_id    BIGINT NOT NULL,
    idempotency_key TEXT NOT NULL UNIQUE,
    input           JSONB NOT NULL,
    status          TEXT NOT NULL,
    output          JSONB,
    retries         INTEGER NOT NULL DEFAULT 0,
    created_at      TIMESTAMPTZ NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS jobs_workspace_created_idx
    ON jobs (workspace_id, created_at DESC);
"#;

/// Postgres-backed job store.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
    handle: Handle,
}

impl PostgresJobStore {
    /// Create a store over an existing pool, capturing the current runtime
    /// handle for the sync trait bridge.
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }

    /// Create the `jobs` table and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    fn row_to_job(row: &PgRow) -> Result<Job, JobStoreError> {
        let status: String = row
            .try_get("status")
            .map_err(|e| map_sqlx_error("row.status", e))?;
        let status: JobStatus = status.parse().map_err(JobStoreError::Storage)?;

        Ok(Job {
            id: JobId::from_uuid(
                row.try_get("id").map_err(|e| map_sqlx_error("row.id", e))?,
            ),
            workspace_id: WorkspaceId::new(
                row.try_get("workspace_id")
                    .map_err(|e| map_sqlx_error("row.workspace_id", e))?,
            ),
            idempotency_key: row
                .try_get("idempotency_key")
                .map_err(|e| map_sqlx_error("row.idempotency_key", e))?,
            input: row
                .try_get("input")
                .map_err(|e| map_sqlx_error("row.input", e))?,
            status,
            output: row
                .try_get("output")
                .map_err(|e| map_sqlx_error("row.output", e))?,
            retries: row
                .try_get::<i32, _>("retries")
                .map_err(|e| map_sqlx_error("row.retries", e))? as u32,
            created_at: row
                .try_get("created_at")
                .map_err(|e| map_sqlx_error("row.created_at", e))?,
            updated_at: row
                .try_get("updated_at")
                .map_err(|e| map_sqlx_error("row.updated_at", e))?,
        })
    }

    /// Statuses the current row may hold for `new_status` to rank strictly
    /// ahead.
    fn prior_statuses(new_status: JobStatus) -> Vec<String> {
        [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ]
        .iter()
        .filter(|s| s.rank() < new_status.rank())
        .map(|s| s.as_str().to_string())
        .collect()
    }
}

impl JobStore for PostgresJobStore {
    fn create(
        &self,
        workspace_id: WorkspaceId,
        input: JsonValue,
        idempotency_key: &str,
    ) -> Result<Job, JobStoreError> {
        let job = Job::new(workspace_id, input, idempotency_key);

        self.handle.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO jobs
                    (id, workspace_id, idempotency_key, input, status, retries, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(job.id.as_uuid())
            .bind(job.workspace_id.as_i64())
            .bind(&job.idempotency_key)
            .bind(&job.input)
            .bind(job.status.as_str())
            .bind(job.retries as i32)
            .bind(job.created_at)
            .bind(job.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_create_error(idempotency_key, e))?;

            Ok(job)
        })
    }

    fn find_by_idempotency(&self, idempotency_key: &str) -> Result<Option<Job>, JobStoreError> {
        self.handle.block_on(async {
            let row = sqlx::query("SELECT * FROM jobs WHERE idempotency_key = $1")
                .bind(idempotency_key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("find_by_idempotency", e))?;

            row.as_ref().map(Self::row_to_job).transpose()
        })
    }

    fn find_by_workspace(&self, workspace_id: WorkspaceId) -> Result<Vec<Job>, JobStoreError> {
        self.handle.block_on(async {
            let rows = sqlx::query(
                "SELECT * FROM jobs WHERE workspace_id = $1 \
                 ORDER BY created_at DESC, id DESC LIMIT $2",
            )
            .bind(workspace_id.as_i64())
            .bind(RECENT_JOBS_LIMIT as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_workspace", e))?;

            rows.iter().map(Self::row_to_job).collect()
        })
    }

    fn transition(
        &self,
        idempotency_key: &str,
        new_status: JobStatus,
        output: Option<JsonValue>,
        retries: Option<u32>,
    ) -> Result<Transition, JobStoreError> {
        let priors = Self::prior_statuses(new_status);

        self.handle.block_on(async {
            let affected = if priors.is_empty() {
                0
            } else {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = $2,
                        output = COALESCE($3, output),
                        retries = COALESCE($4, retries),
                        updated_at = NOW()
                    WHERE idempotency_key = $1 AND status = ANY($5)
                    "#,
                )
                .bind(idempotency_key)
                .bind(new_status.as_str())
                .bind(output)
                .bind(retries.map(|r| r as i32))
                .bind(&priors)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("transition", e))?
                .rows_affected()
            };

            if affected > 0 {
                return Ok(Transition::Applied);
            }

            // Guard matched nothing: either the key is unknown or the row is
            // already at/past the requested status.
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM jobs WHERE idempotency_key = $1")
                    .bind(idempotency_key)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("transition.check", e))?;

            match current {
                Some(current) => {
                    warn!(
                        idempotency_key,
                        current,
                        requested = %new_status,
                        "ignoring out-of-order status transition"
                    );
                    Ok(Transition::Ignored)
                }
                None => Err(JobStoreError::NotFound(idempotency_key.to_string())),
            }
        })
    }
}

fn map_create_error(idempotency_key: &str, err: sqlx::Error) -> JobStoreError {
    if let sqlx::Error::Database(db) = &err {
        // 23505: unique_violation — the idempotency key already exists.
        if db.code().as_deref() == Some("23505") {
            return JobStoreError::Conflict(idempotency_key.to_string());
        }
    }
    map_sqlx_error("create", err)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    JobStoreError::Storage(format!("{operation}: {err}"))
}
