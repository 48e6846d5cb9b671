use std::sync::Arc;

use anyhow::Context;

use codehive_api::app::{build_app, AppServices, SharedStore};
use codehive_api::directory::InMemoryWorkspaceDirectory;
use codehive_collab::CollabHub;
use codehive_jobs::{
    Dispatcher, ExecutionWorker, InMemoryJobStore, JobQueue, MockRuntime, RetryPolicy, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    codehive_observability::init();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let worker_count: usize = std::env::var("WORKER_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2);

    let store = build_store().await?;
    let queue = Arc::new(JobQueue::new(RetryPolicy::default()));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), queue.clone()));

    let mut workers = Vec::with_capacity(worker_count);
    for i in 0..worker_count {
        let worker = ExecutionWorker::new(store.clone(), queue.clone(), MockRuntime::default());
        workers.push(worker.spawn(
            WorkerConfig::default().with_name(format!("execution-worker-{i}")),
        ));
    }

    let directory = InMemoryWorkspaceDirectory::from_env_list(
        &std::env::var("WORKSPACE_IDS").unwrap_or_else(|_| "1".to_string()),
    );
    let services = AppServices::new(
        dispatcher,
        Arc::new(CollabHub::new()),
        Arc::new(directory),
    );

    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{port}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;

    for handle in workers {
        handle.shutdown();
    }

    Ok(())
}

#[cfg(feature = "postgres")]
async fn build_store() -> anyhow::Result<SharedStore> {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if !use_persistent {
        let store: SharedStore = InMemoryJobStore::arc();
        return Ok(store);
    }

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
    let pool = sqlx::PgPool::connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = codehive_jobs::PostgresJobStore::new(pool, tokio::runtime::Handle::current());
    store
        .ensure_schema()
        .await
        .context("failed to ensure jobs schema")?;

    let store: SharedStore = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "postgres"))]
async fn build_store() -> anyhow::Result<SharedStore> {
    if std::env::var("USE_PERSISTENT_STORES").as_deref() == Ok("true") {
        tracing::warn!(
            "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
        );
    }
    let store: SharedStore = InMemoryJobStore::arc();
    Ok(store)
}
