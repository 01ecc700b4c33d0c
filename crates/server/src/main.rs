//! Binary entry point. Reads the environment (`config::AppConfig`),
//! constructs the dependency bundle described in `spec.md` §9's redesign
//! note — every background actor gets an injected bundle plus explicit
//! `start()`/`stop()` — and serves the admin HTTP surface until a shutdown
//! signal arrives, at which point every actor is stopped and drained
//! before the process exits.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use analyzer_pool::pool::{AnalyzerPool, SelectionPolicy};
use config::AppConfig;
use contracts::replica::AnalyzerKind;
use database::{DatabaseClient, DatabaseConfig, PipelineStore, ResultStore, SubjectApplicationStore, TaskStore};
use executor::{ExecutorConfig, PoolRegistry, Reaper, SystemClock, TaskExecutor, TcpReplicaTransport};
use orchestrator::PipelineOrchestrator;
use server::maintenance::{FilesystemSubjectDirResolver, MaintenanceConfig, MaintenanceRunner};
use server::{router, AppState};

fn executor_config_from(config: &config::ExecutorSettings) -> ExecutorConfig {
    let mut per_kind_timeout = BTreeMap::new();
    per_kind_timeout.insert(AnalyzerKind::Static, config.static_timeout());
    per_kind_timeout.insert(AnalyzerKind::Dynamic, config.dynamic_timeout());
    per_kind_timeout.insert(AnalyzerKind::Performance, config.performance_timeout());
    per_kind_timeout.insert(AnalyzerKind::Ai, config.ai_timeout());

    ExecutorConfig {
        poll_interval: config.poll_interval(),
        preflight_max_retries: config.preflight_max_retries,
        preflight_backoff: vec![Duration::from_secs(30), Duration::from_secs(60), Duration::from_secs(120)],
        transient_max_retries: config.transient_failure_max_retries,
        overall_task_timeout: config.task_timeout(),
        per_kind_timeout,
        // The reaper's own interval/thresholds are driven by
        // `MaintenanceRunner`, not by `TaskExecutor::run`'s loop; these
        // fields are unused in that path but kept populated so the struct
        // stays meaningful if constructed directly in a test.
        reaper_interval: Duration::from_secs(5 * 60),
        reaper_soft_threshold: Duration::from_secs(15 * 60),
        reaper_soft_cap: 3,
        reaper_hard_threshold: Duration::from_secs(2 * 60 * 60),
    }
}

fn build_pools(config: &AppConfig) -> Arc<PoolRegistry> {
    let transport = Arc::new(TcpReplicaTransport);
    let mut registry = PoolRegistry::new(transport);

    let mut register = |kind: AnalyzerKind, endpoints: &[String]| {
        let pool = Arc::new(AnalyzerPool::new(kind, SelectionPolicy::LeastLoaded));
        for endpoint in endpoints {
            pool.add_endpoint(endpoint.clone());
        }
        registry.register(pool);
    };

    register(AnalyzerKind::Static, &config.analyzer_endpoints.static_endpoints);
    register(AnalyzerKind::Dynamic, &config.analyzer_endpoints.dynamic_endpoints);
    register(AnalyzerKind::Performance, &config.analyzer_endpoints.performance_endpoints);
    register(AnalyzerKind::Ai, &config.analyzer_endpoints.ai_endpoints);

    Arc::new(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env().context("loading configuration from the environment")?;
    tracing::info!(environment = ?config.environment, "starting analysis orchestration core");

    let db = DatabaseClient::connect(DatabaseConfig {
        url: config.database_url.clone(),
        max_connections: config.database_max_connections,
    })
    .await
    .context("connecting to the database")?;
    db.migrate().await.context("running database migrations")?;

    let tasks = TaskStore::new(db.pool().clone());
    let pipelines = PipelineStore::new(db.pool().clone());
    let results = ResultStore::new(db.pool().clone(), &config.results_root);
    let subject_applications = SubjectApplicationStore::new(db.pool().clone())
        .with_grace_period_days(config.maintenance.missing_grace_period_days as i64);

    let pools = build_pools(&config);
    let executor = Arc::new(TaskExecutor::new(
        tasks.clone(),
        results.clone(),
        pools.clone(),
        executor_config_from(&config.executor),
        SystemClock,
    ));
    let reaper = Arc::new(Reaper::new(tasks.clone(), SystemClock));
    let orchestrator = Arc::new(PipelineOrchestrator::new(pipelines.clone(), tasks.clone()));

    let maintenance = Arc::new(MaintenanceRunner::new(
        reaper.clone(),
        results.clone(),
        subject_applications.clone(),
        Box::new(FilesystemSubjectDirResolver::new(&config.subjects_root)),
        MaintenanceConfig {
            reaper_soft_threshold: config.maintenance.reaper_soft_threshold(),
            reaper_soft_cap: config.maintenance.reaper_soft_cap,
            reaper_hard_threshold: config.maintenance.reaper_hard_threshold(),
            reaper_interval: config.maintenance.reaper_interval(),
            reconciliation_interval: config.maintenance.reconciliation_interval(),
        },
    ));

    let state = Arc::new(AppState {
        tasks,
        pipelines,
        results,
        subject_applications,
        pools,
        executor: executor.clone(),
        reaper: reaper.clone(),
        orchestrator: orchestrator.clone(),
        maintenance: maintenance.clone(),
    });

    let executor_handle = tokio::spawn({
        let executor = executor.clone();
        async move { executor.run().await }
    });
    let orchestrator_handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run().await }
    });
    let reaper_handle = tokio::spawn({
        let maintenance = maintenance.clone();
        async move { maintenance.run_reaper_loop().await }
    });
    let reconciliation_handle = tokio::spawn({
        let maintenance = maintenance.clone();
        async move { maintenance.run_reconciliation_loop().await }
    });

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding admin HTTP surface to {addr}"))?;
    tracing::info!(%addr, "admin HTTP surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving the admin HTTP surface")?;

    tracing::info!("shutdown signal received, draining background actors");
    executor.stop();
    orchestrator.stop();
    maintenance.stop();

    for handle in [executor_handle, orchestrator_handle, reaper_handle, reconciliation_handle] {
        let _ = handle.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
