// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! agentd: the local execution agent daemon. Wires the worker pool,
//! execution engine, and egress pipeline into a running process behind
//! an HTTP control surface, with a graceful shutdown coordinator.

use agent_core::{CircuitConfig, SystemClock};
use agent_daemon::config::{Config, WorkerBackendKind};
use agent_daemon::session_registry::SessionRegistry;
use agent_daemon::state::AppState;
use agent_daemon::{http, logging, metrics_health, shutdown};
use agent_egress::{ArtifactUploader, BackoffConfig, BatchConfig, BatchWriter, CircuitBreakerRegistry, ReqwestTransport};
use agent_engine::{CancelReason, Orchestrator};
use agent_pool::{ContainerBackend, InProcessBackend, PoolConfig, WorkerBackend, WorkerPool};
use agent_storage::Snapshot;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::env::var("AGENT_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/etc/agent/config.json"))
        });

    let config = Config::load(&config_path)?;
    let _log_guard = logging::init(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %config_path.display(),
        backend = ?config.backend.kind,
        "starting agentd"
    );

    if let Some(previous) = Snapshot::load(&config.snapshot_path)? {
        info!(
            shutdown_reason = %previous.shutdown_reason,
            active_sessions = previous.active_sessions.len(),
            pending_jobs = previous.pending_jobs.len(),
            "found snapshot from previous run (informational only)"
        );
    }

    match config.backend.kind {
        WorkerBackendKind::Container => {
            let backend = Arc::new(ContainerBackend::connect_local(config.backend.container_rpc_port)?);
            run_with_backend(config, backend).await
        }
        WorkerBackendKind::InProcess => {
            let backend = Arc::new(InProcessBackend::new(config.backend.headless));
            run_with_backend(config, backend).await
        }
    }
}

async fn run_with_backend<B>(config: Config, backend: Arc<B>) -> Result<(), Box<dyn std::error::Error>>
where
    B: WorkerBackend,
{
    let clock = SystemClock;

    let pool = WorkerPool::new(
        backend,
        clock,
        PoolConfig {
            max_size: config.pool.max_size,
            pre_warm: config.pool.pre_warm,
            pre_warm_mix: config.pool.pre_warm_mix,
            stale_after: std::time::Duration::from_secs(config.pool.stale_after_secs),
            sweep_interval: std::time::Duration::from_secs(config.pool.sweep_interval_secs),
        },
    )
    .await?;

    let transport = Arc::new(ReqwestTransport::new());
    let breaker = Arc::new(CircuitBreakerRegistry::new(
        clock,
        CircuitConfig {
            failure_threshold: config.circuit_breaker.failure_threshold,
            success_threshold: config.circuit_breaker.success_threshold,
            open_timeout: std::time::Duration::from_secs(config.circuit_breaker.open_timeout_secs),
        },
    ));

    let batch = Arc::new(BatchWriter::start(
        transport.clone(),
        breaker.clone(),
        config.artifacts.sessions_endpoint.clone(),
        BatchConfig {
            max_size: config.batch.max_size,
            flush_interval: std::time::Duration::from_millis(config.batch.flush_interval_ms),
            overflow_soft_cap: config.batch.overflow_soft_cap,
            backoff: BackoffConfig::default(),
        },
        clock,
    ));

    let uploader = Arc::new(ArtifactUploader::new(
        transport,
        breaker,
        config.artifacts.upload_endpoint.clone(),
        BackoffConfig::default(),
    ));

    let orchestrator = Orchestrator::new(pool.clone(), uploader.clone(), batch.clone(), clock, config.queue_size);
    let worker_handles = orchestrator.spawn_workers(config.parallelism.max(1));

    let app_state = AppState {
        orchestrator: orchestrator.clone(),
        pool: pool.clone(),
        uploader: uploader.clone(),
        batch: batch.clone(),
        sessions: SessionRegistry::new(),
        clock,
        artifacts_dir: config.artifacts.working_dir.clone(),
        started_at: Instant::now(),
    };

    let prometheus = PrometheusBuilder::new().install_recorder()?;
    let metrics_state = metrics_health::MetricsState { app: app_state.clone(), prometheus };

    let control_listener = tokio::net::TcpListener::bind(config.listen).await?;
    let metrics_listener = tokio::net::TcpListener::bind(config.metrics_listen).await?;

    info!(control_plane = %config.listen, metrics = %config.metrics_listen, "listeners bound");

    let control_router = http::router(&config, app_state.clone());
    let metrics_router = metrics_health::router(metrics_state);

    let coordinator = shutdown::ShutdownCoordinator::new(config.per_handler_deadline());
    coordinator.listen_for_signals();

    register_standard_handlers(
        &coordinator,
        orchestrator.clone(),
        pool.clone(),
        batch.clone(),
        app_state.sessions.clone(),
        worker_handles,
        &config,
    );

    let control_shutdown = coordinator.clone();
    let control_server = axum::serve(control_listener, control_router)
        .with_graceful_shutdown(async move {
            while !control_shutdown.is_shutting_down() {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        });

    let metrics_shutdown = coordinator.clone();
    let metrics_server = axum::serve(metrics_listener, metrics_router).with_graceful_shutdown(async move {
        while !metrics_shutdown.is_shutting_down() {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    });

    let (control_result, metrics_result) = tokio::join!(control_server, metrics_server);
    if let Err(e) = control_result {
        error!(error = %e, "control-plane HTTP server exited with an error");
    }
    if let Err(e) = metrics_result {
        error!(error = %e, "metrics HTTP server exited with an error");
    }

    info!("agentd shutdown complete");
    Ok(())
}

fn register_standard_handlers<B, T, C>(
    coordinator: &Arc<shutdown::ShutdownCoordinator>,
    orchestrator: Arc<Orchestrator<B, T, C>>,
    pool: Arc<WorkerPool<B, C>>,
    batch: Arc<BatchWriter<T, C>>,
    sessions: SessionRegistry,
    worker_handles: Vec<tokio::task::JoinHandle<()>>,
    config: &Config,
) where
    B: WorkerBackend,
    T: agent_egress::EgressTransport,
    C: agent_core::Clock,
{
    // 1. External-notification: nothing registers this agent with a load
    // balancer today, so this is a logging placeholder kept at the front
    // of the chain per §4.E's registration order.
    coordinator.register(
        "external-notification",
        Box::new(|| {
            Box::pin(async {
                info!("no external notifier configured, skipping deregistration");
                Ok(())
            })
        }),
    );

    // 2. Artifact Uploader: in-flight uploads are awaited synchronously by
    // the HTTP handler that started them, so there is no background
    // queue to drain here — this handler only marks the point in the
    // LIFO chain where uploads are considered settled.
    coordinator.register(
        "artifact-uploader",
        Box::new(|| Box::pin(async { Ok(()) })),
    );

    // 3. Batch Writer: flush pending batches.
    let batch_for_shutdown = batch.clone();
    coordinator.register(
        "batch-writer",
        Box::new(move || {
            let batch = batch_for_shutdown.clone();
            Box::pin(async move {
                batch.close().await;
                Ok(())
            })
        }),
    );

    // 4. Session Recorder: no standalone recording component exists in
    // this codebase — the driver owns video/trace recording and reports
    // completion via its own artifact files. Kept as a no-op so the
    // registration order matches §4.E exactly.
    coordinator.register("session-recorder", Box::new(|| Box::pin(async { Ok(()) })));

    // 5. Tunnel Service: out of scope (§9 design note).
    coordinator.register("tunnel-service", Box::new(|| Box::pin(async { Ok(()) })));

    // 6. Orchestrator: stop accepting new jobs, cancel every in-flight
    // execution so its driver gets SIGINT'd instead of running to its own
    // completion, then wait for the worker loops up to the shutdown budget.
    let shutdown_budget = config.shutdown_budget();
    let worker_handles = Arc::new(parking_lot::Mutex::new(Some(worker_handles)));
    let orchestrator_for_shutdown = orchestrator.clone();
    coordinator.register(
        "orchestrator",
        Box::new(move || {
            let orchestrator = orchestrator_for_shutdown.clone();
            let worker_handles = worker_handles.clone();
            Box::pin(async move {
                orchestrator.stop_intake();
                for execution_id in orchestrator.in_flight_execution_ids() {
                    orchestrator.cancel(&execution_id, CancelReason::Shutdown);
                }
                let handles = worker_handles.lock().take().unwrap_or_default();
                let drain = futures::future::join_all(handles);
                match tokio::time::timeout(shutdown_budget, drain).await {
                    Ok(_) => Ok(()),
                    Err(_) => Err("worker loops did not drain within the shutdown budget".to_string()),
                }
            })
        }),
    );

    // 7. Worker Pool: destroy free workers now, leased workers after the
    // orchestrator drain above has had a chance to return them.
    let pool_for_shutdown = pool.clone();
    coordinator.register(
        "worker-pool",
        Box::new(move || {
            let pool = pool_for_shutdown.clone();
            Box::pin(async move {
                pool.shutdown(std::time::Duration::from_secs(1)).await;
                Ok(())
            })
        }),
    );

    // 8. HTTP server: stopping accepting connections happens via
    // `is_shutting_down()` gating the `with_graceful_shutdown` futures in
    // `run_with_backend`; nothing further to do here beyond logging.
    coordinator.register("http-server", Box::new(|| Box::pin(async { Ok(()) })));

    // 9. State snapshot: persist active-session list and pending-job list.
    let snapshot_path = config.snapshot_path.clone();
    let orchestrator_for_snapshot = orchestrator;
    coordinator.register(
        "state-snapshot",
        Box::new(move || {
            let snapshot_path = snapshot_path.clone();
            let orchestrator = orchestrator_for_snapshot.clone();
            let sessions = sessions.clone();
            Box::pin(async move {
                let mut snapshot = Snapshot::new(chrono::Utc::now(), "graceful_shutdown");
                snapshot.active_sessions = sessions.active_sessions();
                snapshot.pending_jobs = orchestrator
                    .in_flight_execution_ids()
                    .into_iter()
                    .map(|execution_id| agent_storage::PendingJobRecord {
                        job_id: agent_core::JobId::new(execution_id.as_str()),
                        execution_id: Some(execution_id),
                    })
                    .collect();
                snapshot
                    .save(&snapshot_path)
                    .map_err(|e| e.to_string())?;
                Ok(())
            })
        }),
    );
}
