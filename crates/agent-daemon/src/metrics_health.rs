// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The metrics/health listener (§6): a second, separate axum server
//! exposing `/health`, `/metrics`, and `/ready`, kept apart from the
//! control surface so a slow control-plane client can never starve an
//! operator's health probe.

use crate::state::AppState;
use agent_core::Clock;
use agent_egress::EgressTransport;
use agent_pool::WorkerBackend;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub struct MetricsState<B, T, C> {
    pub app: AppState<B, T, C>,
    pub prometheus: PrometheusHandle,
}

impl<B, T, C> Clone for MetricsState<B, T, C>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    fn clone(&self) -> Self {
        Self { app: self.app.clone(), prometheus: self.prometheus.clone() }
    }
}

#[derive(Debug, Deserialize)]
pub struct DetailedQuery {
    #[serde(default)]
    detailed: bool,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    healthy: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
pub struct DetailedHealth {
    healthy: bool,
    components: HashMap<String, ComponentHealth>,
}

async fn health<B, T, C>(
    State(state): State<MetricsState<B, T, C>>,
    Query(query): Query<DetailedQuery>,
) -> impl IntoResponse
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    let stats = state.app.pool.stats();
    let healthy = !stats.degraded;
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    if !query.detailed {
        return (status, ()).into_response();
    }

    let mut components = HashMap::new();
    components.insert(
        "worker_pool".to_string(),
        ComponentHealth {
            healthy,
            detail: format!("available={} in_use={}", stats.available, stats.in_use),
        },
    );
    components.insert(
        "intake_queue".to_string(),
        ComponentHealth { healthy: true, detail: format!("queue_size={}", state.app.orchestrator.queue_size()) },
    );

    (status, Json(DetailedHealth { healthy, components })).into_response()
}

async fn ready<B, T, C>(State(state): State<MetricsState<B, T, C>>) -> StatusCode
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    if state.app.pool.is_pre_warmed() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics<B, T, C>(State(state): State<MetricsState<B, T, C>>) -> String
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    state.prometheus.render()
}

pub fn router<B, T, C>(state: MetricsState<B, T, C>) -> Router
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{CircuitConfig, FakeClock};
    use agent_egress::{ArtifactUploader, BackoffConfig, BatchConfig, BatchWriter, CircuitBreakerRegistry, FakeTransport};
    use agent_pool::{FakeBackend, PoolConfig, WorkerPool};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::time::Duration;

    #[tokio::test]
    async fn router_builds_with_health_ready_metrics_routes() {
        let backend = std::sync::Arc::new(FakeBackend::new());
        let pool = WorkerPool::new(
            backend,
            FakeClock::default(),
            PoolConfig {
                max_size: 1,
                pre_warm: 0,
                pre_warm_mix: (1, 0, 0),
                stale_after: Duration::from_secs(300),
                sweep_interval: Duration::from_secs(60),
            },
        )
        .await
        .unwrap();
        let transport = std::sync::Arc::new(FakeTransport::new());
        let breaker = std::sync::Arc::new(CircuitBreakerRegistry::new(FakeClock::default(), CircuitConfig::default()));
        let batch = std::sync::Arc::new(BatchWriter::start(
            transport.clone(),
            breaker.clone(),
            "http://ctrl/sessions",
            BatchConfig::default(),
            FakeClock::default(),
        ));
        let uploader = std::sync::Arc::new(ArtifactUploader::new(
            transport,
            breaker,
            "http://ctrl/artifacts",
            BackoffConfig::default(),
        ));
        let orchestrator = agent_engine::Orchestrator::new(pool.clone(), uploader.clone(), batch.clone(), FakeClock::default(), 4);

        let app = AppState {
            orchestrator,
            pool,
            uploader,
            batch,
            sessions: crate::session_registry::SessionRegistry::new(),
            clock: FakeClock::default(),
            artifacts_dir: std::env::temp_dir(),
            started_at: std::time::Instant::now(),
        };

        // `.build()` hands back a standalone recorder/handle pair without
        // installing a process-global recorder, so this is safe to call
        // from more than one test in the same binary.
        let (_recorder, prometheus) = PrometheusBuilder::new().build().unwrap();
        let state = MetricsState { app, prometheus };
        let _router = router(state);
    }
}
