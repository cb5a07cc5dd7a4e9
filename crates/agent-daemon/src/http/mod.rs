// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The inbound control surface (§6): one axum [`Router`] mounted under
//! the configured prefix, with CORS/timeout/trace/compression layers
//! grounded on the pack's axum-based services.

pub mod handlers;

use crate::config::Config;
use crate::state::AppState;
use agent_core::Clock;
use agent_egress::EgressTransport;
use agent_pool::WorkerBackend;
use axum::routing::{get, post, put};
use axum::Router;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub fn router<B, T, C>(config: &Config, state: AppState<B, T, C>) -> Router
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    let routes = Router::new()
        .route("/start", post(handlers::start))
        .route("/local-agent/status", get(handlers::status))
        .route("/sessions/", post(handlers::upsert_session).put(handlers::upsert_session))
        .route("/:execution_id/update-status", post(handlers::update_status))
        .route("/:execution_id/update-stepcount", put(handlers::update_stepcount))
        .route("/:execution_id/upload-screenshots", post(handlers::upload_screenshots))
        .route("/:execution_id/take-screenshot", post(handlers::take_screenshot))
        .route("/:execution_id/upload-video", post(handlers::upload_video))
        .route("/local-agent/network-logs", post(handlers::network_logs))
        .with_state(state);

    let cors = if config.cors_allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    Router::new()
        .nest(&config.prefix, routes)
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(cors)
        .layer(CompressionLayer::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{CircuitConfig, FakeClock};
    use agent_egress::{ArtifactUploader, BackoffConfig, BatchConfig, BatchWriter, CircuitBreakerRegistry, FakeTransport};
    use agent_pool::{FakeBackend, PoolConfig, WorkerPool};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn router_builds_with_every_route_mounted() {
        let backend = std::sync::Arc::new(FakeBackend::new());
        let pool = WorkerPool::new(
            backend,
            FakeClock::default(),
            PoolConfig {
                max_size: 1,
                pre_warm: 0,
                pre_warm_mix: (1, 0, 0),
                stale_after: StdDuration::from_secs(300),
                sweep_interval: StdDuration::from_secs(60),
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

        let state = AppState {
            orchestrator,
            pool,
            uploader,
            batch,
            sessions: crate::session_registry::SessionRegistry::new(),
            clock: FakeClock::default(),
            artifacts_dir: std::env::temp_dir(),
            started_at: std::time::Instant::now(),
        };

        let config = Config::default();
        let _router = router(&config, state);
    }
}
