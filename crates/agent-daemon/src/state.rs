// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state handed to every HTTP handler: the wired-up
//! orchestrator, pool, and egress components plus the bits of config the
//! handlers need directly.

use crate::session_registry::SessionRegistry;
use agent_core::Clock;
use agent_egress::{ArtifactUploader, BatchWriter, EgressTransport};
use agent_engine::Orchestrator;
use agent_pool::{WorkerBackend, WorkerPool};
use std::path::PathBuf;
use std::sync::Arc;

pub struct AppState<B, T, C> {
    pub orchestrator: Arc<Orchestrator<B, T, C>>,
    pub pool: Arc<WorkerPool<B, C>>,
    pub uploader: Arc<ArtifactUploader<T, C>>,
    pub batch: Arc<BatchWriter<T, C>>,
    pub sessions: SessionRegistry,
    pub clock: C,
    pub artifacts_dir: PathBuf,
    pub started_at: std::time::Instant,
}

impl<B, T, C> Clone for AppState<B, T, C>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            pool: self.pool.clone(),
            uploader: self.uploader.clone(),
            batch: self.batch.clone(),
            sessions: self.sessions.clone(),
            clock: self.clock.clone(),
            artifacts_dir: self.artifacts_dir.clone(),
            started_at: self.started_at,
        }
    }
}
