// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend abstraction: how a [`Worker`] is actually launched, health
//! checked, and destroyed. `WorkerPool` is generic over this trait so the
//! same pool logic runs against containers or in-process browsers.

use agent_core::{Worker, WorkerKind};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("launch failed: {0}")]
    LaunchFailed(String),
    #[error("health check failed: {0}")]
    HealthCheckFailed(String),
    #[error("destroy failed: {0}")]
    DestroyFailed(String),
    #[error("reset failed: {0}")]
    ResetFailed(String),
    #[error("backend runtime unavailable: {0}")]
    Unavailable(String),
}

/// How workers of a given kind are created, probed, and torn down.
/// Implementations: [`crate::container::ContainerBackend`] (bollard,
/// one browser per Docker container) and
/// [`crate::inprocess::InProcessBackend`] (chromiumoxide, no container).
#[async_trait]
pub trait WorkerBackend: Send + Sync + 'static {
    /// Launch a new worker of `kind`, optionally pinned to `version`
    /// (e.g. a browser build or image tag). `None` means "whatever this
    /// backend launches by default". Returns `Unavailable` immediately
    /// (never retried by the caller) when the underlying runtime cannot
    /// be reached at all, putting the pool into degraded mode.
    async fn launch(&self, kind: WorkerKind, version: Option<&str>) -> Result<Worker, BackendError>;

    /// A cheap round trip: container inspect-and-running, or evaluating
    /// a trivial expression in-process.
    async fn health_check(&self, worker: &Worker) -> Result<bool, BackendError>;

    /// Reset per-job state (cookies, navigate to blank page) before the
    /// worker is returned to the free list.
    async fn reset(&self, worker: &Worker) -> Result<(), BackendError>;

    /// Tear the worker down. Failures are logged and swallowed by the
    /// caller (§4.A Failures) — this method still reports them so the
    /// pool can log before dropping the worker from tracking.
    async fn destroy(&self, worker: Worker) -> Result<(), BackendError>;

    /// Whether this backend's underlying runtime is reachable at all.
    /// Checked once at pool construction; `false` puts the pool into
    /// degraded mode for its whole lifetime.
    async fn is_available(&self) -> bool;
}
