// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`WorkerBackend`] used by this crate's own tests and by
//! downstream crates under the `test-support` feature.

use crate::backend::{BackendError, WorkerBackend};
use agent_core::{Worker, WorkerKind, WorkerTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct FakeBackend {
    launched: AtomicUsize,
    destroyed: AtomicUsize,
    available: AtomicBool,
    unhealthy: Mutex<HashSet<String>>,
    fail_launch: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            launched: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            unhealthy: Mutex::new(HashSet::new()),
            fail_launch: AtomicBool::new(false),
        }
    }

    pub fn unavailable() -> Self {
        let backend = Self::new();
        backend.available.store(false, Ordering::SeqCst);
        backend
    }

    pub fn mark_unhealthy(&self, container_id: &str) {
        self.unhealthy.lock().insert(container_id.to_string());
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub fn launched_count(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerBackend for FakeBackend {
    async fn launch(&self, kind: WorkerKind, version: Option<&str>) -> Result<Worker, BackendError> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(BackendError::LaunchFailed("fake launch failure".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Worker::new(
            kind,
            version.unwrap_or("fake"),
            WorkerTransport::Container {
                container_id: id,
                rpc_url: "ws://fake".into(),
            },
            chrono::Utc::now(),
        ))
    }

    async fn health_check(&self, worker: &Worker) -> Result<bool, BackendError> {
        let WorkerTransport::Container { container_id, .. } = &worker.transport else {
            return Ok(true);
        };
        Ok(!self.unhealthy.lock().contains(container_id))
    }

    async fn reset(&self, _worker: &Worker) -> Result<(), BackendError> {
        Ok(())
    }

    async fn destroy(&self, _worker: Worker) -> Result<(), BackendError> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

pub fn shared_fake_backend() -> Arc<FakeBackend> {
    Arc::new(FakeBackend::new())
}
