// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WorkerPool: lease/return browser workers, pre-warm on construction,
//! health-check on acquire and on a periodic sweep, reclaim stale leases.
//!
//! Grounded on the free-list/leased-map split and staggered health-check
//! task shape of a Chrome instance pool, generalised to multiple worker
//! kinds and an injectable backend.

use agent_core::{Clock, Worker, WorkerId, WorkerKind, WorkerStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, WorkerBackend};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("timed out waiting for a worker")]
    Timeout,
    #[error("pool exhausted at max_size")]
    Exhausted,
    #[error("pool is unavailable (degraded mode)")]
    Unavailable,
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("invalid pool config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub available: usize,
    pub in_use: usize,
    pub by_kind: HashMap<WorkerKind, (usize, usize)>,
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: usize,
    pub pre_warm: usize,
    /// Relative mix used while pre-warming, e.g. (3, 2, 1) for
    /// chromium:firefox:webkit.
    pub pre_warm_mix: (u32, u32, u32),
    pub stale_after: Duration,
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            pre_warm: 3,
            pre_warm_mix: (3, 2, 1),
            stale_after: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.pre_warm > self.max_size {
            return Err(PoolError::InvalidConfig(
                "pre_warm must not exceed max_size".into(),
            ));
        }
        Ok(())
    }
}

struct Inner {
    free: Mutex<VecDeque<Worker>>,
    leased: Mutex<HashMap<WorkerId, Worker>>,
    size: AtomicU32,
    degraded: AtomicBool,
    shutting_down: AtomicBool,
    pre_warmed: AtomicBool,
}

/// Lease/return pool of browser workers of mixed kinds, backed by an
/// injectable [`WorkerBackend`].
pub struct WorkerPool<B, C> {
    backend: Arc<B>,
    clock: C,
    config: PoolConfig,
    inner: Arc<Inner>,
    free_notify: Arc<Notify>,
}

impl<B, C> WorkerPool<B, C>
where
    B: WorkerBackend,
    C: Clock,
{
    /// Construct the pool and kick off asynchronous pre-warm. Returns
    /// immediately in degraded mode (never an error) if the backend's
    /// runtime is unreachable, per §4.A Degraded mode.
    pub async fn new(backend: Arc<B>, clock: C, config: PoolConfig) -> Result<Arc<Self>, PoolError> {
        config.validate()?;
        let available = backend.is_available().await;
        let inner = Arc::new(Inner {
            free: Mutex::new(VecDeque::new()),
            leased: Mutex::new(HashMap::new()),
            size: AtomicU32::new(0),
            degraded: AtomicBool::new(!available),
            shutting_down: AtomicBool::new(false),
            pre_warmed: AtomicBool::new(!available),
        });
        let pool = Arc::new(Self {
            backend,
            clock,
            config,
            inner,
            free_notify: Arc::new(Notify::new()),
        });

        if available {
            pool.clone().spawn_pre_warm();
            pool.clone().spawn_sweep();
        } else {
            warn!("worker pool backend unavailable at startup; entering degraded mode");
        }

        Ok(pool)
    }

    fn spawn_pre_warm(self: Arc<Self>) {
        tokio::spawn(async move {
            let mix = kind_sequence(self.config.pre_warm_mix, self.config.pre_warm);
            for kind in mix {
                if self.inner.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                if self.inner.size.load(Ordering::SeqCst) as usize >= self.config.max_size {
                    break;
                }
                match self.backend.launch(kind, None).await {
                    Ok(mut worker) => {
                        worker.status = WorkerStatus::Ready;
                        self.inner.size.fetch_add(1, Ordering::SeqCst);
                        self.inner.free.lock().push_back(worker);
                        self.free_notify.notify_one();
                    }
                    Err(e) => {
                        warn!(error = %e, "pre-warm launch failed, will retry on next acquire");
                    }
                }
            }
            self.inner.pre_warmed.store(true, Ordering::SeqCst);
        });
    }

    fn spawn_sweep(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.sweep_interval);
            loop {
                ticker.tick().await;
                if self.inner.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                self.reclaim_stale().await;
            }
        });
    }

    async fn reclaim_stale(&self) {
        let now = self.clock.now();
        let stale: Vec<Worker> = {
            let mut leased = self.inner.leased.lock();
            let stale_ids: Vec<WorkerId> = leased
                .iter()
                .filter(|(_, w)| {
                    !w.in_use()
                        && now
                            .signed_duration_since(w.last_used)
                            .to_std()
                            .map(|d| d > self.config.stale_after)
                            .unwrap_or(false)
                })
                .map(|(id, _)| id.clone())
                .collect();
            stale_ids.into_iter().filter_map(|id| leased.remove(&id)).collect()
        };
        for worker in stale {
            debug!(worker_id = %worker.worker_id, "reclaiming stale worker");
            self.destroy_worker(worker).await;
        }
    }

    async fn destroy_worker(&self, worker: Worker) {
        self.inner.size.fetch_sub(1, Ordering::SeqCst);
        if let Err(e) = self.backend.destroy(worker).await {
            warn!(error = %e, "worker destroy failed; dropping from tracking anyway");
        }
    }

    /// §4.A acquire contract. `version`, when set, pins the leased worker
    /// to a specific build/image tag; `None` accepts whatever the free
    /// list or backend default launches.
    pub async fn acquire(
        &self,
        kind: WorkerKind,
        version: Option<&str>,
        deadline: Duration,
    ) -> Result<Worker, PoolError> {
        if self.inner.degraded.load(Ordering::SeqCst) {
            return Err(PoolError::Unavailable);
        }
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(PoolError::Unavailable);
        }

        let started = self.clock.now();
        loop {
            if let Some(worker) = self.try_take_from_free(kind, version).await {
                return Ok(worker);
            }

            if (self.inner.size.load(Ordering::SeqCst) as usize) < self.config.max_size {
                match self.backend.launch(kind, version).await {
                    Ok(mut worker) => {
                        worker.status = WorkerStatus::Leased;
                        self.inner.size.fetch_add(1, Ordering::SeqCst);
                        self.inner.leased.lock().insert(worker.worker_id.clone(), worker.clone());
                        return Ok(worker);
                    }
                    Err(e) => {
                        warn!(error = %e, "on-demand worker launch failed");
                    }
                }
            }
            // Pool at capacity or the on-demand launch above failed: fall
            // through and wait for a worker to free up rather than
            // rejecting immediately — only a deadline miss is `Timeout`.

            let elapsed = self
                .clock
                .now()
                .signed_duration_since(started)
                .to_std()
                .unwrap_or_default();
            if elapsed >= deadline {
                return Err(PoolError::Timeout);
            }
            tokio::select! {
                _ = self.free_notify.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
        }
    }

    /// Pop the free-list head; if it's the wrong kind, the wrong version
    /// (when one is requested), or unhealthy, destroy it and retry exactly
    /// once more from the list (§4.A).
    async fn try_take_from_free(&self, kind: WorkerKind, version: Option<&str>) -> Option<Worker> {
        for _attempt in 0..2 {
            let candidate = self.inner.free.lock().pop_front();
            let Some(mut worker) = candidate else {
                return None;
            };
            let version_matches = version.map(|v| worker.version == v).unwrap_or(true);
            if worker.kind != kind || !version_matches {
                self.destroy_worker(worker).await;
                continue;
            }
            match self.backend.health_check(&worker).await {
                Ok(true) => {
                    worker.status = WorkerStatus::Leased;
                    worker.healthy = true;
                    self.inner.leased.lock().insert(worker.worker_id.clone(), worker.clone());
                    return Some(worker);
                }
                _ => {
                    self.destroy_worker(worker).await;
                    continue;
                }
            }
        }
        None
    }

    /// §4.A release contract.
    pub async fn release(&self, mut worker: Worker) {
        worker.last_used = self.clock.now();
        self.inner.leased.lock().remove(&worker.worker_id);

        if self.inner.shutting_down.load(Ordering::SeqCst)
            || self.inner.free.lock().len() + self.inner.leased.lock().len() >= self.config.max_size
        {
            self.destroy_worker(worker).await;
            return;
        }

        if let Err(e) = self.backend.reset(&worker).await {
            warn!(error = %e, "worker reset on release failed, destroying instead");
            self.destroy_worker(worker).await;
            return;
        }

        worker.status = WorkerStatus::Ready;
        self.inner.free.lock().push_back(worker);
        self.free_notify.notify_one();
    }

    /// Destroy `worker` immediately instead of returning it to the free
    /// list. Used when the worker was killed forcefully and may be left
    /// in a bad state (e.g. a SIGKILL escalation during job shutdown).
    pub async fn discard(&self, mut worker: Worker) {
        worker.last_used = self.clock.now();
        self.inner.leased.lock().remove(&worker.worker_id);
        self.destroy_worker(worker).await;
    }

    /// True once the startup pre-warm batch has finished launching (or
    /// immediately, if the pool started in degraded mode). Used by the
    /// readiness probe so callers don't route jobs at a pool with no
    /// warm workers yet.
    pub fn is_pre_warmed(&self) -> bool {
        self.inner.pre_warmed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        if self.inner.degraded.load(Ordering::SeqCst) {
            return PoolStats {
                degraded: true,
                ..Default::default()
            };
        }
        let free = self.inner.free.lock();
        let leased = self.inner.leased.lock();
        let mut by_kind: HashMap<WorkerKind, (usize, usize)> = HashMap::new();
        for w in free.iter() {
            by_kind.entry(w.kind).or_default().0 += 1;
        }
        for w in leased.values() {
            by_kind.entry(w.kind).or_default().1 += 1;
        }
        PoolStats {
            available: free.len(),
            in_use: leased.len(),
            by_kind,
            degraded: false,
        }
    }

    /// §4.A shutdown contract: stop accepting acquires, destroy free
    /// workers immediately, destroy leased workers after `deadline`.
    pub async fn shutdown(&self, deadline: Duration) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        if self.inner.degraded.load(Ordering::SeqCst) {
            return;
        }

        let free: Vec<Worker> = self.inner.free.lock().drain(..).collect();
        for worker in free {
            self.destroy_worker(worker).await;
        }

        tokio::time::sleep(deadline).await;

        let leased: Vec<Worker> = self.inner.leased.lock().drain().map(|(_, w)| w).collect();
        for worker in leased {
            self.destroy_worker(worker).await;
        }
        info!("worker pool shutdown complete");
    }
}

/// Build a sequence of `count` kinds following `mix` ratios, truncating
/// when `count` is not a multiple of the ratio sum.
fn kind_sequence(mix: (u32, u32, u32), count: usize) -> Vec<WorkerKind> {
    let (c, f, w) = mix;
    let total = (c + f + w).max(1);
    let mut out = Vec::with_capacity(count);
    let mut i: u32 = 0;
    while out.len() < count {
        let slot = i % total;
        if slot < c {
            out.push(WorkerKind::Chromium);
        } else if slot < c + f {
            out.push(WorkerKind::Firefox);
        } else {
            out.push(WorkerKind::Webkit);
        }
        i += 1;
    }
    out
}
