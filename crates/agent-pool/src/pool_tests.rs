// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{FakeBackend, PoolConfig, WorkerPool};
use agent_core::{FakeClock, WorkerKind};
use std::sync::Arc;
use std::time::Duration;

fn config(max_size: usize, pre_warm: usize) -> PoolConfig {
    PoolConfig {
        max_size,
        pre_warm,
        pre_warm_mix: (1, 0, 0),
        stale_after: Duration::from_secs(300),
        sweep_interval: Duration::from_secs(60),
    }
}

#[tokio::test]
async fn acquire_and_release_keeps_capacity_invariant() {
    let backend = Arc::new(FakeBackend::new());
    let clock = FakeClock::default();
    let pool = Arc::new(
        WorkerPool::new(backend, clock.clone(), config(2, 0))
            .await
            .unwrap(),
    );

    let w1 = pool.acquire(WorkerKind::Chromium, None, Duration::from_secs(1)).await.unwrap();
    let w2 = pool.acquire(WorkerKind::Chromium, None, Duration::from_secs(1)).await.unwrap();
    let stats = pool.stats();
    assert_eq!(stats.available + stats.in_use, 2);

    // The pool is at capacity, so this `acquire` waits in the free-notify
    // / poll loop until its deadline elapses on the injected clock; drive
    // that clock forward from outside instead of sleeping real time.
    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(WorkerKind::Chromium, None, Duration::from_millis(50)).await }
    });
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        clock.advance(Duration::from_millis(20));
    }
    assert!(matches!(waiter.await.unwrap(), Err(crate::PoolError::Timeout)));

    pool.release(w1).await;
    pool.release(w2).await;
    let stats = pool.stats();
    assert_eq!(stats.available, 2);
    assert_eq!(stats.in_use, 0);
}

#[tokio::test]
async fn unavailable_backend_enters_degraded_mode() {
    let backend = Arc::new(FakeBackend::unavailable());
    let pool = WorkerPool::new(backend, FakeClock::default(), config(2, 0))
        .await
        .unwrap();

    let stats = pool.stats();
    assert!(stats.degraded);
    assert!(matches!(
        pool.acquire(WorkerKind::Chromium, None, Duration::from_millis(10)).await,
        Err(crate::PoolError::Unavailable)
    ));
}

#[tokio::test]
async fn pinned_version_bypasses_mismatched_free_worker() {
    let backend = Arc::new(FakeBackend::new());
    let pool = WorkerPool::new(backend.clone(), FakeClock::default(), config(2, 0))
        .await
        .unwrap();

    let default_worker = pool
        .acquire(WorkerKind::Chromium, None, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(default_worker.version, "fake");
    pool.release(default_worker).await;

    // The free list holds one "fake"-version worker; requesting a pinned
    // version that doesn't match forces it to be discarded and a fresh
    // one launched instead.
    let pinned = pool
        .acquire(WorkerKind::Chromium, Some("117.0"), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(pinned.version, "117.0");
    assert_eq!(backend.destroyed_count(), 1);
}

#[tokio::test]
async fn pre_warm_exceeding_max_size_is_rejected() {
    let backend = Arc::new(FakeBackend::new());
    let result = WorkerPool::new(backend, FakeClock::default(), config(1, 5)).await;
    assert!(matches!(result, Err(crate::PoolError::InvalidConfig(_))));
}

#[tokio::test]
async fn shutdown_destroys_free_and_leased_workers() {
    let backend = Arc::new(FakeBackend::new());
    let pool = WorkerPool::new(backend.clone(), FakeClock::default(), config(2, 0))
        .await
        .unwrap();

    let leased = pool.acquire(WorkerKind::Chromium, None, Duration::from_secs(1)).await.unwrap();
    let free = pool.acquire(WorkerKind::Chromium, None, Duration::from_secs(1)).await.unwrap();
    pool.release(free).await;

    pool.shutdown(Duration::from_millis(10)).await;
    drop(leased);

    assert_eq!(backend.destroyed_count(), 2);
    assert!(matches!(
        pool.acquire(WorkerKind::Chromium, None, Duration::from_millis(10)).await,
        Err(crate::PoolError::Unavailable)
    ));
}
