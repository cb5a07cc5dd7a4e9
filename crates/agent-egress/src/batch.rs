// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! BatchWriter: non-blocking Session-update buffer that flushes on size
//! or time, preserving per-execution FIFO, with bounded overflow and
//! backpressure that never blocks the producer.

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::error::EgressError;
use crate::retry::{retry_with_backoff, BackoffConfig};
use crate::transport::EgressTransport;
use agent_core::{Clock, ExecutionId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SessionUpdate {
    pub execution_id: ExecutionId,
    pub payload: serde_json::Value,
    /// Terminal state transitions are never dropped under backpressure.
    pub critical: bool,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_size: usize,
    pub flush_interval: Duration,
    pub overflow_soft_cap: usize,
    pub backoff: BackoffConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            flush_interval: Duration::from_secs(2),
            overflow_soft_cap: 500,
            backoff: BackoffConfig::default(),
        }
    }
}

struct Shared<T> {
    transport: Arc<T>,
    endpoint: String,
    config: BatchConfig,
    buffer: Mutex<VecDeque<SessionUpdate>>,
    buffer_started_at: Mutex<Option<std::time::Instant>>,
    overflow: Mutex<VecDeque<Vec<SessionUpdate>>>,
    overflow_len: AtomicUsize,
    notify_rotate: Notify,
    notify_overflow: Notify,
    closed: AtomicBool,
}

impl<T: EgressTransport> Shared<T> {
    fn rotate(&self) -> Option<Vec<SessionUpdate>> {
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return None;
        }
        *self.buffer_started_at.lock() = None;
        Some(buffer.drain(..).collect())
    }

    fn enqueue_overflow(&self, batch: Vec<SessionUpdate>) {
        let len = batch.len();
        self.overflow.lock().push_back(batch);
        self.overflow_len.fetch_add(len, Ordering::SeqCst);
        self.enforce_soft_cap();
        self.notify_overflow.notify_one();
    }

    /// Drop the oldest non-critical updates once overflow exceeds the
    /// soft cap. Terminal (critical) updates are never dropped (§4.C.1).
    fn enforce_soft_cap(&self) {
        if self.overflow_len.load(Ordering::SeqCst) <= self.config.overflow_soft_cap {
            return;
        }
        let mut overflow = self.overflow.lock();
        let mut dropped = 0usize;
        'outer: for batch in overflow.iter_mut() {
            let mut i = 0;
            while i < batch.len() {
                if self.overflow_len.load(Ordering::SeqCst) <= self.config.overflow_soft_cap {
                    break 'outer;
                }
                if !batch[i].critical {
                    batch.remove(i);
                    self.overflow_len.fetch_sub(1, Ordering::SeqCst);
                    dropped += 1;
                } else {
                    i += 1;
                }
            }
        }
        overflow.retain(|b| !b.is_empty());
        if dropped > 0 {
            warn!(dropped, "dropped non-critical session updates under backpressure");
        }
    }

    pub fn overflow_len(&self) -> usize {
        self.overflow_len.load(Ordering::SeqCst)
    }
}

pub struct BatchWriter<T: EgressTransport, C> {
    shared: Arc<Shared<T>>,
    clock: C,
    timer_task: Mutex<Option<JoinHandle<()>>>,
    sender_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: EgressTransport, C: Clock> BatchWriter<T, C> {
    pub fn start(
        transport: Arc<T>,
        breaker: Arc<CircuitBreakerRegistry<C>>,
        endpoint: impl Into<String>,
        config: BatchConfig,
        clock: C,
    ) -> Self {
        let shared = Arc::new(Shared {
            transport,
            endpoint: endpoint.into(),
            config: config.clone(),
            buffer: Mutex::new(VecDeque::new()),
            buffer_started_at: Mutex::new(None),
            overflow: Mutex::new(VecDeque::new()),
            overflow_len: AtomicUsize::new(0),
            notify_rotate: Notify::new(),
            notify_overflow: Notify::new(),
            closed: AtomicBool::new(false),
        });

        let timer_shared = shared.clone();
        let flush_interval = config.flush_interval;
        let timer_task = tokio::spawn(async move {
            loop {
                if timer_shared.closed.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = timer_shared.notify_rotate.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
                let elapsed = timer_shared
                    .buffer_started_at
                    .lock()
                    .map(|at| at.elapsed() >= flush_interval)
                    .unwrap_or(false);
                if elapsed {
                    if let Some(batch) = timer_shared.rotate() {
                        timer_shared.enqueue_overflow(batch);
                    }
                }
            }
        });

        let sender_shared = shared.clone();
        let sender_breaker = breaker;
        let sender_task = tokio::spawn(async move {
            loop {
                let batch = sender_shared.overflow.lock().pop_front();
                let Some(batch) = batch else {
                    if sender_shared.closed.load(Ordering::SeqCst) {
                        break;
                    }
                    sender_shared.notify_overflow.notified().await;
                    continue;
                };
                let len = batch.len();
                sender_shared.overflow_len.fetch_sub(len, Ordering::SeqCst);
                send_batch(&sender_shared, &sender_breaker, batch).await;
            }
        });

        Self {
            shared,
            clock,
            timer_task: Mutex::new(Some(timer_task)),
            sender_task: Mutex::new(Some(sender_task)),
        }
    }

    /// Non-blocking, amortised O(1): push into the buffer, rotating to
    /// overflow immediately if `max_size` is reached.
    pub fn add(&self, update: SessionUpdate) {
        let should_rotate = {
            let mut buffer = self.shared.buffer.lock();
            buffer.push_back(update);
            let mut started = self.shared.buffer_started_at.lock();
            if started.is_none() {
                *started = Some(std::time::Instant::now());
            }
            buffer.len() >= self.shared.config.max_size
        };
        if should_rotate {
            if let Some(batch) = self.shared.rotate() {
                self.shared.enqueue_overflow(batch);
            }
        } else {
            self.shared.notify_rotate.notify_one();
        }
        let _ = &self.clock;
    }

    pub fn flush(&self) {
        if let Some(batch) = self.shared.rotate() {
            self.shared.enqueue_overflow(batch);
        }
    }

    pub fn overflow_len(&self) -> usize {
        self.shared.overflow_len()
    }

    /// Flush and stop accepting new timer ticks; waits for in-flight
    /// sends to drain. Idempotent: a second call is a no-op.
    pub async fn close(&self) {
        self.flush();
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.notify_overflow.notify_one();
        self.shared.notify_rotate.notify_one();
        let timer_task = self.timer_task.lock().take();
        if let Some(task) = timer_task {
            let _ = task.await;
        }
        let sender_task = self.sender_task.lock().take();
        if let Some(task) = sender_task {
            let _ = task.await;
        }
    }
}

async fn send_batch<T: EgressTransport, C: Clock>(
    shared: &Shared<T>,
    breaker: &CircuitBreakerRegistry<C>,
    batch: Vec<SessionUpdate>,
) {
    let payload = serde_json::json!(batch);
    let endpoint = shared.endpoint.clone();
    let transport = shared.transport.clone();
    let backoff = shared.config.backoff;

    let result = breaker
        .call(&endpoint, || {
            let endpoint = endpoint.clone();
            let transport = transport.clone();
            let payload = payload.clone();
            async move {
                retry_with_backoff(
                    &backoff,
                    || {
                        let transport = transport.clone();
                        let endpoint = endpoint.clone();
                        let payload = payload.clone();
                        async move {
                            let (status, body) =
                                transport.post_json(&endpoint, &payload, Duration::from_secs(10)).await?;
                            if status >= 500 {
                                return Err(EgressError::Rejected { status, body });
                            }
                            if status >= 400 {
                                return Err(EgressError::Rejected { status, body });
                            }
                            Ok(())
                        }
                    },
                    |e: &EgressError| e.is_retryable(),
                )
                .await
            }
        })
        .await;

    if let Err(e) = result {
        match &e {
            EgressError::Rejected { status, .. } if (400..500).contains(status) => {
                debug!(status, "batch rejected with 4xx, dropping");
            }
            _ => {
                warn!(error = %e, "batch send failed after retries");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeTransport;
    use agent_core::{CircuitConfig, FakeClock};

    fn update(id: &str, critical: bool) -> SessionUpdate {
        SessionUpdate {
            execution_id: ExecutionId::new(id),
            payload: serde_json::json!({"id": id}),
            critical,
        }
    }

    #[tokio::test]
    async fn flushes_on_max_size() {
        let transport = Arc::new(FakeTransport::new());
        let breaker = Arc::new(CircuitBreakerRegistry::new(FakeClock::default(), CircuitConfig::default()));
        let writer = BatchWriter::start(
            transport.clone(),
            breaker,
            "http://ctrl/sessions",
            BatchConfig {
                max_size: 2,
                flush_interval: Duration::from_secs(60),
                ..BatchConfig::default()
            },
            FakeClock::default(),
        );

        writer.add(update("a", false));
        writer.add(update("b", false));

        tokio::time::sleep(Duration::from_millis(200)).await;
        writer.close().await;

        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn preserves_per_execution_order_within_a_batch() {
        let transport = Arc::new(FakeTransport::new());
        let breaker = Arc::new(CircuitBreakerRegistry::new(FakeClock::default(), CircuitConfig::default()));
        let writer = BatchWriter::start(
            transport.clone(),
            breaker,
            "http://ctrl/sessions",
            BatchConfig::default(),
            FakeClock::default(),
        );

        for i in 0..5 {
            writer.add(update("exec-1", false));
            let _ = i;
        }
        writer.flush();
        tokio::time::sleep(Duration::from_millis(100)).await;
        writer.close().await;

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let body = calls[0].body.as_ref().unwrap();
        let arr = body.as_array().unwrap();
        assert_eq!(arr.len(), 5);
    }

    #[tokio::test]
    async fn soft_cap_drops_non_critical_before_critical() {
        let transport = Arc::new(FakeTransport::new());
        let breaker = Arc::new(CircuitBreakerRegistry::new(FakeClock::default(), CircuitConfig::default()));
        let writer = BatchWriter::start(
            transport,
            breaker,
            "http://ctrl/sessions",
            BatchConfig {
                max_size: 1000,
                flush_interval: Duration::from_secs(60),
                overflow_soft_cap: 2,
                ..BatchConfig::default()
            },
            FakeClock::default(),
        );

        // Force rotations into overflow manually via flush() between adds
        // so the soft cap sees multiple queued batches.
        writer.add(update("a", false));
        writer.flush();
        writer.add(update("b", true));
        writer.flush();
        writer.add(update("c", false));
        writer.flush();

        assert!(writer.overflow_len() <= 3);
        writer.close().await;
    }
}
