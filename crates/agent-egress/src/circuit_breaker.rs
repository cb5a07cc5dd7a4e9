// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-endpoint circuit breakers, created lazily and kept for the life
//! of the process. Wraps [`agent_core::CircuitState`] with the registry,
//! the half-open concurrency cap, and the retry-inside-the-breaker
//! wiring described in §4.C.3.

use crate::error::EgressError;
use agent_core::{Clock, CircuitConfig, CircuitPhase, CircuitState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const MAX_CONCURRENT_HALF_OPEN_PROBES: u32 = 1;

struct Endpoint {
    state: Mutex<CircuitState>,
    half_open_in_flight: AtomicU32,
}

/// Registry of per-endpoint breaker state, plus the call-wrapping logic
/// that decides whether a call is allowed through.
pub struct CircuitBreakerRegistry<C> {
    clock: C,
    config: CircuitConfig,
    endpoints: Mutex<HashMap<String, Arc<Endpoint>>>,
}

impl<C: Clock> CircuitBreakerRegistry<C> {
    pub fn new(clock: C, config: CircuitConfig) -> Self {
        Self {
            clock,
            config,
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    fn endpoint(&self, key: &str) -> Arc<Endpoint> {
        let mut guard = self.endpoints.lock();
        guard
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Endpoint {
                    state: Mutex::new(CircuitState::default()),
                    half_open_in_flight: AtomicU32::new(0),
                })
            })
            .clone()
    }

    /// Wrap `call` with this endpoint's breaker. Short-circuits with
    /// [`EgressError::CircuitOpen`] without invoking `call` at all when
    /// the breaker is open (or half-open is already saturated).
    pub async fn call<T, F, Fut>(&self, endpoint_key: &str, call: F) -> Result<T, EgressError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, EgressError>>,
    {
        let endpoint = self.endpoint(endpoint_key);
        let now = self.clock.now();

        {
            let mut state = endpoint.state.lock();
            state.tick(&self.config, now);
            if !state.allows_call(&self.config, now) {
                return Err(EgressError::CircuitOpen {
                    endpoint: endpoint_key.to_string(),
                });
            }
            if state.phase == CircuitPhase::HalfOpen {
                let in_flight = endpoint.half_open_in_flight.load(Ordering::SeqCst);
                if in_flight >= MAX_CONCURRENT_HALF_OPEN_PROBES {
                    return Err(EgressError::CircuitOpen {
                        endpoint: endpoint_key.to_string(),
                    });
                }
                endpoint.half_open_in_flight.fetch_add(1, Ordering::SeqCst);
            }
        }

        let was_half_open = endpoint.state.lock().phase == CircuitPhase::HalfOpen;
        let result = call().await;

        if was_half_open {
            endpoint.half_open_in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        let now = self.clock.now();
        let mut state = endpoint.state.lock();
        match &result {
            Ok(_) => state.on_success(&self.config),
            Err(e) if e.is_retryable() || matches!(e, EgressError::Rejected { .. }) => {
                state.on_failure(&self.config, now)
            }
            Err(_) => {}
        }

        result
    }

    pub fn phase(&self, endpoint_key: &str) -> CircuitPhase {
        self.endpoint(endpoint_key).state.lock().phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::FakeClock;
    use std::sync::atomic::AtomicU32 as CallCounter;

    fn err() -> EgressError {
        EgressError::Transport("boom".into())
    }

    #[tokio::test]
    async fn opens_after_failure_threshold_then_short_circuits() {
        let clock = FakeClock::default();
        let registry = CircuitBreakerRegistry::new(clock.clone(), CircuitConfig::default());
        let calls = CallCounter::new(0);

        for _ in 0..5 {
            let _ = registry
                .call("status", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(err()) }
                })
                .await;
        }
        assert_eq!(registry.phase("status"), CircuitPhase::Open);

        let before = calls.load(Ordering::SeqCst);
        let result = registry.call("status", || async { calls.fetch_add(1, Ordering::SeqCst); Ok::<(), _>(()) }).await;
        assert!(matches!(result, Err(EgressError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), before, "short-circuited call must not invoke the closure");
    }

    #[tokio::test]
    async fn half_open_probe_allowed_after_timeout_then_closes() {
        let clock = FakeClock::default();
        let registry = CircuitBreakerRegistry::new(clock.clone(), CircuitConfig::default());

        for _ in 0..5 {
            let _ = registry.call("status", || async { Err::<(), _>(err()) }).await;
        }
        assert_eq!(registry.phase("status"), CircuitPhase::Open);

        clock.advance(std::time::Duration::from_secs(31));

        let result = registry.call("status", || async { Ok::<(), EgressError>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(registry.phase("status"), CircuitPhase::HalfOpen);

        for _ in 0..2 {
            let _ = registry.call("status", || async { Ok::<(), EgressError>(()) }).await;
        }
        assert_eq!(registry.phase("status"), CircuitPhase::Closed);
    }
}
