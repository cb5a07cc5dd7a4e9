// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CircuitState: per-endpoint breaker state, created lazily and never
//! destroyed for the lifetime of the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitState {
    pub phase: CircuitPhase,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Tunable thresholds; defaults match §4.C.3.
#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            open_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            phase: CircuitPhase::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
        }
    }
}

impl CircuitState {
    /// Whether a call is currently allowed through. Callers in `HalfOpen`
    /// still get `true` here; the concurrent-call cap for half-open probes
    /// is enforced by the breaker that owns this state, not by the state
    /// itself.
    pub fn allows_call(&self, config: &CircuitConfig, now: DateTime<Utc>) -> bool {
        match self.phase {
            CircuitPhase::Closed | CircuitPhase::HalfOpen => true,
            CircuitPhase::Open => match self.last_failure_at {
                Some(at) => now.signed_duration_since(at).to_std().unwrap_or_default() >= config.open_timeout,
                None => true,
            },
        }
    }

    pub fn on_success(&mut self, config: &CircuitConfig) {
        match self.phase {
            CircuitPhase::Closed => {
                self.failure_count = 0;
            }
            CircuitPhase::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= config.success_threshold {
                    self.phase = CircuitPhase::Closed;
                    self.failure_count = 0;
                    self.success_count = 0;
                }
            }
            CircuitPhase::Open => {
                self.phase = CircuitPhase::HalfOpen;
                self.success_count = 1;
            }
        }
    }

    pub fn on_failure(&mut self, config: &CircuitConfig, now: DateTime<Utc>) {
        self.last_failure_at = Some(now);
        match self.phase {
            CircuitPhase::Closed => {
                self.failure_count += 1;
                if self.failure_count >= config.failure_threshold {
                    self.phase = CircuitPhase::Open;
                }
            }
            CircuitPhase::HalfOpen => {
                self.phase = CircuitPhase::Open;
                self.success_count = 0;
            }
            CircuitPhase::Open => {}
        }
    }

    /// Transition out of `Open` into `HalfOpen` once the timeout elapsed,
    /// without recording a call outcome. Used by the breaker just before
    /// deciding whether to let a probe through.
    pub fn tick(&mut self, config: &CircuitConfig, now: DateTime<Utc>) {
        if self.phase == CircuitPhase::Open && self.allows_call(config, now) {
            self.phase = CircuitPhase::HalfOpen;
            self.success_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_failure_threshold() {
        let config = CircuitConfig::default();
        let mut state = CircuitState::default();
        let now = Utc::now();
        for _ in 0..config.failure_threshold {
            state.on_failure(&config, now);
        }
        assert_eq!(state.phase, CircuitPhase::Open);
        assert!(!state.allows_call(&config, now));
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let config = CircuitConfig::default();
        let mut state = CircuitState::default();
        let now = Utc::now();
        for _ in 0..config.failure_threshold {
            state.on_failure(&config, now);
        }
        let later = now + chrono::Duration::from_std(config.open_timeout).unwrap();
        state.tick(&config, later);
        assert_eq!(state.phase, CircuitPhase::HalfOpen);
        for _ in 0..config.success_threshold {
            state.on_success(&config);
        }
        assert_eq!(state.phase, CircuitPhase::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let config = CircuitConfig::default();
        let mut state = CircuitState {
            phase: CircuitPhase::HalfOpen,
            failure_count: 0,
            success_count: 1,
            last_failure_at: None,
        };
        state.on_failure(&config, Utc::now());
        assert_eq!(state.phase, CircuitPhase::Open);
    }
}
