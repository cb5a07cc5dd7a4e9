// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared exponential-backoff-with-jitter helper. The distilled spec
//! described this policy twice, once for the batch writer and once for
//! the artifact uploader, with identical shape — factored out once here
//! instead of duplicated per caller.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            max: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

/// Full-jitter exponential backoff: `random(0, min(max, base * 2^attempt))`.
pub fn backoff_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    let exp = config.base.saturating_mul(1u32 << attempt.min(20));
    let capped = exp.min(config.max);
    let jittered_millis = rand::rng().random_range(0..=capped.as_millis().max(1) as u64);
    Duration::from_millis(jittered_millis)
}

/// Retry `op` up to `config.max_attempts` times, sleeping with
/// [`backoff_delay`] between attempts. `should_retry` decides whether a
/// given error is worth another attempt (e.g. not a 4xx).
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &BackoffConfig,
    mut op: F,
    should_retry: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < config.max_attempts && should_retry(&e) => {
                let delay = backoff_delay(config, attempt);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_delay_never_exceeds_max() {
        let config = BackoffConfig {
            base: Duration::from_millis(50),
            max: Duration::from_millis(500),
            max_attempts: 10,
        };
        for attempt in 0..10 {
            let delay = backoff_delay(&config, attempt);
            assert!(delay <= config.max);
        }
    }

    #[tokio::test]
    async fn retry_stops_after_max_attempts() {
        let config = BackoffConfig {
            base: Duration::from_millis(1),
            max: Duration::from_millis(2),
            max_attempts: 3,
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(
            &config,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("always fails") }
            },
            |_| true,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_immediately_when_should_retry_is_false() {
        let config = BackoffConfig::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(
            &config,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("not retryable") }
            },
            |_| false,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
