// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retrying sender wrapping a transport with capped exponential backoff.
//!
//! The retry loop is an explicit state machine: attempt, then on a retryable
//! failure sleep the current backoff, double it up to the cap, and try
//! again while the retry budget lasts. Exhausting the budget drops the
//! payload with an error log; the failure never reaches the host pipeline,
//! so one permanently failing batch cannot stall the ones behind it.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::transport::Transport;

/// Backoff and retry bounds for one delivery call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum retries per payload. Negative means retry forever.
    pub max_retries: i32,
    /// First backoff delay; doubles after every failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound on the backoff delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        RetryPolicy {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
        }
    }
}

/// Delivers `payload` through `transport`, retrying retryable failures.
///
/// Returns whether the payload was handed to the intake. The retry counter
/// is local to this call and never carries over to the next payload.
pub async fn send_with_retries(
    transport: &dyn Transport,
    payload: &[u8],
    policy: &RetryPolicy,
) -> bool {
    let mut retries: i32 = 0;
    let mut backoff = policy.initial_backoff.min(policy.max_backoff);

    loop {
        if retries > 0 {
            info!(attempt = retries, "new delivery attempt");
        }
        match transport.send(payload).await {
            Ok(()) => return true,
            Err(e) => {
                if policy.max_retries >= 0 && retries >= policy.max_retries {
                    error!(
                        attempts = retries + 1,
                        error = %e,
                        "dropping payload after exhausting delivery retries"
                    );
                    return false;
                }
                retries = retries.saturating_add(1);
                warn!(
                    attempt = retries,
                    max_attempts = policy.max_retries,
                    wait_secs = backoff.as_secs_f64(),
                    error = %e,
                    "could not push payload to intake, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2).min(policy.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport scripted to fail a fixed number of times before succeeding.
    struct FlakyTransport {
        failures: usize,
        attempts: AtomicUsize,
    }

    impl FlakyTransport {
        fn failing(failures: usize) -> Self {
            FlakyTransport {
                failures,
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, _payload: &[u8]) -> Result<(), TransportError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                Err(TransportError::Status(503))
            } else {
                Ok(())
            }
        }

        async fn shutdown(&self) {}
    }

    fn fast_policy(max_retries: i32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn delivers_on_first_attempt() {
        let transport = FlakyTransport::failing(0);
        assert!(send_with_retries(&transport, b"x", &fast_policy(3)).await);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_within_retry_budget() {
        let transport = FlakyTransport::failing(2);
        assert!(send_with_retries(&transport, b"x", &fast_policy(3)).await);
        // Exactly one successful delivery after two retryable failures.
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn drops_after_exhausting_budget() {
        let transport = FlakyTransport::failing(usize::MAX);
        assert!(!send_with_retries(&transport, b"x", &fast_policy(2)).await);
        // Initial attempt plus two retries.
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_budget_means_single_attempt() {
        let transport = FlakyTransport::failing(usize::MAX);
        assert!(!send_with_retries(&transport, b"x", &fast_policy(0)).await);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn negative_budget_retries_until_success() {
        let transport = FlakyTransport::failing(5);
        assert!(send_with_retries(&transport, b"x", &fast_policy(-1)).await);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn policy_follows_config() {
        let policy = RetryPolicy::from_config(&Config {
            max_retries: 7,
            max_backoff_secs: 12,
            ..Config::default()
        });
        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.initial_backoff, Duration::from_secs(1));
        assert_eq!(policy.max_backoff, Duration::from_secs(12));
    }
}
