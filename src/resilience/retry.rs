// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Courtside connectivity drops packets constantly; one failed request is
//! not a reason to push the whole engine into degraded mode. Remote calls
//! wrap themselves in a retry policy before their failure surfaces as a
//! [`crate::SyncError::Network`].
//!
//! # Example
//!
//! ```
//! use courtside_sync::RetryConfig;
//!
//! // Interactive reads: a couple of quick attempts, then let the caller
//! // fall back to the local replica.
//! let query = RetryConfig::query();
//! assert_eq!(query.max_retries, Some(3));
//!
//! // Background reconnection: never give up.
//! let daemon = RetryConfig::daemon();
//! assert_eq!(daemon.max_retries, None);
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for operation retry behavior.
///
/// Use the preset constructors for common patterns:
/// - [`RetryConfig::query()`] - quick retry for interactive remote calls
/// - [`RetryConfig::daemon()`] - infinite retry for background reconnection
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::query()
    }
}

impl RetryConfig {
    /// Quick retry for individual remote calls (don't block the caller).
    /// 3 attempts with fast backoff; after that the caller decides whether
    /// to fall back to the local replica.
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Infinite retry with backoff capped at 5 minutes.
    /// For long-lived background work that should ride out an entire
    /// offline stretch rather than fail.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            max_retries: None,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }
}

/// Run `operation` until it succeeds or the policy gives up, backing off
/// exponentially between attempts. The last error is returned unchanged.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, attempts, "succeeded after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                if let Some(max) = config.max_retries {
                    if attempts >= max {
                        return Err(err);
                    }
                    warn!(
                        operation = operation_name,
                        attempt = attempts,
                        max,
                        error = %err,
                        "attempt failed; retrying in {delay:?}"
                    );
                } else {
                    warn!(
                        operation = operation_name,
                        attempt = attempts,
                        error = %err,
                        "attempt failed; retrying forever, next in {delay:?}"
                    );
                }

                sleep(delay).await;
                delay = (delay.mul_f64(config.factor)).min(config.max_delay);
            }
        }
    }
}
