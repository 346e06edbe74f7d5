//! Bounded exponential backoff for calls to the flight-data provider.
//!
//! The engine retries only errors whose [`Retryable`] classification says a
//! repeat attempt can help, sleeping `initial_delay * multiplier^attempt`
//! (capped at `max_delay`) plus uniform random jitter between attempts. It
//! never distinguishes idempotent from non-idempotent operations -- callers
//! must only wrap operations that are safe to repeat, or use
//! [`RetryPolicy::none`].

use crate::utils::fmt_duration;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Classification seam between the engine and the errors it sees.
///
/// Implementations must derive the answer from structured error data (status
/// codes, transport kinds), not message text.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; 3 means up to 4 calls total.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Up to `delay * jitter_factor` of extra random delay per attempt.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries. For non-idempotent operations such as
    /// booking creation.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Faster first retry, more attempts, higher ceiling.
    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(15),
            backoff_multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }

    /// Backoff delay for a 0-based attempt ordinal, before jitter.
    fn base_delay(&self, attempt: u32) -> Duration {
        let raw = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }

    /// Add uniform random jitter in `[0, base * jitter_factor]`.
    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return base;
        }
        let extra = base.as_secs_f64() * rand::rng().random_range(0.0..=self.jitter_factor);
        base + Duration::from_secs_f64(extra)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// The returned error is the last one observed; its own
    /// [`Retryable::is_retryable`] tells the caller whether the failure was
    /// transient (useful for "try again shortly" messaging even after the
    /// engine has given up). Dropping the future cancels any in-flight
    /// attempt and skips remaining delays.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt >= self.max_retries {
                        warn!(
                            op = label,
                            attempts = attempt + 1,
                            error = %err,
                            "retries exhausted"
                        );
                        return Err(err);
                    }
                    let delay = self.jittered(self.base_delay(attempt));
                    warn!(
                        op = label,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay = fmt_duration(delay),
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
