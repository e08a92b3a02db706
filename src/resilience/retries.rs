//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a call is retryable (safe methods only)
//! - Compute attempt bounds and backoff delays
//! - Enforce retry budget (max retries relative to calls per window)
//!
//! # Design Decisions
//! - Never retry POST/PUT/DELETE/PATCH
//! - Jittered backoff prevents thundering herd
//! - Retry budget prevents retry storms under load
//! - Connection errors and timeouts always retryable; 502/503/504 retryable

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::http::{Method, StatusCode};
use tokio::time::Instant;

use crate::config::RetryConfig;
use crate::resilience::backoff::Backoff;

/// Whether a failed attempt may be retried.
pub fn is_retryable(method: &Method, status: Option<StatusCode>, transport_error: bool) -> bool {
    if !method.is_safe() {
        return false;
    }
    if transport_error {
        return true;
    }
    matches!(
        status,
        Some(StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT)
    )
}

/// Attempt bounds and backoff derived from [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            backoff: Backoff::from_config(&config),
            config,
        }
    }

    /// Total attempts allowed for a call with `method` (at least one).
    pub fn max_attempts(&self, method: &Method) -> u32 {
        if self.config.enabled && method.is_safe() {
            self.config.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Delay before the retry that follows attempt number `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

/// Limits retries to a fraction of calls within a rolling window.
#[derive(Debug)]
pub struct RetryBudget {
    ratio: f32,
    min_retries: u64,
    window: Duration,
    epoch: Instant,
    window_start_ms: AtomicU64,
    calls: AtomicU64,
    retries: AtomicU64,
}

impl RetryBudget {
    /// `min_retries` are always allowed per window regardless of traffic.
    pub fn new(ratio: f32, min_retries: u64) -> Self {
        Self::with_window(ratio, min_retries, Duration::from_secs(10))
    }

    pub fn with_window(ratio: f32, min_retries: u64, window: Duration) -> Self {
        Self {
            ratio: ratio.max(0.0),
            min_retries,
            window,
            epoch: Instant::now(),
            window_start_ms: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    fn roll_window(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        let start = self.window_start_ms.load(Ordering::Relaxed);
        if now.saturating_sub(start) >= self.window.as_millis() as u64
            && self
                .window_start_ms
                .compare_exchange(start, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            self.calls.store(0, Ordering::Relaxed);
            self.retries.store(0, Ordering::Relaxed);
        }
    }

    pub fn record_call(&self) {
        self.roll_window();
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Consume one retry from the budget if available.
    pub fn try_retry(&self) -> bool {
        self.roll_window();
        let calls = self.calls.load(Ordering::Relaxed);
        let allowed = ((calls as f64) * self.ratio as f64) as u64;
        let limit = allowed.max(self.min_retries);

        let mut current = self.retries.load(Ordering::Relaxed);
        loop {
            if current >= limit {
                return false;
            }
            match self.retries.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(x) => current = x,
            }
        }
    }
}
