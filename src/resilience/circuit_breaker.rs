//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: target assumed down, calls fail fast
//! - Half-Open: cooldown elapsed, a single probe is let through
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: after cooldown
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - Per-target circuit breaker (not global), shared by every route
//! - State is a handful of atomics; no locks on the call path
//! - A probe that never reports back (aborted at a fan-out deadline) expires
//!   after one cooldown so the breaker cannot wedge half-open

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// The call was rejected without a network attempt.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("circuit open")]
pub struct CircuitOpen;

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    epoch: Instant,
    consecutive_failures: AtomicU32,
    /// Tick (ms since epoch, plus one) when the circuit opened; 0 = closed.
    opened_at: AtomicU64,
    /// Tick when the current half-open probe was issued; 0 = none.
    probe_started: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            epoch: Instant::now(),
            consecutive_failures: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            probe_started: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64 + 1
    }

    fn cooldown_ms(&self) -> u64 {
        self.cooldown.as_millis() as u64
    }

    pub fn state(&self) -> CircuitState {
        let opened = self.opened_at.load(Ordering::Acquire);
        if opened == 0 {
            CircuitState::Closed
        } else if self.tick().saturating_sub(opened) < self.cooldown_ms() {
            CircuitState::Open
        } else {
            CircuitState::HalfOpen
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Ask permission for one call.
    pub fn try_acquire(&self) -> Result<(), CircuitOpen> {
        match self.state() {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => Err(CircuitOpen),
            CircuitState::HalfOpen => {
                let now = self.tick();
                let current = self.probe_started.load(Ordering::Acquire);
                if current != 0 && now.saturating_sub(current) < self.cooldown_ms() {
                    return Err(CircuitOpen);
                }
                self.probe_started
                    .compare_exchange(current, now, Ordering::AcqRel, Ordering::Acquire)
                    .map(|_| ())
                    .map_err(|_| CircuitOpen)
            }
        }
    }

    /// Record a successful call.
    ///
    /// While the circuit is open only the half-open probe may close it; a
    /// success from a call issued before the circuit opened is ignored.
    pub fn record_success(&self) {
        if self.opened_at.load(Ordering::Acquire) == 0 {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return;
        }
        if self.probe_started.swap(0, Ordering::AcqRel) == 0 {
            return;
        }
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.opened_at.store(0, Ordering::Release);
        tracing::info!("Circuit breaker closed after successful probe");
    }

    /// Record a failed call. Returns true if this failure opened the circuit.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        if self.probe_started.swap(0, Ordering::AcqRel) != 0 {
            self.opened_at.store(self.tick(), Ordering::Release);
            tracing::warn!("Circuit breaker reopened after failed probe");
            return true;
        }

        if failures >= self.failure_threshold
            && self
                .opened_at
                .compare_exchange(0, self.tick(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            tracing::warn!(
                failure_count = failures,
                threshold = self.failure_threshold,
                "Circuit breaker opened due to failures"
            );
            return true;
        }
        false
    }
}

/// Breaker state for one target, as reported by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub target: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Lazily created breakers keyed by downstream target id.
#[derive(Debug)]
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn get(&self, target_id: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(target_id) {
            return existing.clone();
        }
        self.breakers
            .entry(target_id.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    self.config.failure_threshold,
                    Duration::from_millis(self.config.cooldown_ms),
                ))
            })
            .clone()
    }

    /// Record a failure for `target_id`, counting circuit openings.
    pub fn record_failure(&self, target_id: &str, breaker: &CircuitBreaker) {
        if breaker.record_failure() {
            metrics::record_circuit_open(target_id);
        }
    }

    pub fn statuses(&self) -> Vec<CircuitStatus> {
        let mut statuses: Vec<CircuitStatus> = self
            .breakers
            .iter()
            .map(|entry| CircuitStatus {
                target: entry.key().clone(),
                state: entry.value().state(),
                consecutive_failures: entry.value().consecutive_failures(),
            })
            .collect();
        statuses.sort_by(|a, b| a.target.cmp(&b.target));
        statuses
    }
}
