//! Downstream dispatcher.
//!
//! # Responsibilities
//! - Issue one call per downstream target of the matched route
//! - Run fan-out calls concurrently under a single deadline
//! - Guard each call with its target's circuit breaker
//! - Retry safe methods within the retry budget
//!
//! # Data Flow
//! ```text
//! RouteMatch + InboundRequest
//!     → build one DownstreamRequest per target (target order)
//!     → none:      call inline under the deadline
//!     → fan-out:   JoinSet, one task per target, joined until the deadline
//!     → Vec<DownstreamCallResult> in target order
//! ```
//!
//! # Design Decisions
//! - Results are always returned in target order, never completion order
//! - Calls still outstanding at the deadline are aborted and reported as timeouts
//! - Dropping the dispatch future drops the JoinSet, which aborts every call
//! - 502/503/504, timeouts and transport errors count against the breaker;
//!   any other response is a breaker success

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::TimeoutConfig;
use crate::dispatch::client::{DownstreamClient, DownstreamRequest, DownstreamResponse};
use crate::dispatch::request::{build_downstream_request, InboundRequest};
use crate::observability::metrics;
use crate::resilience::retries::is_retryable;
use crate::resilience::{CircuitBreaker, CircuitBreakers, RetryBudget, RetryPolicy};
use crate::routing::definition::CompiledTarget;
use crate::routing::RouteMatch;

/// Why a downstream call produced no usable response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("downstream call timed out")]
    Timeout,

    #[error("circuit open")]
    CircuitOpen,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid downstream request: {0}")]
    InvalidRequest(String),
}

/// Outcome of calling one downstream target.
#[derive(Debug, Clone)]
pub struct DownstreamCallResult {
    pub target_key: String,
    pub target_id: String,
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub latency: Duration,
    pub attempts: u32,
    pub error: Option<CallError>,
}

impl DownstreamCallResult {
    fn completed(
        target_key: String,
        target_id: String,
        response: DownstreamResponse,
        latency: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            target_key,
            target_id,
            status: Some(response.status),
            headers: response.headers,
            body: response.body,
            latency,
            attempts,
            error: None,
        }
    }

    pub fn failed(
        target_key: impl Into<String>,
        target_id: impl Into<String>,
        error: CallError,
        latency: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            target_key: target_key.into(),
            target_id: target_id.into(),
            status: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            latency,
            attempts,
            error: Some(error),
        }
    }

    /// A response arrived with a 2xx status.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_some_and(|s| s.is_success())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.error, Some(CallError::Timeout))
    }
}

/// Time left for aggregation and the response after the dispatch deadline
/// when a route deadline is clamped to the inbound request timeout.
const RESPONSE_HEADROOM: Duration = Duration::from_millis(100);

/// Everything one call task needs, resolved before spawning.
struct CallPlan {
    key: String,
    id: String,
    request: DownstreamRequest,
    breaker: Arc<CircuitBreaker>,
}

#[derive(Clone)]
pub struct DownstreamDispatcher {
    client: Arc<dyn DownstreamClient>,
    breakers: Arc<CircuitBreakers>,
    retry: RetryPolicy,
    budget: Arc<RetryBudget>,
    call_timeout: Duration,
    fan_out_deadline: Duration,
    max_deadline: Duration,
}

impl DownstreamDispatcher {
    pub fn new(
        client: Arc<dyn DownstreamClient>,
        breakers: Arc<CircuitBreakers>,
        retry: RetryPolicy,
        budget: Arc<RetryBudget>,
        timeouts: &TimeoutConfig,
    ) -> Self {
        Self {
            client,
            breakers,
            retry,
            budget,
            call_timeout: Duration::from_millis(timeouts.downstream_call_ms),
            fan_out_deadline: Duration::from_millis(timeouts.fan_out_ms),
            max_deadline: Duration::from_secs(timeouts.request_secs).saturating_sub(RESPONSE_HEADROOM),
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakers> {
        &self.breakers
    }

    /// Call every target of `matched` and return one result per target,
    /// in target order.
    pub async fn dispatch(
        &self,
        matched: &RouteMatch,
        inbound: &InboundRequest,
    ) -> Vec<DownstreamCallResult> {
        let started = Instant::now();
        let budget = matched
            .definition()
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.fan_out_deadline)
            .min(self.max_deadline);
        let deadline = started + budget;

        let targets = matched.route.targets();
        let plans: Vec<Result<CallPlan, DownstreamCallResult>> = targets
            .iter()
            .map(|target| self.plan(target, matched, inbound))
            .collect();

        if !matched.route.aggregation().is_fan_out() {
            let mut results = Vec::with_capacity(1);
            for (target, plan) in targets.iter().zip(plans) {
                let result = match plan {
                    Ok(plan) => {
                        match tokio::time::timeout_at(deadline, self.call(plan)).await {
                            Ok(result) => result,
                            Err(_) => timed_out(target, started.elapsed()),
                        }
                    }
                    Err(result) => result,
                };
                results.push(result);
            }
            return results;
        }

        let mut slots: Vec<Option<DownstreamCallResult>> = vec![None; targets.len()];
        let mut set = JoinSet::new();
        let mut task_index = HashMap::new();

        for (index, plan) in plans.into_iter().enumerate() {
            match plan {
                Ok(plan) => {
                    let this = self.clone();
                    let handle = set.spawn(async move { (index, this.call(plan).await) });
                    task_index.insert(handle.id(), index);
                }
                Err(result) => slots[index] = Some(result),
            }
        }

        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((index, result)))) => slots[index] = Some(result),
                Ok(Some(Err(join_error))) => {
                    tracing::error!(error = %join_error, "Downstream call task failed");
                    if let Some(&index) = task_index.get(&join_error.id()) {
                        let target = &targets[index].target;
                        slots[index] = Some(DownstreamCallResult::failed(
                            target.key(),
                            target.id(),
                            CallError::Transport(join_error.to_string()),
                            started.elapsed(),
                            0,
                        ));
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        route = %matched.key(),
                        outstanding = set.len(),
                        "Fan-out deadline reached, abandoning outstanding calls"
                    );
                    set.abort_all();
                    break;
                }
            }
        }

        slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| slot.unwrap_or_else(|| timed_out(target, started.elapsed())))
            .collect()
    }

    fn plan(
        &self,
        target: &CompiledTarget,
        matched: &RouteMatch,
        inbound: &InboundRequest,
    ) -> Result<CallPlan, DownstreamCallResult> {
        let key = target.target.key();
        let id = target.target.id();
        match build_downstream_request(target, &matched.params, inbound) {
            Ok(request) => Ok(CallPlan {
                breaker: self.breakers.get(&id),
                key,
                id,
                request,
            }),
            Err(reason) => {
                tracing::warn!(route = %matched.key(), target_key = %key, %reason, "Cannot build downstream request");
                Err(DownstreamCallResult::failed(
                    key,
                    id,
                    CallError::InvalidRequest(reason),
                    Duration::ZERO,
                    0,
                ))
            }
        }
    }

    /// One logical call: breaker check, attempt, and retries.
    async fn call(&self, plan: CallPlan) -> DownstreamCallResult {
        let started = Instant::now();
        let method: Method = plan.request.method.clone();
        let max_attempts = self.retry.max_attempts(&method);
        let mut last: Option<DownstreamCallResult> = None;
        let mut attempt = 0;

        self.budget.record_call();

        loop {
            if plan.breaker.try_acquire().is_err() {
                tracing::debug!(target_id = %plan.id, "Circuit open, skipping downstream call");
                metrics::record_downstream_call(&plan.id, "circuit_open", started.elapsed());
                return last.unwrap_or_else(|| {
                    DownstreamCallResult::failed(
                        plan.key.clone(),
                        plan.id.clone(),
                        CallError::CircuitOpen,
                        started.elapsed(),
                        attempt,
                    )
                });
            }
            attempt += 1;

            let attempt_started = Instant::now();
            let outcome =
                match tokio::time::timeout(self.call_timeout, self.client.send(plan.request.clone()))
                    .await
                {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(e)) => Err(CallError::Transport(e.to_string())),
                    Err(_) => Err(CallError::Timeout),
                };

            let (result, retryable) = match outcome {
                Ok(response) => {
                    let status = response.status;
                    if counts_as_failure(status) {
                        self.breakers.record_failure(&plan.id, &plan.breaker);
                    } else {
                        plan.breaker.record_success();
                    }
                    metrics::record_downstream_call(
                        &plan.id,
                        status_outcome(status),
                        attempt_started.elapsed(),
                    );
                    (
                        DownstreamCallResult::completed(
                            plan.key.clone(),
                            plan.id.clone(),
                            response,
                            started.elapsed(),
                            attempt,
                        ),
                        is_retryable(&method, Some(status), false),
                    )
                }
                Err(error) => {
                    self.breakers.record_failure(&plan.id, &plan.breaker);
                    let outcome = if error == CallError::Timeout {
                        "timeout"
                    } else {
                        "error"
                    };
                    metrics::record_downstream_call(&plan.id, outcome, attempt_started.elapsed());
                    tracing::debug!(target_id = %plan.id, attempt, %error, "Downstream attempt failed");
                    (
                        DownstreamCallResult::failed(
                            plan.key.clone(),
                            plan.id.clone(),
                            error,
                            started.elapsed(),
                            attempt,
                        ),
                        is_retryable(&method, None, true),
                    )
                }
            };

            if !retryable || attempt >= max_attempts || !self.budget.try_retry() {
                return result;
            }

            let delay = self.retry.backoff(attempt);
            tracing::debug!(target_id = %plan.id, attempt, delay_ms = delay.as_millis() as u64, "Retrying downstream call");
            last = Some(result);
            tokio::time::sleep(delay).await;
        }
    }
}

fn timed_out(target: &CompiledTarget, elapsed: Duration) -> DownstreamCallResult {
    DownstreamCallResult::failed(
        target.target.key(),
        target.target.id(),
        CallError::Timeout,
        elapsed,
        0,
    )
}

fn counts_as_failure(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

fn status_outcome(status: StatusCode) -> &'static str {
    if status.is_success() {
        "success"
    } else if status.is_client_error() {
        "client_error"
    } else if status.is_server_error() {
        "server_error"
    } else {
        "other"
    }
}
