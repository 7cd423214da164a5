//! Backoff and retry decisions

use crate::config::{EndpointPolicy, RetryConfig};
use crate::crawler::{EndpointClass, FetchOutcome, FetchRequest, FetchResult};
use crate::retry::health::HealthMonitor;
use crate::retry::{ContentFailure, FailureKind, RetryDecision, RetryStrategy};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));

/// Health-aware retry policy
///
/// Combines the configured triage rules (status codes, content checks,
/// transport categories) with exponential backoff and the shared
/// [`HealthMonitor`]. Every evaluated outcome is recorded in the monitor.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    default_timeout: Duration,
    health: Arc<HealthMonitor>,
}

impl RetryPolicy {
    /// Creates a new retry policy
    ///
    /// # Arguments
    ///
    /// * `config` - Retry configuration
    /// * `default_timeout` - Timeout of requests without an override
    /// * `health` - Session health monitor shared with other jobs
    pub fn new(config: RetryConfig, default_timeout: Duration, health: Arc<HealthMonitor>) -> Self {
        Self {
            config,
            default_timeout,
            health,
        }
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Endpoint policy, falling back to the global ceiling with unit multipliers
    pub fn endpoint_policy(&self, endpoint: EndpointClass) -> EndpointPolicy {
        let overrides = &self.config.endpoints;
        let configured = match endpoint {
            EndpointClass::Form => overrides.form,
            EndpointClass::Detail => overrides.detail,
            EndpointClass::List => overrides.list,
            EndpointClass::StableRoute => overrides.stable_route,
        };
        configured.unwrap_or_else(|| EndpointPolicy::new(self.config.max_retries, 1.0, 1.0))
    }

    pub fn max_retries_for(&self, endpoint: EndpointClass) -> u32 {
        self.endpoint_policy(endpoint).max_retries
    }

    /// Detects a 200 response whose body is an error page
    pub fn content_failure(&self, body: &str) -> Option<ContentFailure> {
        let lower = body.to_lowercase();
        if let Some(phrase) = self
            .config
            .content_error_phrases
            .iter()
            .find(|phrase| lower.contains(&phrase.to_lowercase()))
        {
            return Some(ContentFailure::Phrase(phrase.clone()));
        }

        let trimmed = body.trim().chars().count();
        if trimmed < self.config.min_body_chars {
            return Some(ContentFailure::TooShort(trimmed));
        }

        let text = MARKUP_TAG.replace_all(body, "");
        let visible = text.trim().chars().count();
        if visible < self.config.min_text_chars {
            return Some(ContentFailure::NoText(visible));
        }

        None
    }

    /// Finds what is wrong with an outcome, if anything
    ///
    /// # Returns
    ///
    /// * `None` - A 2xx/3xx response with a plausible body
    /// * `Some(FailureKind)` - The failure, retryable or not
    pub fn assess(&self, outcome: &FetchOutcome) -> Option<FailureKind> {
        match &outcome.result {
            FetchResult::Failed(failure) => Some(FailureKind::Transport(failure.kind)),
            FetchResult::Response { status, body, .. } => {
                if self.config.retryable_status_codes.contains(status) {
                    Some(FailureKind::Server(*status))
                } else if *status == 200 {
                    self.content_failure(body).map(FailureKind::Content)
                } else if (200..400).contains(status) {
                    None
                } else {
                    Some(FailureKind::Status(*status))
                }
            }
        }
    }

    /// Whether an outcome deserves another attempt
    pub fn should_retry(&self, outcome: &FetchOutcome) -> bool {
        self.assess(outcome)
            .map(|failure| failure.is_retryable())
            .unwrap_or(false)
    }

    /// Backoff before retry number `retry_count` of an endpoint class
    pub fn compute_delay(&self, retry_count: u32, endpoint: EndpointClass) -> Duration {
        let multiplier = self.endpoint_policy(endpoint).delay_multiplier;
        let jitter = if self.config.jitter {
            0.5 + fastrand::f64()
        } else {
            1.0
        };
        self.backoff_delay(retry_count, multiplier, jitter, self.health.is_degraded())
    }

    /// Pure backoff arithmetic
    ///
    /// `initial * backoff^(retry_count - 1) * endpoint_multiplier`, capped at
    /// the maximum delay, then scaled by `jitter_factor` and doubled while
    /// degraded.
    pub fn backoff_delay(
        &self,
        retry_count: u32,
        endpoint_multiplier: f64,
        jitter_factor: f64,
        degraded: bool,
    ) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.config.initial_delay_secs
            * self.config.backoff_multiplier.powi(exponent)
            * endpoint_multiplier;
        let mut secs = base.min(self.config.max_delay_secs) * jitter_factor;
        if degraded {
            secs *= 2.0;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Widened timeout for a retry while degraded
    pub fn widened_timeout(&self, request: &FetchRequest) -> Duration {
        let current = request.timeout_override.unwrap_or(self.default_timeout);
        let multiplier = self.endpoint_policy(request.endpoint).timeout_multiplier;
        let widened = current.as_secs_f64() * multiplier;
        Duration::from_secs_f64(widened.min(self.config.max_timeout_secs).max(0.0))
    }
}

impl RetryStrategy for RetryPolicy {
    fn evaluate(&self, request: &FetchRequest, outcome: &FetchOutcome) -> RetryDecision {
        let failure = self.assess(outcome);
        self.health.record_outcome(failure.is_some());

        let failure = match failure {
            Some(failure) if failure.is_retryable() => failure,
            _ => return RetryDecision::Accept,
        };

        let next_retry = request.retry_count + 1;
        let max_retries = self.max_retries_for(request.endpoint);
        if next_retry > max_retries {
            return RetryDecision::Exhausted {
                attempts: next_retry,
                failure,
            };
        }

        let delay = self.compute_delay(next_retry, request.endpoint);
        let timeout = self
            .health
            .is_degraded()
            .then(|| self.widened_timeout(request));

        RetryDecision::Retry {
            request: request.retried(timeout),
            delay,
            failure,
        }
    }

    fn pacing_factor(&self) -> u32 {
        if self.health.is_degraded() {
            2
        } else {
            1
        }
    }
}
