//! Adaptive retry and server health engine
//!
//! Every fetch outcome passes through a [`RetryStrategy`] before the page
//! classifier sees it. The strategy records the outcome in the session's
//! [`HealthMonitor`], then decides whether the outcome is final, worth
//! another attempt after a backoff, or exhausted.

mod health;
mod policy;

pub use health::{
    HealthMonitor, HealthSnapshot, HealthState, HealthStatus, HealthTransition, OutcomeEvent,
};
pub use policy::RetryPolicy;

use crate::crawler::{FetchOutcome, FetchRequest, TransportFailureKind};
use std::fmt;
use std::time::Duration;

/// Why a 200 response was treated as a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentFailure {
    /// The body contains a configured failure phrase
    Phrase(String),
    /// Trimmed body length in characters
    TooShort(usize),
    /// Visible text length once markup is removed
    NoText(usize),
}

/// Failure taxonomy of a single outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport failure (timeouts, refused connections, DNS, tunnels)
    Transport(TransportFailureKind),
    /// Retryable HTTP status
    Server(u16),
    /// HTTP 200 carrying an error page
    Content(ContentFailure),
    /// Non-retryable HTTP status
    Status(u16),
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(kind) => kind.is_retryable(),
            Self::Server(_) | Self::Content(_) => true,
            Self::Status(_) => false,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(kind) => write!(f, "transport failure ({})", kind.as_str()),
            Self::Server(status) => write!(f, "server error (HTTP {})", status),
            Self::Content(ContentFailure::Phrase(phrase)) => {
                write!(f, "content error (phrase '{}')", phrase)
            }
            Self::Content(ContentFailure::TooShort(len)) => {
                write!(f, "content error (body of {} chars)", len)
            }
            Self::Content(ContentFailure::NoText(len)) => {
                write!(f, "content error ({} chars of text)", len)
            }
            Self::Status(status) => write!(f, "HTTP {}", status),
        }
    }
}

/// What to do with a fetch outcome
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Final outcome; hand it to the classifier
    Accept,
    /// Sleep for `delay`, then issue `request`
    Retry {
        request: FetchRequest,
        delay: Duration,
        failure: FailureKind,
    },
    /// Retry ceiling reached; abandon this branch
    Exhausted { attempts: u32, failure: FailureKind },
}

/// Retry capability injected into the orchestrator
pub trait RetryStrategy: Send + Sync {
    /// Records the outcome and decides what happens next
    fn evaluate(&self, request: &FetchRequest, outcome: &FetchOutcome) -> RetryDecision;

    /// Factor the orchestrator applies to its inter-request delay
    fn pacing_factor(&self) -> u32 {
        1
    }
}
