//! Session-wide server health assessment
//!
//! One [`HealthMonitor`] is shared by every job of a crawl session. Reads
//! take a shared lock; each recorded outcome takes the write lock for the
//! append and the re-evaluation, so concurrent jobs never interleave halfway
//! through an update.

use crate::config::HealthConfig;
use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// One recorded fetch outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeEvent {
    pub at: Instant,
    pub is_failure: bool,
}

/// Mutable health data guarded by the monitor
#[derive(Debug, Clone)]
pub struct HealthState {
    pub consecutive_failures: u32,
    pub last_success: Instant,
    pub window: VecDeque<OutcomeEvent>,
    pub degraded: bool,
}

impl HealthState {
    fn new(now: Instant, capacity: usize) -> Self {
        Self {
            consecutive_failures: 0,
            last_success: now,
            window: VecDeque::with_capacity(capacity),
            degraded: false,
        }
    }

    /// Failures among the most recent `recent_window` events, and the
    /// number of events looked at
    fn recent_failures(&self, recent_window: usize) -> (usize, usize) {
        let considered = recent_window.min(self.window.len());
        let failures = self
            .window
            .iter()
            .rev()
            .take(considered)
            .filter(|event| event.is_failure)
            .count();
        (failures, considered)
    }

    fn evaluate(&self, config: &HealthConfig, now: Instant) -> bool {
        if self.window.len() < config.min_samples {
            return self.degraded;
        }

        let (failures, considered) = self.recent_failures(config.recent_window);
        let failure_rate = if considered == 0 {
            0.0
        } else {
            failures as f64 / considered as f64
        };
        let silence = now.saturating_duration_since(self.last_success);

        failure_rate > config.failure_rate_threshold
            || self.consecutive_failures > config.max_consecutive_failures
            || silence > Duration::from_secs(config.max_silence_secs)
    }
}

/// Edge of the degraded flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Degraded,
    Recovered,
}

/// Coarse health status for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Not enough samples yet
    Unknown,
    Healthy,
    Degraded,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
        }
    }
}

/// Point-in-time view of the health state
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub failure_rate: f64,
    pub recent_failures: usize,
    pub consecutive_failures: u32,
    pub sample_size: usize,
    pub since_last_success: Duration,
}

/// Shared health monitor
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    state: RwLock<HealthState>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Creates a monitor whose "last success" starts at `now`
    pub fn starting_at(config: HealthConfig, now: Instant) -> Self {
        let state = HealthState::new(now, config.window_size);
        Self {
            config,
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HealthState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HealthState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a fetch outcome and re-evaluates the degraded flag
    ///
    /// # Returns
    ///
    /// The transition caused by this outcome, if the flag changed
    pub fn record_outcome(&self, is_failure: bool) -> Option<HealthTransition> {
        self.record_outcome_at(is_failure, Instant::now())
    }

    /// Same as [`record_outcome`](Self::record_outcome) with an explicit clock
    pub fn record_outcome_at(&self, is_failure: bool, now: Instant) -> Option<HealthTransition> {
        let mut state = self.write();

        state.window.push_back(OutcomeEvent { at: now, is_failure });
        while state.window.len() > self.config.window_size {
            state.window.pop_front();
        }

        if is_failure {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        } else {
            state.consecutive_failures = 0;
            state.last_success = now;
        }

        let was_degraded = state.degraded;
        state.degraded = state.evaluate(&self.config, now);

        let transition = match (was_degraded, state.degraded) {
            (false, true) => Some(HealthTransition::Degraded),
            (true, false) => Some(HealthTransition::Recovered),
            _ => None,
        };

        if let Some(transition) = transition {
            let (failures, considered) = state.recent_failures(self.config.recent_window);
            let silence = now.saturating_duration_since(state.last_success);
            match transition {
                HealthTransition::Degraded => tracing::warn!(
                    "Server degraded: {}/{} recent failures, {} consecutive, {:?} since last success",
                    failures,
                    considered,
                    state.consecutive_failures,
                    silence
                ),
                HealthTransition::Recovered => tracing::info!(
                    "Server recovered: {}/{} recent failures",
                    failures,
                    considered
                ),
            }
        }

        transition
    }

    pub fn is_degraded(&self) -> bool {
        self.read().degraded
    }

    /// Number of outcomes currently held in the window
    pub fn window_len(&self) -> usize {
        self.read().window.len()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> HealthSnapshot {
        let state = self.read();
        let (recent_failures, considered) = state.recent_failures(self.config.recent_window);
        let failure_rate = if considered == 0 {
            0.0
        } else {
            recent_failures as f64 / considered as f64
        };

        let status = if state.degraded {
            HealthStatus::Degraded
        } else if state.window.len() < self.config.min_samples {
            HealthStatus::Unknown
        } else {
            HealthStatus::Healthy
        };

        HealthSnapshot {
            status,
            failure_rate,
            recent_failures,
            consecutive_failures: state.consecutive_failures,
            sample_size: state.window.len(),
            since_last_success: now.saturating_duration_since(state.last_success),
        }
    }
}
