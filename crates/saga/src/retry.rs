//! Step failure classification and retry policies.

use std::time::Duration;

use thiserror::Error;

/// Classifies a collaborator failure for the step executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transient infrastructure failure; the step may be re-attempted.
    Retryable,

    /// Business-rule failure (insufficient stock, declined payment,
    /// record not found); re-attempting cannot succeed.
    Terminal,
}

/// An error returned by a collaborator call.
///
/// The saga never inspects collaborator-specific detail beyond the
/// kind and the human-readable message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StepError {
    /// Whether the failure is worth retrying.
    pub kind: FailureKind,
    /// Human-readable description of the failure.
    pub message: String,
}

impl StepError {
    /// Creates a retryable (transient) failure.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Retryable,
            message: message.into(),
        }
    }

    /// Creates a terminal (business-rule) failure.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Terminal,
            message: message.into(),
        }
    }

    /// Returns true if re-attempting cannot succeed.
    pub fn is_terminal(&self) -> bool {
        self.kind == FailureKind::Terminal
    }
}

/// Bounded-retry policy with exponential backoff.
///
/// Attempt `n` (1-based) that fails retryably is followed by a delay of
/// `min(initial_interval * backoff_coefficient^(n-1), max_interval)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_interval: Duration,
    /// Upper bound on the delay between attempts.
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_coefficient: f64,
    /// Heartbeat timeout carried for long-running collaborator calls.
    ///
    /// Not enforced by the in-process executor: steps are never preempted
    /// mid-call, so a slow collaborator is only abandoned between attempts.
    pub heartbeat_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Creates a policy with the given bounds and no heartbeat.
    pub fn new(
        max_attempts: u32,
        initial_interval: Duration,
        max_interval: Duration,
        backoff_coefficient: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_interval,
            max_interval,
            backoff_coefficient,
            heartbeat_timeout: None,
        }
    }

    /// Returns the delay to sleep after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        // Clamp as f64: the uncapped value can overflow what Duration
        // accepts for late attempts under a large coefficient.
        Duration::from_secs_f64(scaled.min(self.max_interval.as_secs_f64()))
    }

    /// Policy for payment collaborator calls.
    pub fn payment() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(10), 2.0)
    }

    /// Policy for inventory collaborator calls.
    pub fn inventory() -> Self {
        Self::new(5, Duration::from_millis(500), Duration::from_secs(5), 1.5)
    }

    /// Policy for shipping collaborator calls.
    pub fn shipping() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(20), 2.0)
    }

    /// Policy for notification collaborator calls.
    pub fn notification() -> Self {
        let mut policy = Self::new(5, Duration::from_secs(1), Duration::from_secs(10), 1.5);
        policy.heartbeat_timeout = Some(Duration::from_secs(10));
        policy
    }

    /// Policy for order repository calls.
    pub fn database() -> Self {
        Self::new(5, Duration::from_millis(500), Duration::from_secs(5), 1.5)
    }

    /// Policy for receipt generation and storage calls.
    pub fn file_storage() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(20), 2.0)
    }
}
