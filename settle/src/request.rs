//! Wait requests and their polling cadence.
//!
//! A [`WaitRequest`] bundles a predicate with validated [`WaitSettings`] and an
//! optional cancellation token. Validation happens when settings are built, so a
//! request that exists is always well formed and no predicate is ever evaluated
//! for a malformed one.

use crate::error::WaitError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cap on the backoff exponent so repeated multiplication stays finite.
const MAX_BACKOFF_EXPONENT: u32 = 64;

/// How the sleep between two predicate evaluations is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PollPolicy {
    /// Sleep the poll interval between every evaluation
    #[default]
    Fixed,
    /// Start at the poll interval and grow by `factor` up to `max_interval`
    Backoff { factor: f64, max_interval: Duration },
}

/// Validated polling cadence for a wait.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitSettings {
    poll_interval: Duration,
    timeout: Duration,
    policy: PollPolicy,
}

impl WaitSettings {
    /// Build settings with the fixed polling policy.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::InvalidArgument`] if either duration is zero.
    pub fn new(poll_interval: Duration, timeout: Duration) -> Result<Self, WaitError> {
        if poll_interval.is_zero() {
            return Err(WaitError::invalid("poll interval must be greater than zero"));
        }
        if timeout.is_zero() {
            return Err(WaitError::invalid("timeout must be greater than zero"));
        }
        Ok(Self {
            poll_interval,
            timeout,
            policy: PollPolicy::Fixed,
        })
    }

    /// Build settings from signed millisecond values, as read from config or the CLI.
    pub fn from_millis(poll_interval_ms: i64, timeout_ms: i64) -> Result<Self, WaitError> {
        let poll_interval = positive_millis("poll interval", poll_interval_ms)?;
        let timeout = positive_millis("timeout", timeout_ms)?;
        Self::new(poll_interval, timeout)
    }

    /// Replace the polling policy, validating backoff parameters.
    pub fn with_policy(mut self, policy: PollPolicy) -> Result<Self, WaitError> {
        if let PollPolicy::Backoff {
            factor,
            max_interval,
        } = policy
        {
            if !factor.is_finite() || factor < 1.0 {
                return Err(WaitError::invalid(format!(
                    "backoff factor must be a finite number >= 1.0, got {factor}"
                )));
            }
            if max_interval < self.poll_interval {
                return Err(WaitError::invalid(format!(
                    "max interval {max_interval:?} is shorter than poll interval {:?}",
                    self.poll_interval
                )));
            }
        }
        self.policy = policy;
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Longest sleep this cadence can produce. A timed-out wait ends no later
    /// than `timeout + max_sleep` plus the cost of the last evaluation.
    pub fn max_sleep(&self) -> Duration {
        match self.policy {
            PollPolicy::Fixed => self.poll_interval,
            PollPolicy::Backoff { max_interval, .. } => max_interval,
        }
    }

    /// Sleep to take after `completed_polls` evaluations (1-based).
    pub fn delay_after(&self, completed_polls: u32) -> Duration {
        match self.policy {
            PollPolicy::Fixed => self.poll_interval,
            PollPolicy::Backoff {
                factor,
                max_interval,
            } => {
                let exponent = completed_polls.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
                let scaled = self.poll_interval.as_nanos() as f64 * factor.powi(exponent as i32);
                if scaled.is_finite() && scaled < max_interval.as_nanos() as f64 {
                    Duration::from_nanos(scaled.round() as u64).max(self.poll_interval)
                } else {
                    max_interval
                }
            }
        }
    }
}

pub(crate) fn positive_millis(name: &str, value: i64) -> Result<Duration, WaitError> {
    u64::try_from(value)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .ok_or_else(|| WaitError::invalid(format!("{name} must be positive, got {value}ms")))
}

/// A predicate plus everything needed to poll it. Immutable once built.
pub struct WaitRequest<P> {
    pub(crate) predicate: P,
    pub(crate) settings: WaitSettings,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl<P> WaitRequest<P> {
    /// Create a request polling `predicate` every `poll_interval` for at most `timeout`.
    pub fn new(predicate: P, poll_interval: Duration, timeout: Duration) -> Result<Self, WaitError> {
        Ok(Self::from_settings(
            predicate,
            WaitSettings::new(poll_interval, timeout)?,
        ))
    }

    pub fn from_settings(predicate: P, settings: WaitSettings) -> Self {
        Self {
            predicate,
            settings,
            cancellation: None,
        }
    }

    /// Attach a cancellation signal. Cancelling it resolves the wait with `Cancelled`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Result<Self, WaitError> {
        self.settings = self.settings.with_policy(policy)?;
        Ok(self)
    }

    pub fn settings(&self) -> &WaitSettings {
        &self.settings
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }
}

impl<P> std::fmt::Debug for WaitRequest<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitRequest")
            .field("settings", &self.settings)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}
