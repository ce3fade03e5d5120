//! Timing and termination policies of the status poller

use crate::{poller::TrackedSet, status::Status};
use rand::distributions::Distribution;
use std::{fmt, sync::Arc, time::Duration};

/// Exponentially growing delay.
///
/// Delay for attempt `n` is `first * factor^n`, capped at `max`, then
/// multiplied by a random number in range `[1, 1 + jitter]` and capped again.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub first: Duration,
    pub max: Duration,
    pub factor: f64,
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Rejects policies which can not produce a delay, e.g. NaN factor.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.factor.is_finite() || self.factor < 1.0 {
            anyhow::bail!(
                "backoff factor must be finite and at least 1, got {}",
                self.factor
            );
        }
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            anyhow::bail!(
                "backoff jitter must be finite and non-negative, got {}",
                self.jitter
            );
        }
        if self.first > self.max {
            anyhow::bail!(
                "first backoff delay {:?} exceeds maximum {:?}",
                self.first,
                self.max
            );
        }
        Ok(())
    }

    /// Delay before attempt number `attempt` (0-based).
    ///
    /// Invalid factor or jitter are treated as 1 and 0, and anything not
    /// representable as a `Duration` becomes `max`.
    pub fn next(&self, attempt: u32) -> Duration {
        let factor = if self.factor.is_finite() && self.factor >= 1.0 {
            self.factor
        } else {
            1.0
        };
        let exp = attempt.min(i32::MAX as u32) as i32;
        let base = self.scale(self.first, factor.powi(exp));
        if !self.jitter.is_finite() || self.jitter <= 0.0 {
            return base;
        }
        let dist = rand::distributions::Uniform::new_inclusive(1.0, 1.0 + self.jitter);
        self.scale(base, dist.sample(&mut rand::thread_rng()))
    }

    fn scale(&self, delay: Duration, by: f64) -> Duration {
        match Duration::try_from_secs_f64(delay.as_secs_f64() * by) {
            Ok(d) => d.min(self.max),
            Err(_) => self.max,
        }
    }
}

/// Delay between end of one poll cycle and start of the next one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PollInterval {
    Fixed(Duration),
    /// Grows while nothing changes, resets when some status changes
    Backoff(BackoffPolicy),
}

impl PollInterval {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            PollInterval::Fixed(_) => Ok(()),
            PollInterval::Backoff(b) => b.validate(),
        }
    }

    /// `quiet_cycles` is number of consecutive cycles without any change
    pub fn delay(&self, quiet_cycles: u32) -> Duration {
        match self {
            PollInterval::Fixed(d) => *d,
            PollInterval::Backoff(b) => b.next(quiet_cycles),
        }
    }
}

/// Decides when polling is finished successfully.
#[derive(Clone)]
pub enum StopCondition {
    /// Every object is `Current`
    AllCurrent,
    /// Every object is `NotFound`, e.g. after deletion
    AllNotFound,
    /// Every object was observed and none is `InProgress`
    NoneInProgress,
    /// Poll until cancelled or deadline
    Forever,
    Custom(Arc<dyn Fn(&TrackedSet) -> bool + Send + Sync>),
}

impl StopCondition {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&TrackedSet) -> bool + Send + Sync + 'static,
    {
        StopCondition::Custom(Arc::new(f))
    }

    pub fn is_satisfied(&self, tracked: &TrackedSet) -> bool {
        match self {
            StopCondition::AllCurrent => tracked.statuses().all(|(_, s)| s == Status::Current),
            StopCondition::AllNotFound => tracked.statuses().all(|(_, s)| s == Status::NotFound),
            StopCondition::NoneInProgress => tracked.is_fully_observed()
                && tracked.statuses().all(|(_, s)| s != Status::InProgress),
            StopCondition::Forever => false,
            StopCondition::Custom(f) => f(tracked),
        }
    }
}

impl fmt::Debug for StopCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCondition::AllCurrent => f.write_str("AllCurrent"),
            StopCondition::AllNotFound => f.write_str("AllNotFound"),
            StopCondition::NoneInProgress => f.write_str("NoneInProgress"),
            StopCondition::Forever => f.write_str("Forever"),
            StopCondition::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
