// file: src/backoff.rs
// description: exponential retry delay schedule for the push transport

use std::time::Duration;

/// Derives the retry delay from the number of consecutive failures.
///
/// `delay(attempt) = min(initial * multiplier^attempt, max)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffSchedule {
    initial: Duration,
    multiplier: f64,
    max: Duration,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffSchedule {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            initial,
            // a multiplier below 1 would make the delay shrink with every failure
            multiplier: if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 },
            max: max.max(initial),
        }
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        let secs = self.initial.as_secs_f64() * factor;

        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        // from_secs_f64 panics on negatives
        Duration::from_secs_f64(secs.max(self.initial.as_secs_f64()))
    }
}

/// Attempt counter paired with its schedule; owned by the reconnection controller.
#[derive(Debug, Clone)]
pub struct Backoff {
    schedule: BackoffSchedule,
    attempt: u32,
}

impl Backoff {
    pub fn new(schedule: BackoffSchedule) -> Self {
        Self {
            schedule,
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Records a failure and returns the new attempt number with its delay.
    pub fn record_failure(&mut self) -> (u32, Duration) {
        self.attempt = self.attempt.saturating_add(1);
        (self.attempt, self.schedule.delay(self.attempt))
    }

    pub fn current_delay(&self) -> Duration {
        self.schedule.delay(self.attempt)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn schedule(&self) -> &BackoffSchedule {
        &self.schedule
    }
}
