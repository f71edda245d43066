//! Delay schedule for manual recovery attempts.
//!
//! Each manual reconnect waits before it is issued. The delay starts at the
//! configured reconnect delay and is multiplied after every attempt that did
//! not lead to a success event, up to a cap:
//!
//! ```text
//! delay[n] = min(initial * multiplier^(n-1), max_delay)
//! ```
//!
//! With the default multiplier of `1.0` the delay is constant. A success
//! event resets the schedule.
//!
//! # Examples
//!
//! ```ignore
//! use std::time::Duration;
//!
//! let mut backoff = Backoff::new(Duration::from_secs(30), Duration::from_secs(300), 2.0);
//! assert_eq!(backoff.next_delay(), Duration::from_secs(30));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(60));
//!
//! backoff.reset();
//! assert_eq!(backoff.next_delay(), Duration::from_secs(30));
//! ```

use std::time::Duration;

/// Recovery delay controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// The delay before the first recovery attempt.
    initial_delay: Duration,

    /// The delay the next call to `next_delay` returns.
    current_delay: Duration,

    /// Cap for the growing delay.
    max_delay: Duration,

    /// Growth factor applied after each attempt. Values below 1.0 are treated as 1.0.
    multiplier: f64,

    /// Attempts handed out since the last reset.
    attempt: u32,
}

impl Backoff {
    /// Creates a schedule. `max` below `initial` is raised to `initial`.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier > 1.0 {
            multiplier
        } else {
            1.0
        };
        Self {
            initial_delay: initial,
            current_delay: initial,
            max_delay: max.max(initial),
            multiplier,
            attempt: 0,
        }
    }

    /// Constant delay: every attempt waits `delay`.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1.0)
    }

    /// Returns the delay for the next attempt and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.current_delay;

        let next_secs = self.current_delay.as_secs_f64() * self.multiplier;
        self.current_delay = Duration::from_secs_f64(next_secs.min(self.max_delay.as_secs_f64()));

        delay
    }

    /// Back to the initial delay. Called on every success event.
    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for Backoff {
    /// 30 seconds, constant.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_constant_thirty_seconds() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.attempt(), 2);
    }

    #[test]
    fn test_growth_and_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(35), 2.0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(20));
        assert_eq!(backoff.next_delay(), Duration::from_secs(35));
        assert_eq!(backoff.next_delay(), Duration::from_secs(35));
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 3.0);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current_delay(), Duration::from_secs(9));

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_degenerate_multiplier_is_constant() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(60), 0.5);
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));

        let mut nan = Backoff::new(Duration::from_secs(5), Duration::from_secs(60), f64::NAN);
        nan.next_delay();
        assert_eq!(nan.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_max_below_initial_is_raised() {
        let backoff = Backoff::new(Duration::from_secs(30), Duration::from_secs(10), 2.0);
        assert_eq!(backoff.max_delay(), Duration::from_secs(30));
    }
}
