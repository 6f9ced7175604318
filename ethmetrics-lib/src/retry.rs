//! Exponential backoff around fallible operations.
//!
//! A [`RetryPolicy`] is only a set of parameters; all mutable state (current delay, elapsed time) lives on the
//! stack of a single [`RetryPolicy::retry`] call. Two consecutive calls therefore never influence each other,
//! which is what lets the same policy guard the initial database connection and every collection cycle.

use std::time::Duration;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,

    /// Factor the delay grows by after each failed attempt.
    pub multiplier: f64,

    /// Upper bound of a single delay.
    pub max_delay: Duration,

    /// Upper bound of the whole retry sequence, measured from the first attempt.
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    /// Returns a policy with a 500ms initial delay growing by 1.5 up to 30s per delay.
    pub fn new(max_elapsed: Duration) -> Self {
        RetryPolicy {
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(30),
            max_elapsed,
        }
    }

    /// Calls `operation` until it succeeds, returning the last error once the next delay would exceed
    /// [`RetryPolicy::max_elapsed`].
    pub fn retry<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.retry_notify(operation, |_, _| {})
    }

    /// Same as [`RetryPolicy::retry`], calling `notify` with the error and the upcoming delay before each sleep.
    pub fn retry_notify<T, E, F, N>(&self, mut operation: F, mut notify: N) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        N: FnMut(&E, Duration),
    {
        let start = Instant::now();
        let mut delay = self.initial_delay;

        loop {
            let why = match operation() {
                Ok(value) => return Ok(value),
                Err(why) => why,
            };

            if start.elapsed() + delay > self.max_elapsed {
                return Err(why);
            }

            notify(&why, delay);
            std::thread::sleep(delay);

            delay = delay.mul_f64(self.multiplier).min(self.max_delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RetryPolicy;
    use std::cell::Cell;
    use std::time::Duration;
    use std::time::Instant;

    /// Tolerated oversleep of `std::thread::sleep`.
    const SLACK: Duration = Duration::from_millis(50);

    fn policy(max_elapsed_ms: u64) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(40),
            max_elapsed: Duration::from_millis(max_elapsed_ms),
        }
    }

    #[test]
    fn succeeds_after_failures() {
        let attempts = Cell::new(0);
        let result: Result<u32, &str> = policy(1_000).retry(|| {
            attempts.set(attempts.get() + 1);
            match attempts.get() {
                1 | 2 => Err("not yet"),
                n => Ok(n),
            }
        });

        assert_eq!(result, Ok(3));
    }

    #[test]
    fn terminates_with_last_error() {
        let attempts = Cell::new(0);
        let start = Instant::now();

        let result: Result<(), u32> = policy(200).retry(|| {
            attempts.set(attempts.get() + 1);
            Err(attempts.get())
        });

        // Each attempt is instant, hence the whole sequence stays within the budget plus scheduler slack
        assert!(start.elapsed() <= Duration::from_millis(200) + SLACK);
        assert_eq!(result, Err(attempts.get()));
        assert!(attempts.get() > 1);
    }

    #[test]
    fn bounded_by_slow_attempts() {
        let start = Instant::now();
        let attempt = Duration::from_millis(30);

        let result: Result<(), ()> = policy(100).retry(|| {
            std::thread::sleep(attempt);
            Err(())
        });

        assert!(result.is_err());
        assert!(start.elapsed() <= Duration::from_millis(100) + attempt + SLACK);
    }

    #[test]
    fn zero_budget_makes_single_attempt() {
        let attempts = Cell::new(0);
        let result: Result<(), ()> = policy(0).retry(|| {
            attempts.set(attempts.get() + 1);
            Err(())
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn delays_grow_and_cap() {
        let mut delays = Vec::new();
        let _: Result<(), ()> = policy(150).retry_notify(|| Err(()), |_, delay| delays.push(delay));

        assert_eq!(&delays[..3], &[Duration::from_millis(10), Duration::from_millis(20), Duration::from_millis(40)]);
        assert!(delays.iter().all(|delay| *delay <= Duration::from_millis(40)));
    }

    #[test]
    fn state_resets_between_calls() {
        let policy = policy(150);

        let mut first = Vec::new();
        let _: Result<(), ()> = policy.retry_notify(|| Err(()), |_, delay| first.push(delay));

        let mut second = Vec::new();
        let _: Result<(), ()> = policy.retry_notify(|| Err(()), |_, delay| second.push(delay));

        assert_eq!(first[0], Duration::from_millis(10));
        assert_eq!(second[0], Duration::from_millis(10));
    }
}
