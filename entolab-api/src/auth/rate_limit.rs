//! Login attempt throttling
//!
//! Keyed per username so online guessing against one account is slowed
//! regardless of source address. 5 attempts burst, one token refilled every
//! 30 seconds.

use governor::{DefaultKeyedRateLimiter, Quota};
use std::num::NonZeroU32;
use std::time::Duration;

/// Keyed rate limiter for login and recovery attempts
pub struct LoginLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl LoginLimiter {
    pub fn new() -> Self {
        let quota = Quota::with_period(Duration::from_secs(30))
            .expect("static non-zero period")
            .allow_burst(NonZeroU32::new(5).expect("static non-zero burst"));
        Self {
            limiter: DefaultKeyedRateLimiter::keyed(quota),
        }
    }

    /// Whether another attempt is allowed for this username right now
    pub fn check(&self, username: &str) -> bool {
        self.limiter.check_key(&username.to_string()).is_ok()
    }
}

impl Default for LoginLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_throttled() {
        let limiter = LoginLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("analyst"));
        }
        assert!(!limiter.check("analyst"));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = LoginLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("analyst"));
        }
        assert!(!limiter.check("analyst"));
        // A different account is unaffected
        assert!(limiter.check("examiner"));
    }
}
