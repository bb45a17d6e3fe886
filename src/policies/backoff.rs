//! # Backoff between conversation polls.
//!
//! A task waiting for a reply defers with a delay computed from how many times
//! it has already polled. The delay for poll `n` is `first × factor^n`, clamped
//! to `max`, then jittered. The base never depends on a previous jittered value.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use parley::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(10),
//!     max: Duration::from_millis(100),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(10));
//! assert_eq!(backoff.next(2), Duration::from_millis(40));
//! assert_eq!(backoff.next(8), Duration::from_millis(100));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Poll backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the second poll.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter applied after clamping.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant 100ms, capped at 30s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the `polls`-th unsuccessful poll (0-indexed).
    pub fn next(&self, polls: u32) -> Duration {
        let exp = polls.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling() -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(10),
            max: Duration::from_secs(1),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_doubles_until_cap() {
        let p = doubling();
        assert_eq!(p.next(0), Duration::from_millis(10));
        assert_eq!(p.next(1), Duration::from_millis(20));
        assert_eq!(p.next(3), Duration::from_millis(80));
        assert_eq!(p.next(7), Duration::from_secs(1));
        assert_eq!(p.next(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_default_is_constant() {
        let p = BackoffPolicy::default();
        assert_eq!(p.next(0), p.next(9));
    }

    #[test]
    fn test_first_above_max_is_clamped() {
        let p = BackoffPolicy {
            first: Duration::from_secs(5),
            ..doubling()
        };
        assert_eq!(p.next(0), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let p = BackoffPolicy {
            jitter: JitterPolicy::Full,
            ..doubling()
        };
        for polls in 0..20 {
            assert!(p.next(polls) <= Duration::from_secs(1));
        }
    }
}
