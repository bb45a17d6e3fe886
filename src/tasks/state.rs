//! # Result of one entry-point invocation.
//!
//! Every invocation yields exactly one [`StateResult`]; the scheduler never
//! infers an outcome on its own.
//!
//! ```text
//! Defer(None)      → re-enqueued at the back of the ready queue (cooperative yield)
//! Defer(Some(d))   → parked in the deferred set until now + d
//! Complete         → terminal, task destroyed
//! Errored          → terminal, task destroyed
//! ```

use std::time::Duration;

/// What the scheduler should do with the task after this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Run again later, optionally after a delay.
    Defer(Option<Duration>),
    /// Finished successfully.
    Complete,
    /// Finished unsuccessfully.
    Errored,
}

/// Next entry point plus outcome.
///
/// `next` is ignored for terminal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateResult {
    /// Index of the entry point to run on the next invocation.
    pub next: usize,
    /// Outcome of this invocation.
    pub outcome: Outcome,
}

impl StateResult {
    /// Yield and run entry point `next` as soon as a worker is free.
    pub const fn defer(next: usize) -> Self {
        Self {
            next,
            outcome: Outcome::Defer(None),
        }
    }

    /// Run entry point `next` after `delay`.
    pub const fn defer_for(next: usize, delay: Duration) -> Self {
        Self {
            next,
            outcome: Outcome::Defer(Some(delay)),
        }
    }

    /// Terminal success.
    pub const fn complete() -> Self {
        Self {
            next: 0,
            outcome: Outcome::Complete,
        }
    }

    /// Terminal failure.
    pub const fn errored() -> Self {
        Self {
            next: 0,
            outcome: Outcome::Errored,
        }
    }

    /// True for `Complete` and `Errored`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.outcome, Outcome::Defer(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(StateResult::defer(1).outcome, Outcome::Defer(None));
        assert_eq!(
            StateResult::defer_for(2, Duration::from_millis(5)),
            StateResult {
                next: 2,
                outcome: Outcome::Defer(Some(Duration::from_millis(5)))
            }
        );
        assert!(StateResult::complete().is_terminal());
        assert!(StateResult::errored().is_terminal());
        assert!(!StateResult::defer(0).is_terminal());
    }
}
