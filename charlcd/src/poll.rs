//! Busy-poll pacing strategies.
//!
//! The write path polls the controller's busy flag until it clears. The
//! protocol itself puts no bound on that wait; the strategy seam lets
//! callers and tests substitute a capped one.

use crate::{LcdError, LcdResult};
use std::fmt::Debug;

/// Decides whether another busy-flag poll may run.
pub trait PollStrategy: Debug {
    /// Called before each status poll; `polls` counts completed polls.
    /// Returning an error aborts the wait.
    fn check(&self, polls: u32) -> LcdResult<()>;
}

/// Polls until the controller reports ready, with no bound.
///
/// This is the literal protocol contract: completion is paced by the
/// controller, and an unresponsive controller blocks the caller.
#[derive(Debug, Default)]
pub struct SpinPoll;

impl PollStrategy for SpinPoll {
    fn check(&self, _polls: u32) -> LcdResult<()> {
        Ok(())
    }
}

/// Gives up with [`LcdError::Busy`] after `limit` polls.
#[derive(Debug)]
pub struct BoundedPoll {
    limit: u32,
}

impl BoundedPoll {
    pub fn new(limit: u32) -> Self {
        BoundedPoll { limit }
    }
}

impl PollStrategy for BoundedPoll {
    fn check(&self, polls: u32) -> LcdResult<()> {
        if polls >= self.limit {
            return Err(LcdError::Busy);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_never_gives_up() {
        assert!(SpinPoll.check(u32::MAX).is_ok());
    }

    #[test]
    fn bounded_gives_up_at_the_limit() {
        let poll = BoundedPoll::new(3);
        assert!(poll.check(0).is_ok());
        assert!(poll.check(2).is_ok());
        assert_eq!(poll.check(3).unwrap_err(), LcdError::Busy);
    }
}
