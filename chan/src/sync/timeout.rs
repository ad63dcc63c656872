//! Wait policies for blocking channel operations.

use std::time::Duration;

use minstant::Instant;

/// Timeout specification for blocking operations.
///
/// `Duration(Duration::ZERO)` (also [`Timeout::ZERO`]) is a non-blocking
/// probe: the operation either completes immediately or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Wait indefinitely.
    #[default]
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl Timeout {
    /// Do not wait at all.
    pub const ZERO: Self = Self::Duration(Duration::ZERO);

    /// Maps the integer millisecond convention used by host bindings:
    /// negative blocks forever, zero is non-blocking, positive waits that long.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        if millis < 0 {
            Self::Infinite
        } else {
            Self::Duration(Duration::from_millis(millis.unsigned_abs()))
        }
    }

    /// Returns `true` if this timeout never waits.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        matches!(self, Self::Duration(d) if d.is_zero())
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

/// What a waiter should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    /// Block until notified.
    Forever,
    /// Block until notified or the duration elapses.
    For(Duration),
    /// Deadline passed; give up.
    Expired,
}

/// Absolute deadline derived from a [`Timeout`] at the start of an operation.
///
/// Each wakeup recomputes the remaining time, so spurious or stolen wakeups
/// never extend the total wait.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub(crate) fn after(timeout: Timeout) -> Self {
        match timeout {
            Timeout::Infinite => Self(None),
            // Too far out to represent: treat as never expiring.
            Timeout::Duration(d) => Self(Instant::now().checked_add(d)),
        }
    }

    pub(crate) fn remaining(&self) -> Wait {
        match self.0 {
            None => Wait::Forever,
            Some(dl) => match dl.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => Wait::For(remaining),
                _ => Wait::Expired,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_millis_convention() {
        assert_eq!(Timeout::from_millis(-1), Timeout::Infinite);
        assert_eq!(Timeout::from_millis(i64::MIN), Timeout::Infinite);
        assert_eq!(Timeout::from_millis(0), Timeout::ZERO);
        assert_eq!(
            Timeout::from_millis(250),
            Timeout::Duration(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_is_zero() {
        assert!(Timeout::ZERO.is_zero());
        assert!(!Timeout::Infinite.is_zero());
        assert!(!Timeout::from(Duration::from_nanos(1)).is_zero());
    }

    #[test]
    fn test_zero_deadline_is_expired() {
        assert_eq!(Deadline::after(Timeout::ZERO).remaining(), Wait::Expired);
    }

    #[test]
    fn test_infinite_deadline_never_expires() {
        assert_eq!(Deadline::after(Timeout::Infinite).remaining(), Wait::Forever);
    }

    #[test]
    fn test_finite_deadline_counts_down() {
        let deadline = Deadline::after(Timeout::from_millis(10_000));
        match deadline.remaining() {
            Wait::For(d) => assert!(d <= Duration::from_secs(10)),
            other => panic!("expected a finite wait, got {other:?}"),
        }
    }

    #[test]
    fn test_huge_deadline_saturates() {
        let deadline = Deadline::after(Timeout::Duration(Duration::MAX));
        assert_eq!(deadline.remaining(), Wait::Forever);
    }

    #[test]
    fn test_short_deadline_expires() {
        let deadline = Deadline::after(Timeout::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(deadline.remaining(), Wait::Expired);
    }
}
