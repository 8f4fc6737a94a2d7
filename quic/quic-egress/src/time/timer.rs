// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::time::timestamp::Timestamp;
use core::task::Poll;

/// A timer owned by an individual component and explicitly polled.
///
/// Note: The timer doesn't implement Copy to ensure it isn't
///       accidentally moved and have the expiration discarded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timer {
    expiration: Option<Timestamp>,
}

impl Timer {
    /// Sets the timer to expire at the given timestamp
    #[inline]
    pub fn set(&mut self, time: Timestamp) {
        self.expiration = Some(time);
    }

    /// Arms the timer at the given timestamp, unless it is already
    /// armed at an earlier one.
    ///
    /// Lowering never pushes an armed deadline later.
    #[inline]
    pub fn reduce(&mut self, time: Timestamp) {
        let time = match self.expiration {
            Some(current) => current.min(time),
            None => time,
        };
        self.expiration = Some(time);
    }

    /// Cancels the timer.
    /// After cancellation, a timer will no longer report as expired.
    #[inline]
    pub fn cancel(&mut self) {
        self.expiration = None;
    }

    /// Returns true if the timer has expired
    #[inline]
    pub fn is_expired(&self, current_time: Timestamp) -> bool {
        match self.expiration {
            Some(timeout) => timeout.has_elapsed(current_time),
            _ => false,
        }
    }

    /// Returns true if the timer is armed
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.expiration.is_some()
    }

    /// Returns the armed expiration, if any
    #[inline]
    pub fn expiration(&self) -> Option<Timestamp> {
        self.expiration
    }

    /// Notifies the timer of the current time.
    /// If the timer's expiration occurs before the current time, it
    /// will be cancelled. The method returns whether the timer was
    /// expired and had been cancelled.
    #[inline]
    pub fn poll_expiration(&mut self, current_time: Timestamp) -> Poll<()> {
        if self.is_expired(current_time) {
            self.cancel();
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::clock::{Clock, NoopClock};
    use core::time::Duration;

    #[test]
    fn is_armed_test() {
        let now = NoopClock.get_time();
        let mut timer = Timer::default();

        assert!(!timer.is_armed());

        timer.set(now);
        assert!(timer.is_armed());

        timer.cancel();
        assert!(!timer.is_armed());
    }

    #[test]
    fn reduce_test() {
        let now = NoopClock.get_time();
        let mut timer = Timer::default();

        // reducing an unarmed timer arms it
        timer.reduce(now + Duration::from_millis(100));
        assert_eq!(timer.expiration(), Some(now + Duration::from_millis(100)));

        // a later deadline does not move an armed timer
        timer.reduce(now + Duration::from_millis(200));
        assert_eq!(timer.expiration(), Some(now + Duration::from_millis(100)));

        // an earlier deadline does
        timer.reduce(now + Duration::from_millis(50));
        assert_eq!(timer.expiration(), Some(now + Duration::from_millis(50)));
    }

    #[test]
    fn poll_expiration_test() {
        let mut now = NoopClock.get_time();
        let mut timer = Timer::default();

        timer.set(now + Duration::from_millis(100));

        assert!(!timer.poll_expiration(now).is_ready());
        assert!(timer.is_armed());

        now += Duration::from_millis(100);

        assert!(timer.poll_expiration(now).is_ready());
        assert!(!timer.is_armed());
    }
}
