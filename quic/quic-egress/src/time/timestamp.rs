// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::{fmt, num::NonZeroU64, ops, time::Duration};

/// An absolute point in time.
///
/// The absolute value of `Timestamp`s should be treated as opaque. It
/// is not necessarily related to any calendar time. `Timestamp`s
/// should only be compared if they are sourced from the same clock.
#[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
pub struct Timestamp(NonZeroU64);

/// A prechecked 1us value
const ONE_MICROSECOND: NonZeroU64 = match NonZeroU64::new(1) {
    Some(value) => value,
    None => unreachable!(),
};

impl Timestamp {
    /// Creates a `Timestamp` from a `Duration` since the time source's
    /// epoch. This will treat the duration as an absolute point in
    /// time.
    #[inline]
    pub fn from_duration(duration: Duration) -> Self {
        debug_assert!(duration.as_micros() <= u64::MAX.into());
        let micros = duration.as_micros() as u64;
        // if the value is 0 then round up to 1us after the epoch
        let micros = NonZeroU64::new(micros).unwrap_or(ONE_MICROSECOND);
        Self(micros)
    }

    /// Converts the `Timestamp` into the `Duration` since the time
    /// source's epoch.
    #[inline]
    pub fn as_duration(self) -> Duration {
        Duration::from_micros(self.0.get())
    }

    /// Tries to calculate a `Timestamp` based on the current one plus
    /// the provided `Duration`
    #[inline]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        self.as_duration()
            .checked_add(duration)
            .map(Self::from_duration)
    }

    /// Tries to calculate a `Timestamp` based on the current one minus
    /// the provided `Duration`
    #[inline]
    pub fn checked_sub(self, duration: Duration) -> Option<Self> {
        self.as_duration()
            .checked_sub(duration)
            .map(Self::from_duration)
    }

    /// Returns the `Duration` which elapsed since an earlier
    /// `Timestamp`. If `earlier` is more recent, a `Duration` of 0 is
    /// returned.
    #[inline]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        self.as_duration().saturating_sub(earlier.as_duration())
    }

    /// Returns whether this `Timestamp` lies at or before
    /// `current_time`
    #[inline]
    pub fn has_elapsed(self, current_time: Timestamp) -> bool {
        self <= current_time
    }
}

impl ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        self.checked_add(rhs)
            .expect("timestamp addition overflowed")
    }
}

impl ops::AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl ops::Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Timestamp({:?})", self.as_duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let base = Timestamp::from_duration(Duration::from_millis(100));
        let later = base + Duration::from_millis(50);

        assert_eq!(later - base, Duration::from_millis(50));
        // saturates instead of going negative
        assert_eq!(base - later, Duration::ZERO);
        assert!(base.has_elapsed(later));
        assert!(!later.has_elapsed(base));
    }

    #[test]
    fn zero_rounds_up() {
        // the epoch itself is not representable; it rounds to 1us
        let ts = Timestamp::from_duration(Duration::ZERO);
        assert_eq!(ts.as_duration(), Duration::from_micros(1));
    }
}
