// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::time::Timestamp;
use core::time::Duration;

/// A `Clock` is a source of [`Timestamp`]s
pub trait Clock {
    /// Returns the current time
    fn get_time(&self) -> Timestamp;
}

/// A clock which always returns a timestamp of 1us after the epoch.
/// Useful for tests which manage time themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopClock;

impl Clock for NoopClock {
    #[inline]
    fn get_time(&self) -> Timestamp {
        Timestamp::from_duration(Duration::from_micros(1))
    }
}

/// A monotonic clock backed by `std::time::Instant`
#[derive(Clone, Copy, Debug)]
pub struct StdClock {
    epoch: std::time::Instant,
}

impl Default for StdClock {
    fn default() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

impl Clock for StdClock {
    #[inline]
    fn get_time(&self) -> Timestamp {
        Timestamp::from_duration(self.epoch.elapsed() + Duration::from_micros(1))
    }
}
