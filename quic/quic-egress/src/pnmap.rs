// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-encryption-level packet number bookkeeping.
//!
//! One [`Map`] exists for each encryption level. It tracks the wire
//! bytes in flight, the next packet number to be assigned, and the
//! timestamps the loss engine consumes.

use crate::time::Timestamp;
use core::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct Map {
    next_number: u64,
    inflight: usize,
    loss_ts: Option<Timestamp>,
    last_sent_ts: Option<Timestamp>,
    max_pn_acked: u64,
    /// Age limit for retained packet-number records, refreshed on each
    /// RTT sample
    max_record_age: Option<Duration>,
}

impl Map {
    /// The next packet number the builder will assign at this level
    #[inline]
    pub fn next_number(&self) -> u64 {
        self.next_number
    }

    /// Wire bytes sent and not yet acknowledged or declared lost
    #[inline]
    pub fn inflight(&self) -> usize {
        self.inflight
    }

    /// The recorded loss deadline, if any
    #[inline]
    pub fn loss_ts(&self) -> Option<Timestamp> {
        self.loss_ts
    }

    #[inline]
    pub fn set_loss_ts(&mut self, ts: Option<Timestamp>) {
        self.loss_ts = ts;
    }

    /// When the most recent packet at this level was sent
    #[inline]
    pub fn last_sent_ts(&self) -> Option<Timestamp> {
        self.last_sent_ts
    }

    /// The largest packet number acknowledged at this level
    #[inline]
    pub fn max_pn_acked(&self) -> u64 {
        self.max_pn_acked
    }

    #[inline]
    pub fn set_max_record_age(&mut self, age: Duration) {
        self.max_record_age = Some(age);
    }

    #[inline]
    pub fn max_record_age(&self) -> Option<Duration> {
        self.max_record_age
    }

    /// Accounts for a transmitted packet carrying `len` wire bytes
    #[inline]
    pub fn on_packet_sent(&mut self, number: u64, len: usize, now: Timestamp) {
        self.next_number = self.next_number.max(number + 1);
        self.inflight += len;
        self.last_sent_ts = Some(now);
    }

    /// Accounts for an acknowledged packet number
    #[inline]
    pub fn on_packet_acked(&mut self, number: u64, len: usize) {
        self.max_pn_acked = self.max_pn_acked.max(number);
        self.dec_inflight(len);
    }

    /// Removes `len` wire bytes from flight.
    ///
    /// When the level fully drains, the recorded loss deadline no
    /// longer refers to anything and is dropped with it.
    #[inline]
    pub fn dec_inflight(&mut self, len: usize) {
        self.inflight = self.inflight.saturating_sub(len);
        if self.inflight == 0 {
            self.loss_ts = None;
        }
    }
}
