// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Interface to the congestion controller.
//!
//! The transmission core feeds acknowledgment and timeout signals to
//! an implementation and mirrors its window into the send path. The
//! algorithm (Reno, CUBIC, BBR, ...) is the implementation's business.

use crate::time::Timestamp;
use core::time::Duration;

pub trait Controller {
    /// Feeds one RTT sample, taken from the newest acknowledged packet
    fn on_rtt_sample(&mut self, transmit_ts: Timestamp, now: Timestamp, ack_delay: Duration);

    /// Current retransmission timeout
    fn rto(&self) -> Duration;

    /// Base period for the loss timer; scaled by consecutive
    /// retransmission timeouts without progress
    fn duration(&self) -> Duration;

    /// Current congestion window in bytes
    fn window(&self) -> usize;

    /// Acknowledgment-driven window update.
    ///
    /// `number` and `transmit_ts` identify the most recent packet
    /// retired by this acknowledgment; `inflight` is the payload still
    /// outstanding after retiring it.
    fn on_ack(
        &mut self,
        number: u64,
        transmit_ts: Timestamp,
        bytes_acked: usize,
        inflight: usize,
        now: Timestamp,
    );

    /// Loss-driven window update for a packet declared lost.
    ///
    /// `last` is the newest packet number in flight when the loss was
    /// detected.
    fn on_timeout(&mut self, number: u64, transmit_ts: Timestamp, last: u64, now: Timestamp);
}
