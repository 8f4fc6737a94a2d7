// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Interface to the path address table and the path MTU search.
//!
//! The MTU search itself (RFC 8899 style probing state machine) lives
//! with the path module; the transmission core emits the probes it
//! asks for and reports acknowledgment ranges back.

use core::time::Duration;

/// Outcome of the most recent probe round
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProbeStatus {
    /// The search wants to try a larger size later; re-probe on a
    /// long timer
    pub raise: bool,
    /// The search has converged for now
    pub complete: bool,
}

pub trait Controller {
    /// Reports an acknowledged packet number range.
    ///
    /// Returns true when the range covers an outstanding MTU probe,
    /// confirming the probed size.
    fn confirm_probe(&mut self, largest: u64, smallest: u64) -> bool;

    /// The currently confirmed path MTU
    fn current_mtu(&self) -> u16;

    /// State of the search after a confirmation
    fn probe_status(&mut self) -> ProbeStatus;

    /// The payload size the next probe should carry
    fn probe_size(&self) -> u16;

    /// How long to wait for a probe before trying again
    fn probe_timeout(&self) -> Duration;

    /// Records that a probe was sent as packet `number`.
    ///
    /// Returns a new segment size when this probe should already be
    /// reflected in packet sizing.
    fn on_probe_sent(&mut self, number: u64) -> Option<u16>;

    /// Promotes the validated alternate path to active
    fn swap_active(&mut self);

    /// Releases the superseded address after a migration
    fn free_old_address(&mut self);

    /// Resets the per-path send counter after a migration
    fn reset_sent_count(&mut self);

    /// Resets ECN probing on the (new) active path
    fn reset_ecn_probes(&mut self);

    /// Records that an ECN-marked packet was acknowledged, validating
    /// ECN on the active path
    fn on_ecn_acked(&mut self);

    /// True when the local endpoint initiated the migration (the
    /// source address changed rather than the destination)
    fn is_local_migration(&self) -> bool;
}
