// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Path MTU probing and connection migration.

use crate::{
    event::Event,
    frame::{Alt, Frame},
    outq::{Context, OutQueue},
    packet::Builder,
    path::Controller as _,
};

impl OutQueue {
    /// Emits one path MTU probe: a PING padded to the size the search
    /// wants to try next.
    ///
    /// Only runs on an established connection; during the handshake
    /// the path is still being validated anyway.
    pub fn transmit_probe<C: Context>(&mut self, ctx: &mut C) {
        ensure!(self.state.is_established());

        let size = ctx.path().probe_size();
        // the probe will carry the next number at the data level
        let number = ctx.pnmap(self.data_level).next_number();

        tracing::trace!(size, number, "transmitting path mtu probe");

        let frame = Frame::ping_sized(self.data_level, size);
        self.ctrl_tail(ctx, frame, false);

        if let Some(mss) = ctx.path().on_probe_sent(number) {
            ctx.packet().mss_update(mss);
            self.mtu = mss;
        }

        let timeout = ctx.path().probe_timeout();
        let now = ctx.now();
        self.path_timer.set(now + timeout);
    }

    /// Completes a path validation: migrates to the validated
    /// alternate path unless the application vetoes it.
    ///
    /// Returns the alternate mask that was retired, or `None` when the
    /// migration was vetoed.
    pub fn validate_path<C: Context>(&mut self, ctx: &mut C, frame: &mut Frame) -> Option<Alt> {
        let local = ctx.path().is_local_migration();

        ensure!(
            ctx.event_recv(Event::ConnectionMigration { local }).is_ok(),
            None
        );

        let alt = if local {
            ctx.path().swap_active();
            Alt::SRC
        } else {
            Alt::DST
        };

        tracing::debug!(local, "connection migrated to validated path");

        ctx.path().free_old_address();
        ctx.path().reset_sent_count();

        // frames queued for the alternate path now target the active
        // one
        for queued in self
            .control_list
            .iter_mut()
            .chain(self.transmitted_list.iter_mut())
        {
            queued.path_alt.clear(Alt::SRC | Alt::DST);
        }
        frame.path_alt.clear(Alt::SRC | Alt::DST);

        ctx.path().reset_ecn_probes();

        // start probing the new path
        let timeout = ctx.path().probe_timeout();
        let now = ctx.now();
        self.path_timer.set(now + timeout);

        Some(alt)
    }
}
