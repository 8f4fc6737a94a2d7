// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The transmit pump: pulls frames off the outbound lists, applies
//! per-level and flow-control gating, and drives the packet builder.

use crate::{
    frame::Frame,
    level::EncryptionLevel,
    outq::{Context, OutQueue},
    packet::{Builder, Decision},
};

impl OutQueue {
    /// Runs one transmit cycle: control, datagram and stream passes,
    /// one catch-up control pass if the flow gate produced a BLOCKED
    /// frame mid-cycle, then a flush.
    ///
    /// Returns whether any frame reached the wire.
    pub fn transmit<C: Context>(&mut self, ctx: &mut C) -> bool {
        let before = self.tx_seq;

        self.transmit_ctrl(ctx);
        self.transmit_dgram(ctx);
        self.transmit_stream(ctx);

        // a BLOCKED frame produced by the flow gate ships in the same
        // cycle
        if core::mem::take(&mut self.ctrl_pending) {
            self.transmit_ctrl(ctx);
        }

        self.flush_packets(ctx);

        for level in EncryptionLevel::ALL {
            self.update_loss_timer(ctx, level);
        }

        self.tx_seq > before
    }

    /// Control pass.
    ///
    /// Stops when crypto for a frame's level is not ready, since later
    /// frames may depend on it going first.
    fn transmit_ctrl<C: Context>(&mut self, ctx: &mut C) {
        let mut i = 0;
        while i < self.control_list.len() {
            let (level, path_alt) = {
                let frame = &self.control_list[i];
                (frame.level, frame.path_alt)
            };

            ensure!(ctx.crypto_send_ready(level));

            match ctx.packet().config(level, path_alt) {
                Decision::Filtered => {
                    i += 1;
                    continue;
                }
                Decision::Stop => return,
                Decision::Proceed => {}
            }

            let frame = self.control_list.remove(i).expect("index in bounds");
            match ctx.packet().tail(frame, false) {
                // packed; the next frame shifts into `i`
                Ok(()) => {}
                Err(frame) => {
                    // the packet is full: cut it and retry this frame
                    self.control_list.insert(i, frame);
                    // a builder that is full with nothing pending
                    // cannot make progress on this frame
                    ensure!(self.packet_create(ctx));
                }
            }
        }
    }

    /// Datagram pass; bounded by the congestion window
    fn transmit_dgram<C: Context>(&mut self, ctx: &mut C) {
        ensure!(ctx.crypto_send_ready(self.data_level));

        let mut i = 0;
        while i < self.datagram_list.len() {
            let (level, path_alt, len, bytes) = {
                let frame = &self.datagram_list[i];
                (frame.level, frame.path_alt, frame.len, frame.bytes)
            };

            ensure!(self.data_inflight + len <= self.window);

            match ctx.packet().config(level, path_alt) {
                Decision::Filtered => {
                    i += 1;
                    continue;
                }
                Decision::Stop => return,
                Decision::Proceed => {}
            }

            let frame = self.datagram_list.remove(i).expect("index in bounds");
            match ctx.packet().tail(frame, true) {
                Ok(()) => {
                    self.data_inflight += bytes;
                }
                Err(frame) => {
                    self.datagram_list.insert(i, frame);
                    ensure!(self.packet_create(ctx));
                }
            }
        }
    }

    /// Stream pass; every frame clears the flow-control gate first
    fn transmit_stream<C: Context>(&mut self, ctx: &mut C) {
        ensure!(ctx.crypto_send_ready(self.data_level));

        let mut i = 0;
        while i < self.stream_list.len() {
            ensure!(!self.flow_control_blocked(ctx, i));

            let (level, path_alt, bytes, id) = {
                let frame = &self.stream_list[i];
                (frame.level, frame.path_alt, frame.bytes, frame.stream)
            };

            match ctx.packet().config(level, path_alt) {
                Decision::Filtered => {
                    i += 1;
                    continue;
                }
                Decision::Stop => return,
                Decision::Proceed => {}
            }

            let frame = self.stream_list.remove(i).expect("index in bounds");
            match ctx.packet().tail(frame, false) {
                Ok(()) => {
                    if bytes > 0 {
                        if let Some(stream) = id.and_then(|id| ctx.stream(id)) {
                            stream.frags += 1;
                            stream.bytes += bytes as u64;
                        }
                        self.bytes += bytes as u64;
                        self.data_inflight += bytes;
                    }
                }
                Err(frame) => {
                    self.stream_list.insert(i, frame);
                    ensure!(self.packet_create(ctx));
                }
            }
        }
    }

    /// Checks a pending stream frame against the congestion window
    /// and both flow control levels, producing BLOCKED signals when a
    /// window (not congestion) is the limiter.
    ///
    /// A BLOCKED frame is produced at most once per limit value: the
    /// recorded `last_max_bytes` has to fall behind the current limit
    /// again before another one is sent.
    fn flow_control_blocked<C: Context>(&mut self, ctx: &mut C, index: usize) -> bool {
        let (len, id, level) = {
            let frame = &self.stream_list[index];
            (frame.bytes, frame.stream, frame.level)
        };

        // non-1-RTT stream data is not subject to these windows
        ensure!(level.is_application_data(), false);

        // pure congestion stalls are silent
        ensure!(self.data_inflight + len <= self.window, true);

        let mut blocked = false;
        let mut produced = false;

        if let Some(stream) = id.and_then(|id| ctx.stream(id)) {
            if stream.bytes + len as u64 > stream.max_bytes {
                blocked = true;
                if !stream.data_blocked && stream.last_max_bytes < stream.max_bytes {
                    stream.data_blocked = true;
                    stream.last_max_bytes = stream.max_bytes;
                    let frame = Frame::stream_data_blocked(stream.id(), stream.max_bytes);
                    self.sndbuf.charge(frame.len);
                    Self::insert_by_level(&mut self.control_list, frame);
                    produced = true;
                }
            }
        }

        if self.bytes + len as u64 > self.max_bytes {
            blocked = true;
            if !self.data_blocked && self.last_max_bytes < self.max_bytes {
                self.data_blocked = true;
                self.last_max_bytes = self.max_bytes;
                let frame = Frame::data_blocked(self.max_bytes);
                self.sndbuf.charge(frame.len);
                Self::insert_by_level(&mut self.control_list, frame);
                produced = true;
            }
        }

        if produced {
            self.ctrl_pending = true;
        }

        blocked
    }

    /// Cuts the current packet and tracks its frames.
    ///
    /// Returns false when the builder had nothing pending, so callers
    /// can skip a frame that will never fit instead of spinning.
    pub(crate) fn packet_create<C: Context>(&mut self, ctx: &mut C) -> bool {
        let frames = ctx.packet().create();
        let created = !frames.is_empty();
        for frame in frames {
            self.transmitted_tail(ctx, frame);
        }
        created
    }

    /// Emits whatever the builder still holds and tracks the frames
    pub(crate) fn flush_packets<C: Context>(&mut self, ctx: &mut C) -> bool {
        let frames = ctx.packet().flush();
        let flushed = !frames.is_empty();
        for frame in frames {
            self.transmitted_tail(ctx, frame);
        }
        flushed
    }

    /// Loss-timer fire handler for `level`.
    ///
    /// Forces packet production to the level, falling back to loss
    /// marking and finally to a bare PING so the timeout always
    /// elicits an acknowledgment.
    pub fn transmit_one<C: Context>(&mut self, ctx: &mut C, level: EncryptionLevel) {
        ctx.packet().set_filter(level, true);

        let mut sent = self.transmit(ctx);
        if !sent {
            self.retransmit_mark(ctx, level, false);
            sent = self.transmit(ctx);
        }
        if !sent {
            tracing::trace!(?level, "timeout probe");
            let frame = Frame::ping(level);
            self.ctrl_tail(ctx, frame, false);
        }

        ctx.packet().set_filter(level, false);

        self.rtx_count += 1;
        self.update_loss_timer(ctx, level);
    }
}
