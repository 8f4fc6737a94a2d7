// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Loss detection and retransmission placement.

use crate::{
    congestion::Controller as _,
    frame::Frame,
    level::EncryptionLevel,
    outq::{Context, OutQueue},
    time::Timestamp,
};
use core::time::Duration;

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.1
//# Implementations SHOULD NOT use a packet threshold less than 3, to
//# keep in line with TCP [RFC5681].
/// How many packets must have been sent after a timed-out packet
/// before it is declared lost, protecting against reordering
pub const REORDERING_THRESHOLD: u64 = 6;

impl OutQueue {
    /// Scans the transmitted list at `level` and moves expired frames
    /// back onto the outbound lists (datagrams are dropped instead).
    ///
    /// With `immediate` set every frame at the level is marked, as on
    /// a path change. Otherwise a frame is lost once its
    /// retransmission timeout elapsed, enough packets were sent after
    /// it, and a newer packet was already acknowledged; the scan stops
    /// at the first frame that is still on time and records when it
    /// will expire.
    pub fn retransmit_mark<C: Context>(
        &mut self,
        ctx: &mut C,
        level: EncryptionLevel,
        immediate: bool,
    ) {
        let now = ctx.now();
        let last = ctx.pnmap(level).next_number().saturating_sub(1);
        let max_pn_acked = ctx.pnmap(level).max_pn_acked();
        let rto = ctx.congestion().rto();
        ctx.pnmap(level).set_loss_ts(None);

        let mut freed = 0usize;
        let mut marked = 0usize;

        let mut i = 0;
        while i < self.transmitted_list.len() {
            let (number, transmit_ts, bytes, len, retransmittable) = {
                let frame = &self.transmitted_list[i];
                if frame.level != level {
                    i += 1;
                    continue;
                }
                (
                    frame.packet_number(),
                    frame.transmit_ts.expect("transmitted frames are stamped"),
                    frame.bytes,
                    frame.len,
                    frame.kind.is_retransmittable(),
                )
            };

            let deadline = transmit_ts + rto;
            // an expired frame is kept while it may merely be
            // reordered: fewer than the margin sent after it and
            // nothing newer acknowledged
            let reordered = number + REORDERING_THRESHOLD > last && number > max_pn_acked;
            if !immediate && (deadline > now || reordered) {
                // note when it expires and stop, everything after it
                // is younger
                ctx.pnmap(level).set_loss_ts(Some(deadline));
                break;
            }

            let frame = self.transmitted_list.remove(i).expect("index in bounds");
            ctx.pnmap(level).dec_inflight(len);
            self.inflight = self.inflight.saturating_sub(len);

            if bytes > 0 {
                self.data_inflight = self.data_inflight.saturating_sub(bytes);
                ctx.congestion().on_timeout(number, transmit_ts, last, now);
                self.window = ctx.congestion().window();
            }

            if retransmittable {
                self.retransmit_one(ctx, frame);
                marked += 1;
            } else {
                // datagrams are dropped, not retried
                freed += len;
            }
        }

        if marked > 0 || freed > 0 {
            tracing::debug!(?level, marked, dropped = freed, "marked frames lost");
        }
        if freed > 0 {
            self.sndbuf.uncharge(freed);
        }

        self.update_loss_timer(ctx, level);
    }

    /// Puts a lost frame back on the outbound list it belongs to,
    /// keeping (level, offset) order so retransmissions interleave
    /// correctly with pending data.
    ///
    /// The flow-control bytes are uncounted here; the resend counts
    /// them again when the frame clears the gate.
    pub(crate) fn retransmit_one<C: Context>(&mut self, ctx: &mut C, mut frame: Frame) {
        frame.clear_stamps();

        if frame.bytes > 0 {
            if let Some(stream) = frame.stream.and_then(|id| ctx.stream(id)) {
                stream.frags = stream.frags.saturating_sub(1);
                stream.bytes = stream.bytes.saturating_sub(frame.bytes as u64);
            }
            self.bytes = self.bytes.saturating_sub(frame.bytes as u64);
            Self::insert_retransmit(&mut self.stream_list, frame);
        } else {
            Self::insert_retransmit(&mut self.control_list, frame);
        }
    }

    fn insert_retransmit(list: &mut std::collections::VecDeque<Frame>, frame: Frame) {
        // before the first strictly-greater peer; peers without an
        // offset marker only order by level
        let pos = list
            .iter()
            .position(|peer| {
                peer.level > frame.level
                    || (peer.level == frame.level
                        && peer.offset != 0
                        && peer.offset > frame.offset)
            })
            .unwrap_or(list.len());
        list.insert(pos, frame);
    }

    /// Maintains the loss timer for `level`.
    ///
    /// A recorded loss timestamp wins; otherwise the deadline derives
    /// from the last transmission, stretched by consecutive barren
    /// timeouts. The timer only ever moves earlier while armed and is
    /// stopped once the level has nothing in flight.
    pub(crate) fn update_loss_timer<C: Context>(&mut self, ctx: &mut C, level: EncryptionLevel) {
        let now = ctx.now();

        let deadline = match ctx.pnmap(level).loss_ts() {
            Some(loss_ts) => loss_ts,
            None => {
                if ctx.pnmap(level).inflight() == 0 {
                    self.loss_timer_mut(level).cancel();
                    return;
                }
                let last_sent = ctx.pnmap(level).last_sent_ts().unwrap_or(now);
                last_sent + ctx.congestion().duration() * (1 + self.rtx_count)
            }
        };

        let deadline = deadline.max(now + Duration::from_micros(1));
        self.loss_timer_mut(level).reduce(deadline);
    }

    /// The armed loss deadline for `level`, if any
    pub fn loss_deadline(&self, level: EncryptionLevel) -> Option<Timestamp> {
        self.loss_timer(level).expiration()
    }
}
