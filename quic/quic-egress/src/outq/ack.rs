// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Acknowledgment processing: retires transmitted frames, feeds the
//! congestion controller and the path MTU search.

use crate::{
    congestion::Controller as _,
    event::Event,
    frame::Kind,
    level::EncryptionLevel,
    outq::{Context, OutQueue},
    packet::Builder as _,
    path::Controller as _,
    stream::Sender,
    time::Timestamp,
};
use core::time::Duration;

impl OutQueue {
    /// Processes the inclusive acknowledged range `[smallest, largest]`
    /// at `level`.
    ///
    /// `ack_largest` is the largest of the ACK frame itself and drives
    /// the RTT sample; `ack_delay` is the peer-reported delay, already
    /// scaled by the ack delay exponent.
    ///
    /// Returns the payload bytes retired by this acknowledgment.
    pub fn transmitted_sack<C: Context>(
        &mut self,
        ctx: &mut C,
        level: EncryptionLevel,
        smallest: u64,
        largest: u64,
        ack_largest: u64,
        ack_delay: Duration,
    ) -> usize {
        let now = ctx.now();

        self.pmtu_feedback(ctx, largest, smallest, now);

        let mut acked_bytes = 0usize;
        // the newest retired packet is the RTT observation point
        let mut first_acked: Option<(u64, Timestamp)> = None;

        // walk most-recent first
        let mut i = self.transmitted_list.len();
        while i > 0 {
            i -= 1;

            let (number, transmit_ts, kind, bytes, len, stream_id, ecn) = {
                let frame = &self.transmitted_list[i];
                if frame.level != level {
                    continue;
                }
                (
                    frame.packet_number(),
                    frame.transmit_ts.expect("transmitted frames are stamped"),
                    frame.kind.clone(),
                    frame.bytes,
                    frame.len,
                    frame.stream,
                    frame.ecn,
                )
            };

            if number > largest {
                continue;
            }
            if number < smallest {
                break;
            }

            if number == ack_largest {
                ctx.congestion().on_rtt_sample(transmit_ts, now, ack_delay);
                let rto = ctx.congestion().rto();
                // retain packet records and keys long enough to catch
                // a spurious retransmission of this range
                ctx.pnmap(level).set_max_record_age(2 * rto);
                ctx.set_key_update(level, 2 * rto);
            }

            if first_acked.is_none() {
                first_acked = Some((number, transmit_ts));
            }

            if ecn {
                ctx.path().on_ecn_acked();
            }

            // stream bookkeeping; a refused uplink leaves the frame
            // linked so the notification is retried on a later ack
            match kind {
                Kind::Stream { .. } if bytes > 0 => {
                    let id = stream_id.expect("stream frames carry their id");
                    if let Some(stream) = ctx.stream(id) {
                        stream.frags -= 1;
                        if stream.frags == 0 && stream.state.is_data_sent() {
                            let event = Event::StreamUpdate {
                                id,
                                state: Sender::DataRecvd,
                                errcode: 0,
                            };
                            if ctx.event_recv(event).is_err() {
                                if let Some(stream) = ctx.stream(id) {
                                    stream.frags += 1;
                                }
                                continue;
                            }
                            if let Some(stream) = ctx.stream(id) {
                                let _ = stream.state.on_recv_all_acks();
                            }
                        }
                    }
                }
                Kind::ResetStream { error_code } => {
                    let id = stream_id.expect("reset frames carry their id");
                    let event = Event::StreamUpdate {
                        id,
                        state: Sender::ResetRecvd,
                        errcode: error_code,
                    };
                    if ctx.event_recv(event).is_err() {
                        continue;
                    }
                    if let Some(stream) = ctx.stream(id) {
                        let _ = stream.state.on_recv_reset_ack();
                    }
                }
                Kind::StreamDataBlocked { .. } => {
                    if let Some(stream) = stream_id.and_then(|id| ctx.stream(id)) {
                        stream.data_blocked = false;
                    }
                }
                Kind::DataBlocked { .. } => {
                    self.data_blocked = false;
                }
                _ => {}
            }

            // retire the frame
            self.transmitted_list.remove(i);
            ctx.pnmap(level).on_packet_acked(number, len);
            self.inflight = self.inflight.saturating_sub(len);
            if bytes > 0 {
                self.data_inflight = self.data_inflight.saturating_sub(bytes);
                acked_bytes += bytes;
            }
            self.sndbuf.uncharge(len);
        }

        self.rtx_count = 0;

        if acked_bytes > 0 {
            if let Some((number, transmit_ts)) = first_acked {
                ctx.congestion()
                    .on_ack(number, transmit_ts, acked_bytes, self.data_inflight, now);
                self.window = ctx.congestion().window();
            }
        }

        self.update_loss_timer(ctx, level);

        acked_bytes
    }

    /// Feeds an acknowledged range to the path MTU search and acts on
    /// the outcome
    fn pmtu_feedback<C: Context>(
        &mut self,
        ctx: &mut C,
        largest: u64,
        smallest: u64,
        now: Timestamp,
    ) {
        ensure!(ctx.path().confirm_probe(largest, smallest));

        let mtu = ctx.path().current_mtu();
        if mtu != self.mtu {
            self.mtu = mtu;
            ctx.packet().mss_update(mtu);
            tracing::debug!(mtu, "path mtu updated");
        }

        let status = ctx.path().probe_status();
        if !status.complete {
            self.transmit_probe(ctx);
        }
        if status.raise {
            // the search converged; look for a larger MTU much later
            let timeout = ctx.path().probe_timeout();
            self.path_timer.set(now + 30 * timeout);
        }
    }
}
