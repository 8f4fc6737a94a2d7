// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The outbound queue: the aggregate state of the transmission core.
//!
//! Frames produced elsewhere in the stack enter through the enqueue
//! operations, wait on one of three outbound lists, get pulled by the
//! transmit pump into the packet builder, and move to the transmitted
//! list until they are acknowledged, declared lost, or purged.
//!
//! Every operation runs under the embedding socket's exclusion lock;
//! the only off-lock entry point is [`OutQueue::encrypted_tail`].

mod ack;
mod close;
mod encrypted;
mod loss;
mod probe;
mod transmit;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod tests;

pub use encrypted::EncryptedQueue;
pub use loss::REORDERING_THRESHOLD;

use crate::{
    congestion,
    congestion::Controller as _,
    event,
    event::Event,
    frame::Frame,
    level::EncryptionLevel,
    memory::SendBuffer,
    packet,
    packet::Builder as _,
    path, pnmap,
    state::{event as state_event, is},
    stream::{self, StreamId},
    time::{Timer, Timestamp},
    transport,
    transport::Parameters,
};
use bytes::Bytes;
use core::time::Duration;
use std::{collections::VecDeque, sync::Arc};

/// Collaborators of the transmission core, reached through the
/// embedding socket.
///
/// All implementations share the socket lock with the core; accessor
/// calls never block.
pub trait Context {
    type Packet: packet::Builder;
    type Congestion: congestion::Controller;
    type Path: path::Controller;

    /// The packet builder / transmitter
    fn packet(&mut self) -> &mut Self::Packet;

    /// The congestion controller
    fn congestion(&mut self) -> &mut Self::Congestion;

    /// The path address table and MTU search
    fn path(&mut self) -> &mut Self::Path;

    /// Packet-number bookkeeping for `level`
    fn pnmap(&mut self, level: EncryptionLevel) -> &mut pnmap::Map;

    /// True when keys for `level` are installed and usable for sending
    fn crypto_send_ready(&self, level: EncryptionLevel) -> bool;

    /// Schedules a key update once records older than `age` exist
    fn set_key_update(&mut self, level: EncryptionLevel, age: Duration);

    /// Delivers an event to the application; refusal leaves the
    /// originating state untouched
    fn event_recv(&mut self, event: Event) -> event::Result;

    /// Resolves the send half of a stream by id
    fn stream(&mut self, id: StreamId) -> Option<&mut stream::Send>;

    /// The current time
    fn now(&self) -> Timestamp;
}

/// Connection-level lifecycle as seen by the send path
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SocketState {
    #[default]
    Idle,
    Handshaking,
    Established,
    Closed,
}

impl SocketState {
    is!(is_idle, Idle);
    is!(is_handshaking, Handshaking);
    is!(is_established, Established);
    is!(is_closed, Closed);

    state_event! {
        on_connect(Idle => Handshaking);
        on_established(Idle | Handshaking => Established);
        on_close(Idle | Handshaking | Established => Closed);
    }
}

pub struct OutQueue {
    /// Pending stream data frames, in application write order
    stream_list: VecDeque<Frame>,
    /// Pending control frames; lower encryption levels first
    control_list: VecDeque<Frame>,
    /// Pending unreliable datagrams
    datagram_list: VecDeque<Frame>,
    /// Sent frames awaiting acknowledgment; lower levels first, then
    /// transmit order
    transmitted_list: VecDeque<Frame>,

    /// Payload bytes in flight, counted against the congestion window
    data_inflight: usize,
    /// Wire bytes in flight
    inflight: usize,
    /// Congestion window, mirrored from the controller on updates
    window: usize,

    /// Payload bytes counted against connection flow control
    bytes: u64,
    /// Peer-advertised connection send limit
    max_bytes: u64,
    /// Limit recorded when the last DATA_BLOCKED was produced
    last_max_bytes: u64,
    /// A DATA_BLOCKED frame is outstanding
    data_blocked: bool,

    /// Consecutive retransmission timeouts without progress
    rtx_count: u32,
    /// Level at which fresh application data is sent
    data_level: EncryptionLevel,

    // peer transport parameters
    max_datagram_frame_size: u64,
    max_udp_payload_size: u64,
    ack_delay_exponent: u8,
    max_idle_timeout: Duration,
    max_ack_delay: Duration,
    grease_quic_bit: bool,

    /// Parameters proposed by this side, merged on `set_param`
    local: Parameters,

    /// The terminal error, cached once a close goes on the wire
    close: transport::Error,

    state: SocketState,
    /// The stream the application is currently writing
    active_stream: Option<StreamId>,

    /// Confirmed path MTU, mirrored into the packet builder
    mtu: u16,
    sndbuf: SendBuffer,

    loss_timers: [Timer; EncryptionLevel::COUNT],
    path_timer: Timer,

    /// A BLOCKED frame was produced mid-cycle; run one extra control
    /// pass before flushing
    ctrl_pending: bool,
    /// Frames moved to the transmitted list since creation; used to
    /// detect whether a transmit cycle produced anything
    tx_seq: u64,

    encrypted: Arc<EncryptedQueue>,
}

impl OutQueue {
    pub fn new(local: Parameters) -> Self {
        Self {
            stream_list: VecDeque::new(),
            control_list: VecDeque::new(),
            datagram_list: VecDeque::new(),
            transmitted_list: VecDeque::new(),
            data_inflight: 0,
            inflight: 0,
            window: 0,
            bytes: 0,
            max_bytes: local.max_data,
            last_max_bytes: 0,
            data_blocked: false,
            rtx_count: 0,
            data_level: EncryptionLevel::ApplicationData,
            max_datagram_frame_size: 0,
            max_udp_payload_size: local.max_udp_payload_size,
            ack_delay_exponent: local.ack_delay_exponent,
            max_idle_timeout: local.max_idle_timeout,
            max_ack_delay: local.max_ack_delay,
            grease_quic_bit: false,
            local,
            close: transport::Error::default(),
            state: SocketState::default(),
            active_stream: None,
            mtu: 0,
            sndbuf: SendBuffer::default(),
            loss_timers: [Timer::default(), Timer::default(), Timer::default()],
            path_timer: Timer::default(),
            ctrl_pending: false,
            tx_seq: 0,
            encrypted: Arc::new(EncryptedQueue::default()),
        }
    }

    /// Merges the peer's transport parameters into the send path.
    ///
    /// Called once the handshake delivers them: adopts the peer's
    /// limits, sizes the send buffer at twice the connection flow
    /// control credit, reconciles the idle timeout with the local
    /// proposal, and drops the AEAD tag only if both sides offered to
    /// disable 1-RTT protection.
    pub fn set_param<C: Context>(&mut self, ctx: &mut C, peer: &Parameters) {
        self.max_bytes = peer.max_data;
        self.max_datagram_frame_size = peer.max_datagram_frame_size;
        self.max_udp_payload_size = peer.max_udp_payload_size;
        self.ack_delay_exponent = peer.ack_delay_exponent;
        self.max_ack_delay = peer.max_ack_delay;
        self.grease_quic_bit = peer.grease_quic_bit;
        self.max_idle_timeout =
            Parameters::min_idle_timeout(self.local.max_idle_timeout, peer.max_idle_timeout);

        self.sndbuf.set_limit((peer.max_data as usize).saturating_mul(2));

        if self.local.disable_1rtt_encryption && peer.disable_1rtt_encryption {
            ctx.packet().set_taglen(0);
        }

        self.window = ctx.congestion().window();
    }

    /// Appends a stream data frame, driving the owning stream's send
    /// state, and transmits unless corked
    pub fn stream_tail<C: Context>(&mut self, ctx: &mut C, frame: Frame, cork: bool) {
        if let crate::frame::Kind::Stream { fin } = frame.kind {
            if let Some(id) = frame.stream {
                if let Some(stream) = ctx.stream(id) {
                    if stream.state.is_ready() {
                        let _ = stream.state.on_send_stream();
                    }
                    if fin && stream.state.is_sending() {
                        let _ = stream.state.on_send_fin();
                        if self.active_stream == Some(id) {
                            self.active_stream = None;
                        }
                    }
                }
            }
        }

        self.sndbuf.charge(frame.len);
        self.stream_list.push_back(frame);

        if !cork {
            self.transmit(ctx);
        }
    }

    /// Appends an unreliable datagram and transmits unless corked.
    ///
    /// Datagrams the peer cannot accept are dropped on the floor; the
    /// peer advertised no (or too little) DATAGRAM support.
    pub fn dgram_tail<C: Context>(&mut self, ctx: &mut C, frame: Frame, cork: bool) {
        if (frame.len as u64) > self.max_datagram_frame_size {
            tracing::debug!(len = frame.len, "datagram exceeds peer limit, dropped");
            return;
        }

        self.sndbuf.charge(frame.len);
        self.datagram_list.push_back(frame);

        if !cork {
            self.transmit(ctx);
        }
    }

    /// Enqueues a control frame with level priority and transmits
    /// unless corked
    pub fn ctrl_tail<C: Context>(&mut self, ctx: &mut C, frame: Frame, cork: bool) {
        self.sndbuf.charge(frame.len);
        Self::insert_by_level(&mut self.control_list, frame);

        if !cork {
            self.transmit(ctx);
        }
    }

    /// Tracks a frame the packet builder just sent.
    ///
    /// Level priority keeps handshake frames ahead of 1-RTT frames so
    /// acknowledgment walks and purges see them first.
    pub(crate) fn transmitted_tail<C: Context>(&mut self, ctx: &mut C, mut frame: Frame) {
        debug_assert!(frame.number.is_some(), "builder must stamp packet numbers");

        let now = match frame.transmit_ts {
            Some(ts) => ts,
            None => {
                let now = ctx.now();
                frame.transmit_ts = Some(now);
                now
            }
        };
        ctx.pnmap(frame.level)
            .on_packet_sent(frame.packet_number(), frame.len, now);
        self.inflight = self.inflight.saturating_add(frame.len);
        self.tx_seq += 1;

        Self::insert_by_level(&mut self.transmitted_list, frame);
    }

    /// Inserts a non-application frame before the first application
    /// frame; appends otherwise
    fn insert_by_level(list: &mut VecDeque<Frame>, frame: Frame) {
        if frame.level.is_application_data() {
            list.push_back(frame);
            return;
        }
        let pos = list
            .iter()
            .position(|peer| peer.level.is_application_data())
            .unwrap_or(list.len());
        list.insert(pos, frame);
    }

    /// Drops every frame belonging to `id` from the pending and
    /// transmitted lists. Called on stream reset.
    pub fn stream_purge<C: Context>(&mut self, ctx: &mut C, id: StreamId) {
        let mut i = 0;
        while i < self.transmitted_list.len() {
            if self.transmitted_list[i].stream != Some(id) {
                i += 1;
                continue;
            }
            let frame = self.transmitted_list.remove(i).expect("index in bounds");
            ctx.pnmap(frame.level).dec_inflight(frame.len);
            self.inflight = self.inflight.saturating_sub(frame.len);
            self.data_inflight = self.data_inflight.saturating_sub(frame.bytes);
            self.sndbuf.uncharge(frame.len);
        }

        let sndbuf = &mut self.sndbuf;
        self.stream_list.retain(|frame| {
            if frame.stream == Some(id) {
                sndbuf.uncharge(frame.len);
                return false;
            }
            true
        });

        for level in EncryptionLevel::ALL {
            self.update_loss_timer(ctx, level);
        }
    }

    /// Drops every queued and tracked frame. Called on idle timeout
    /// and socket teardown.
    pub fn purge<C: Context>(&mut self, ctx: &mut C) {
        for frame in self.transmitted_list.drain(..) {
            ctx.pnmap(frame.level).dec_inflight(frame.len);
            self.sndbuf.uncharge(frame.len);
        }
        self.inflight = 0;
        self.data_inflight = 0;

        Self::purge_list(&mut self.stream_list, &mut self.sndbuf);
        Self::purge_list(&mut self.control_list, &mut self.sndbuf);
        Self::purge_list(&mut self.datagram_list, &mut self.sndbuf);

        for timer in &mut self.loss_timers {
            timer.cancel();
        }
        self.path_timer.cancel();
    }

    fn purge_list(list: &mut VecDeque<Frame>, sndbuf: &mut SendBuffer) {
        for frame in list.drain(..) {
            sndbuf.uncharge(frame.len);
        }
    }

    /// The soonest armed timer, if any; feeds the embedding event loop
    pub fn next_timeout(&self) -> Option<Timestamp> {
        self.loss_timers
            .iter()
            .chain(core::iter::once(&self.path_timer))
            .filter_map(|timer| timer.expiration())
            .min()
    }

    /// Dispatches expired timers: loss timers drive
    /// [`transmit_one`](Self::transmit_one), the path timer re-probes
    pub fn on_timeout<C: Context>(&mut self, ctx: &mut C, now: Timestamp) {
        for level in EncryptionLevel::ALL {
            if self.loss_timers[level.as_index()]
                .poll_expiration(now)
                .is_ready()
            {
                self.transmit_one(ctx, level);
            }
        }
        if self.path_timer.poll_expiration(now).is_ready() {
            self.transmit_probe(ctx);
        }
    }

    // accessors

    #[inline]
    pub fn window(&self) -> usize {
        self.window
    }

    #[inline]
    pub fn data_inflight(&self) -> usize {
        self.data_inflight
    }

    #[inline]
    pub fn inflight(&self) -> usize {
        self.inflight
    }

    #[inline]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    #[inline]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    #[inline]
    pub fn is_data_blocked(&self) -> bool {
        self.data_blocked
    }

    #[inline]
    pub fn rtx_count(&self) -> u32 {
        self.rtx_count
    }

    #[inline]
    pub fn state(&self) -> &SocketState {
        &self.state
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut SocketState {
        &mut self.state
    }

    #[inline]
    pub fn data_level(&self) -> EncryptionLevel {
        self.data_level
    }

    #[inline]
    pub fn set_data_level(&mut self, level: EncryptionLevel) {
        self.data_level = level;
    }

    #[inline]
    pub fn set_active_stream(&mut self, id: Option<StreamId>) {
        self.active_stream = id;
    }

    #[inline]
    pub fn active_stream(&self) -> Option<StreamId> {
        self.active_stream
    }

    #[inline]
    pub fn set_close_phrase(&mut self, phrase: Bytes) {
        self.close.reason = phrase;
    }

    #[inline]
    pub fn close_errcode(&self) -> u64 {
        self.close.code
    }

    #[inline]
    pub fn close_frame_type(&self) -> u64 {
        self.close.frame_type
    }

    #[inline]
    pub fn sndbuf(&self) -> &SendBuffer {
        &self.sndbuf
    }

    #[inline]
    pub fn max_idle_timeout(&self) -> Duration {
        self.max_idle_timeout
    }

    #[inline]
    pub fn max_ack_delay(&self) -> Duration {
        self.max_ack_delay
    }

    #[inline]
    pub fn ack_delay_exponent(&self) -> u8 {
        self.ack_delay_exponent
    }

    #[inline]
    pub fn max_udp_payload_size(&self) -> u64 {
        self.max_udp_payload_size
    }

    #[inline]
    pub fn grease_quic_bit(&self) -> bool {
        self.grease_quic_bit
    }

    #[inline]
    pub(crate) fn loss_timer(&self, level: EncryptionLevel) -> &Timer {
        &self.loss_timers[level.as_index()]
    }

    #[inline]
    pub(crate) fn loss_timer_mut(&mut self, level: EncryptionLevel) -> &mut Timer {
        &mut self.loss_timers[level.as_index()]
    }
}

impl Default for OutQueue {
    fn default() -> Self {
        Self::new(Parameters::default())
    }
}
