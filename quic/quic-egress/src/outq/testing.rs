// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Test doubles for the transmission core's collaborators.

use crate::{
    congestion, event,
    event::Event,
    frame::{Alt, Frame},
    level::EncryptionLevel,
    packet::{self, Decision, EncryptedPacket},
    path::{self, ProbeStatus},
    pnmap,
    stream::{self, StreamId},
    time::{Clock as _, NoopClock, Timestamp},
};
use core::time::Duration;
use hashbrown::HashMap;

/// A packet builder that coalesces frames into MSS-sized packets and
/// stamps each frame with its own packet number.
#[derive(Debug)]
pub struct Packet {
    pub mss: usize,
    pub current: Vec<Frame>,
    pub current_size: usize,
    pub next_number: [u64; EncryptionLevel::COUNT],
    pub filter: Option<EncryptionLevel>,
    pub taglen: usize,
    /// Packet numbers of every emitted packet, oldest first
    pub emitted: Vec<Vec<u64>>,
    pub mss_updates: Vec<u16>,
    pub xmitted: Vec<EncryptedPacket>,
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            mss: 1200,
            current: Vec::new(),
            current_size: 0,
            next_number: [0; EncryptionLevel::COUNT],
            filter: None,
            taglen: 16,
            emitted: Vec::new(),
            mss_updates: Vec::new(),
            xmitted: Vec::new(),
        }
    }
}

impl Packet {
    fn emit(&mut self) -> Vec<Frame> {
        let frames = core::mem::take(&mut self.current);
        self.current_size = 0;
        if !frames.is_empty() {
            self.emitted
                .push(frames.iter().map(|frame| frame.packet_number()).collect());
        }
        frames
    }
}

impl packet::Builder for Packet {
    fn config(&mut self, level: EncryptionLevel, _path_alt: Alt) -> Decision {
        match self.filter {
            Some(filter) if filter != level => Decision::Filtered,
            _ => Decision::Proceed,
        }
    }

    fn tail(&mut self, mut frame: Frame, _is_dgram: bool) -> Result<(), Frame> {
        // a lone frame sets the packet floor; otherwise split at MSS
        if !self.current.is_empty() && self.current_size + frame.len > self.mss {
            return Err(frame);
        }

        let index = frame.level.as_index();
        frame.number = Some(self.next_number[index]);
        self.next_number[index] += 1;

        self.current_size += frame.len;
        self.current.push(frame);
        Ok(())
    }

    fn create(&mut self) -> Vec<Frame> {
        self.emit()
    }

    fn flush(&mut self) -> Vec<Frame> {
        self.emit()
    }

    fn xmit(&mut self, packet: EncryptedPacket) {
        self.xmitted.push(packet);
    }

    fn mss_update(&mut self, mss: u16) {
        self.mss = mss as usize;
        self.mss_updates.push(mss);
    }

    fn set_filter(&mut self, level: EncryptionLevel, on: bool) {
        self.filter = on.then_some(level);
    }

    fn taglen(&self) -> usize {
        self.taglen
    }

    fn set_taglen(&mut self, len: usize) {
        self.taglen = len;
    }
}

/// A congestion controller with a fixed window that records every
/// signal it receives
#[derive(Debug)]
pub struct Congestion {
    pub rto: Duration,
    pub duration: Duration,
    pub window: usize,
    pub rtt_samples: Vec<(Timestamp, Duration)>,
    /// (number, bytes_acked, inflight)
    pub acks: Vec<(u64, usize, usize)>,
    /// numbers declared lost
    pub timeouts: Vec<u64>,
}

impl Default for Congestion {
    fn default() -> Self {
        Self {
            rto: Duration::from_millis(100),
            duration: Duration::from_millis(50),
            window: 12000,
            rtt_samples: Vec::new(),
            acks: Vec::new(),
            timeouts: Vec::new(),
        }
    }
}

impl congestion::Controller for Congestion {
    fn on_rtt_sample(&mut self, transmit_ts: Timestamp, _now: Timestamp, ack_delay: Duration) {
        self.rtt_samples.push((transmit_ts, ack_delay));
    }

    fn rto(&self) -> Duration {
        self.rto
    }

    fn duration(&self) -> Duration {
        self.duration
    }

    fn window(&self) -> usize {
        self.window
    }

    fn on_ack(
        &mut self,
        number: u64,
        _transmit_ts: Timestamp,
        bytes_acked: usize,
        inflight: usize,
        _now: Timestamp,
    ) {
        self.acks.push((number, bytes_acked, inflight));
    }

    fn on_timeout(&mut self, number: u64, _transmit_ts: Timestamp, _last: u64, _now: Timestamp) {
        self.timeouts.push(number);
    }
}

/// A scripted path controller
#[derive(Debug)]
pub struct Path {
    /// What the next `confirm_probe` returns
    pub confirm: bool,
    pub confirmed: Vec<(u64, u64)>,
    pub mtu: u16,
    pub status: ProbeStatus,
    pub probe_size: u16,
    pub probe_timeout: Duration,
    pub probes_sent: Vec<u64>,
    /// MSS to report from `on_probe_sent`
    pub probe_mss: Option<u16>,
    pub swapped: bool,
    pub freed: bool,
    pub sent_count_reset: bool,
    pub ecn_probes_reset: bool,
    pub ecn_acked: usize,
    pub local_migration: bool,
}

impl Default for Path {
    fn default() -> Self {
        Self {
            confirm: false,
            confirmed: Vec::new(),
            mtu: 1200,
            status: ProbeStatus::default(),
            probe_size: 1400,
            probe_timeout: Duration::from_secs(1),
            probes_sent: Vec::new(),
            probe_mss: None,
            swapped: false,
            freed: false,
            sent_count_reset: false,
            ecn_probes_reset: false,
            ecn_acked: 0,
            local_migration: false,
        }
    }
}

impl path::Controller for Path {
    fn confirm_probe(&mut self, largest: u64, smallest: u64) -> bool {
        self.confirmed.push((largest, smallest));
        self.confirm
    }

    fn current_mtu(&self) -> u16 {
        self.mtu
    }

    fn probe_status(&mut self) -> ProbeStatus {
        self.status
    }

    fn probe_size(&self) -> u16 {
        self.probe_size
    }

    fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    fn on_probe_sent(&mut self, number: u64) -> Option<u16> {
        self.probes_sent.push(number);
        self.probe_mss
    }

    fn swap_active(&mut self) {
        self.swapped = true;
    }

    fn free_old_address(&mut self) {
        self.freed = true;
    }

    fn reset_sent_count(&mut self) {
        self.sent_count_reset = true;
    }

    fn reset_ecn_probes(&mut self) {
        self.ecn_probes_reset = true;
    }

    fn on_ecn_acked(&mut self) {
        self.ecn_acked += 1;
    }

    fn is_local_migration(&self) -> bool {
        self.local_migration
    }
}

/// A full set of collaborator doubles with a controllable clock and a
/// recording uplink
pub struct Context {
    pub packet: Packet,
    pub congestion: Congestion,
    pub path: Path,
    pub pnmaps: [pnmap::Map; EncryptionLevel::COUNT],
    pub crypto_ready: [bool; EncryptionLevel::COUNT],
    pub key_updates: Vec<(EncryptionLevel, Duration)>,
    pub streams: HashMap<StreamId, stream::Send>,
    pub events: Vec<Event>,
    /// When set, the uplink refuses everything
    pub refuse_events: bool,
    pub now: Timestamp,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            packet: Packet::default(),
            congestion: Congestion::default(),
            path: Path::default(),
            pnmaps: Default::default(),
            crypto_ready: [true; EncryptionLevel::COUNT],
            key_updates: Vec::new(),
            streams: HashMap::new(),
            events: Vec::new(),
            refuse_events: false,
            now: NoopClock.get_time(),
        }
    }
}

impl Context {
    /// Registers a stream with the given send window
    pub fn with_stream(mut self, id: u64, max_bytes: u64) -> Self {
        let id = StreamId::new(id);
        self.streams.insert(id, stream::Send::new(id, max_bytes));
        self
    }

    pub fn advance(&mut self, duration: Duration) {
        self.now += duration;
    }

    pub fn send_stream(&self, id: u64) -> &stream::Send {
        &self.streams[&StreamId::new(id)]
    }
}

impl super::Context for Context {
    type Packet = Packet;
    type Congestion = Congestion;
    type Path = Path;

    fn packet(&mut self) -> &mut Packet {
        &mut self.packet
    }

    fn congestion(&mut self) -> &mut Congestion {
        &mut self.congestion
    }

    fn path(&mut self) -> &mut Path {
        &mut self.path
    }

    fn pnmap(&mut self, level: EncryptionLevel) -> &mut pnmap::Map {
        &mut self.pnmaps[level.as_index()]
    }

    fn crypto_send_ready(&self, level: EncryptionLevel) -> bool {
        self.crypto_ready[level.as_index()]
    }

    fn set_key_update(&mut self, level: EncryptionLevel, age: Duration) {
        self.key_updates.push((level, age));
    }

    fn event_recv(&mut self, event: Event) -> event::Result {
        if self.refuse_events {
            return Err(event::Refused);
        }
        self.events.push(event);
        Ok(())
    }

    fn stream(&mut self, id: StreamId) -> Option<&mut stream::Send> {
        self.streams.get_mut(&id)
    }

    fn now(&self) -> Timestamp {
        self.now
    }
}
