// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Outbound frame descriptors.
//!
//! A [`Frame`] is the unit of work moving through the send queues. It
//! carries byte accounting and scheduling metadata; the wire layout is
//! produced by the packet builder when the frame is packed.

use crate::{level::EncryptionLevel, stream::StreamId, time::Timestamp};
use bytes::Bytes;
use core::ops;

/// Alternate-path bitmask carried by a frame.
///
/// A set bit routes the frame over the corresponding alternate
/// address while a migration is being validated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Alt(u8);

impl Alt {
    pub const NONE: Self = Self(0);
    /// The local (source) address is the alternate
    pub const SRC: Self = Self(1);
    /// The peer (destination) address is the alternate
    pub const DST: Self = Self(1 << 1);

    /// Returns true if no alternate bit is set
    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns true if all bits in `mask` are set
    #[inline]
    pub fn contains(self, mask: Self) -> bool {
        self.0 & mask.0 == mask.0
    }

    /// Clears all bits in `mask`
    #[inline]
    pub fn clear(&mut self, mask: Self) {
        self.0 &= !mask.0;
    }
}

impl ops::BitOr for Alt {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Alt {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Frame kinds produced by this core or routed through its queues
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Application stream data
    Stream {
        /// The frame carries the final offset of the stream
        fin: bool,
    },
    /// Unreliable datagram; never retransmitted
    Datagram,
    /// Handshake data carried outside of streams
    Crypto,
    /// Ack-eliciting probe, possibly padded for path MTU discovery
    Ping,
    /// Abrupt stream termination
    ResetStream { error_code: u64 },
    /// The stream's send window is exhausted
    StreamDataBlocked { limit: u64 },
    /// The connection's send window is exhausted
    DataBlocked { limit: u64 },
    /// Terminal connection close
    ConnectionClose {
        error_code: u64,
        frame_type: u64,
        /// Application close (1-RTT only) rather than transport close
        application: bool,
    },
    /// Path validation challenge for an address being migrated to
    PathChallenge,
}

impl Kind {
    #[inline]
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream { .. })
    }

    #[inline]
    pub fn is_datagram(&self) -> bool {
        matches!(self, Self::Datagram)
    }

    #[inline]
    pub fn is_ping(&self) -> bool {
        matches!(self, Self::Ping)
    }

    /// Datagrams are dropped on loss instead of being queued again
    #[inline]
    pub fn is_retransmittable(&self) -> bool {
        !self.is_datagram()
    }
}

/// A frame waiting to be transmitted or waiting to be acknowledged
#[derive(Clone, Debug)]
pub struct Frame {
    pub kind: Kind,
    /// Encryption level; doubles as the queueing priority key
    pub level: EncryptionLevel,
    /// Payload bytes counted against flow control and the congestion
    /// window (0 for pure control frames)
    pub bytes: usize,
    /// Wire length counted against per-level inflight
    pub len: usize,
    /// Stream offset; tie-break for retransmit placement
    pub offset: u64,
    /// Owning stream, by id (weak)
    pub stream: Option<StreamId>,
    /// Alternate-path routing bits
    pub path_alt: Alt,
    /// The packet carrying this frame was ECN-marked
    pub ecn: bool,
    /// Packet number, stamped by the packet builder on transmit
    pub number: Option<u64>,
    /// Transmit time, stamped by the packet builder on transmit
    pub transmit_ts: Option<Timestamp>,
    /// Payload handed to the packet builder
    pub data: Bytes,
}

/// Nominal wire length of a small control frame (type + varint field)
const CONTROL_FRAME_LEN: usize = 9;

impl Frame {
    fn new(kind: Kind, level: EncryptionLevel, len: usize) -> Self {
        Self {
            kind,
            level,
            bytes: 0,
            len,
            offset: 0,
            stream: None,
            path_alt: Alt::NONE,
            ecn: false,
            number: None,
            transmit_ts: None,
            data: Bytes::new(),
        }
    }

    /// A stream data frame; `bytes` and `len` derive from the payload
    pub fn stream(
        id: StreamId,
        level: EncryptionLevel,
        offset: u64,
        fin: bool,
        data: Bytes,
    ) -> Self {
        let mut frame = Self::new(Kind::Stream { fin }, level, data.len() + CONTROL_FRAME_LEN);
        frame.bytes = data.len();
        frame.offset = offset;
        frame.stream = Some(id);
        frame.data = data;
        frame
    }

    /// An unreliable datagram frame
    pub fn datagram(level: EncryptionLevel, data: Bytes) -> Self {
        let mut frame = Self::new(Kind::Datagram, level, data.len() + 1);
        frame.bytes = data.len();
        frame.data = data;
        frame
    }

    /// A crypto frame carrying handshake data; not flow controlled
    pub fn crypto(level: EncryptionLevel, offset: u64, data: Bytes) -> Self {
        let mut frame = Self::new(Kind::Crypto, level, data.len() + CONTROL_FRAME_LEN);
        frame.offset = offset;
        frame.data = data;
        frame
    }

    /// A plain PING probe
    pub fn ping(level: EncryptionLevel) -> Self {
        Self::new(Kind::Ping, level, 1)
    }

    /// A PING padded to `size`, probing whether the path carries a
    /// larger datagram
    pub fn ping_sized(level: EncryptionLevel, size: u16) -> Self {
        Self::new(Kind::Ping, level, size as usize)
    }

    /// Signals the peer that `id` is blocked at `limit`
    pub fn stream_data_blocked(id: StreamId, limit: u64) -> Self {
        let mut frame = Self::new(
            Kind::StreamDataBlocked { limit },
            EncryptionLevel::ApplicationData,
            CONTROL_FRAME_LEN,
        );
        frame.stream = Some(id);
        frame
    }

    /// Signals the peer that the connection is blocked at `limit`
    pub fn data_blocked(limit: u64) -> Self {
        Self::new(
            Kind::DataBlocked { limit },
            EncryptionLevel::ApplicationData,
            CONTROL_FRAME_LEN,
        )
    }

    /// Abruptly terminates the sending part of `id`
    pub fn reset_stream(id: StreamId, level: EncryptionLevel, error_code: u64) -> Self {
        let mut frame = Self::new(Kind::ResetStream { error_code }, level, CONTROL_FRAME_LEN);
        frame.stream = Some(id);
        frame
    }

    /// A terminal close frame with an optional reason phrase
    pub fn connection_close(
        level: EncryptionLevel,
        error_code: u64,
        frame_type: u64,
        application: bool,
        reason: Bytes,
    ) -> Self {
        let mut frame = Self::new(
            Kind::ConnectionClose {
                error_code,
                frame_type,
                application,
            },
            level,
            reason.len() + CONTROL_FRAME_LEN,
        );
        frame.data = reason;
        frame
    }

    /// A challenge probing reachability of an alternate path
    pub fn path_challenge(alt: Alt) -> Self {
        let mut frame = Self::new(
            Kind::PathChallenge,
            EncryptionLevel::ApplicationData,
            CONTROL_FRAME_LEN,
        );
        frame.path_alt = alt;
        frame
    }

    /// Returns the stamped packet number.
    ///
    /// Only valid for frames on the transmitted list.
    #[inline]
    pub fn packet_number(&self) -> u64 {
        debug_assert!(self.number.is_some(), "frame was never transmitted");
        self.number.unwrap_or(0)
    }

    /// Clears the transmit stamps when the frame is queued again
    #[inline]
    pub fn clear_stamps(&mut self) {
        self.number = None;
        self.transmit_ts = None;
        self.ecn = false;
    }
}
