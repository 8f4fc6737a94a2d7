// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Interface to the packet builder and transmitter.
//!
//! The transmit pump drives an implementation of [`Builder`],
//! coalescing frames into packets. The builder owns the byte layout;
//! the pump only decides which frame goes next and when to cut a
//! packet.

use crate::{
    frame::{Alt, Frame},
    level::EncryptionLevel,
};
use bytes::Bytes;

/// Outcome of configuring the builder for a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The frame may be packed
    Proceed,
    /// The frame is filtered out; skip it and keep iterating
    Filtered,
    /// The pass cannot continue (e.g. the level is filtered and later
    /// frames may depend on this one)
    Stop,
}

/// A packet that was encrypted off-thread and is ready for the wire
#[derive(Clone, Debug)]
pub struct EncryptedPacket {
    pub data: Bytes,
    pub level: EncryptionLevel,
}

/// The packet builder / transmitter driven by the transmit pump.
///
/// Frames handed to [`tail`](Builder::tail) are owned by the builder
/// until the packet they were packed into is emitted, at which point
/// [`create`](Builder::create) or [`flush`](Builder::flush) hand them
/// back stamped with their packet number and transmit time so the
/// core can track them on the transmitted list.
pub trait Builder {
    /// Prepares the current packet for a frame at `level` targeting
    /// the path selected by `path_alt`
    fn config(&mut self, level: EncryptionLevel, path_alt: Alt) -> Decision;

    /// Tries to pack `frame` into the current packet.
    ///
    /// Returns the frame back when the packet is full; the caller is
    /// expected to cut the packet with [`create`](Builder::create) and
    /// retry the same frame.
    fn tail(&mut self, frame: Frame, is_dgram: bool) -> Result<(), Frame>;

    /// Emits the current packet and starts a fresh one, returning the
    /// stamped frames it carried
    fn create(&mut self) -> Vec<Frame>;

    /// Emits anything still pending, returning the stamped frames
    fn flush(&mut self) -> Vec<Frame>;

    /// Transmits an already-encrypted packet
    fn xmit(&mut self, packet: EncryptedPacket);

    /// Updates the maximum segment size after an MTU change
    fn mss_update(&mut self, mss: u16);

    /// Restricts (or, with `on == false`, stops restricting) packet
    /// production to a single encryption level
    fn set_filter(&mut self, level: EncryptionLevel, on: bool);

    /// The AEAD tag length appended to each packet
    fn taglen(&self) -> usize;

    /// Overrides the AEAD tag length (0 when 1-RTT encryption was
    /// disabled by both sides)
    fn set_taglen(&mut self, len: usize);
}
