// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;

//= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
//# An endpoint MUST treat receipt of a transport parameter with an
//# invalid value as a connection error of type
//# TRANSPORT_PARAMETER_ERROR.

/// The subset of transport parameters the transmission core consumes.
///
/// Decoding happens elsewhere; by the time these reach
/// `OutQueue::set_param` the values have been validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameters {
    /// Connection-level flow control limit offered to the peer's
    /// receive side; sizes the local send buffer
    pub max_data: u64,
    /// Largest DATAGRAM frame the peer accepts (0: datagrams are not
    /// supported)
    pub max_datagram_frame_size: u64,
    /// Largest UDP payload the peer is willing to receive
    pub max_udp_payload_size: u64,
    /// Exponent applied to the ack_delay field of incoming ACK frames
    pub ack_delay_exponent: u8,
    /// Idle timeout proposed by this side; reconciled with the peer's
    /// to the smaller non-zero value
    pub max_idle_timeout: Duration,
    /// Longest the peer may delay acknowledgments
    pub max_ack_delay: Duration,
    /// The peer tolerates a greased fixed bit
    pub grease_quic_bit: bool,
    /// This side is willing to drop 1-RTT packet protection
    pub disable_1rtt_encryption: bool,
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
//# The default for this parameter is the maximum permitted UDP
//# payload of 65527.
const DEFAULT_MAX_UDP_PAYLOAD_SIZE: u64 = 65527;

//= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
//# If this value is absent, a default value of 3 is assumed
const DEFAULT_ACK_DELAY_EXPONENT: u8 = 3;

//= https://www.rfc-editor.org/rfc/rfc9000#section-18.2
//# If this value is absent, a default of 25 milliseconds is assumed.
const DEFAULT_MAX_ACK_DELAY: Duration = Duration::from_millis(25);

impl Default for Parameters {
    fn default() -> Self {
        Self {
            max_data: 1 << 20,
            max_datagram_frame_size: 0,
            max_udp_payload_size: DEFAULT_MAX_UDP_PAYLOAD_SIZE,
            ack_delay_exponent: DEFAULT_ACK_DELAY_EXPONENT,
            max_idle_timeout: Duration::from_secs(30),
            max_ack_delay: DEFAULT_MAX_ACK_DELAY,
            grease_quic_bit: false,
            disable_1rtt_encryption: false,
        }
    }
}

impl Parameters {
    /// Reconciles two idle timeouts: zero disables the timeout, so the
    /// effective value is the smaller of the non-zero ones
    pub fn min_idle_timeout(local: Duration, peer: Duration) -> Duration {
        match (local.is_zero(), peer.is_zero()) {
            (true, _) => peer,
            (_, true) => local,
            _ => local.min(peer),
        }
    }
}
