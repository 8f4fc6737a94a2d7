// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Outbound transmission core for a QUIC endpoint.
//!
//! This crate owns the send-side frame queues, the transmit pump, flow
//! control gating, acknowledgment processing, loss recovery, path MTU
//! probing, connection migration and close orchestration. Packet
//! encoding, congestion control algorithms, key schedules and the
//! socket surface are collaborators reached through [`outq::Context`].

#[macro_use]
pub mod macros;

pub mod congestion;
pub mod event;
pub mod frame;
pub mod level;
pub mod memory;
pub mod outq;
pub mod packet;
pub mod path;
pub mod pnmap;
pub mod state;
pub mod stream;
pub mod time;
pub mod transport;

pub use level::EncryptionLevel;
pub use outq::OutQueue;
