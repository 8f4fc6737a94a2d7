// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Events delivered up to the application.
//!
//! Delivery may be refused (the application's receive queue is full or
//! it vetoes the action); a refused event leaves the originating state
//! untouched so the notification is retried later.

use crate::stream::{self, StreamId};

/// The uplink did not accept the event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Refused;

pub type Result = core::result::Result<(), Refused>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A stream's send half reached a new state
    StreamUpdate {
        id: StreamId,
        state: stream::Sender,
        /// Set for reset-related updates
        errcode: u64,
    },
    /// The connection is closing with the given transport error
    ConnectionClose { errcode: u64, frame_type: u64 },
    /// A validated alternate path is about to become active; refusal
    /// vetoes the migration
    ConnectionMigration {
        /// The local address changed rather than the peer's
        local: bool,
    },
}
