// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The send half of a stream, as tracked by the transmission core

pub mod send;

pub use send::{Send, Sender};

/// The identifier of a stream within a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u64);

impl StreamId {
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for StreamId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}
