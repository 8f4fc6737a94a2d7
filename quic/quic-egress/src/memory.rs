// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Send-buffer accounting.
//!
//! Every frame entering the send queues charges its wire length here
//! and releases it when the frame leaves the system (acknowledged,
//! dropped on loss for datagrams, or purged). Enqueue never fails;
//! the embedding socket consults [`SendBuffer::is_over_limit`] for
//! backpressure.

#[derive(Clone, Debug)]
pub struct SendBuffer {
    limit: usize,
    charged: usize,
}

/// Default send buffer before the peer's limits are known
const DEFAULT_LIMIT: usize = 64 * 1024;

impl Default for SendBuffer {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            charged: 0,
        }
    }
}

impl SendBuffer {
    /// Resizes the buffer; typically `2 * max_data` once the peer's
    /// transport parameters arrive
    #[inline]
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes currently charged
    #[inline]
    pub fn charged(&self) -> usize {
        self.charged
    }

    #[inline]
    pub fn charge(&mut self, len: usize) {
        self.charged = self.charged.saturating_add(len);
    }

    #[inline]
    pub fn uncharge(&mut self, len: usize) {
        debug_assert!(self.charged >= len, "uncharging more than was charged");
        self.charged = self.charged.saturating_sub(len);
    }

    #[inline]
    pub fn is_over_limit(&self) -> bool {
        self.charged > self.limit
    }
}
