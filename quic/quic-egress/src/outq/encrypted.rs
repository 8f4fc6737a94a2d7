// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Hand-back path for packets encrypted on a worker thread.
//!
//! Encryption may be offloaded; finished packets are queued here from
//! off the socket lock and drained by a worker task that takes the
//! lock. The schedule flag keeps exactly one worker pass in flight.

use crate::{
    outq::{Context, OutQueue},
    packet::{Builder, EncryptedPacket},
};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

#[derive(Debug, Default)]
pub struct EncryptedQueue {
    packets: Mutex<VecDeque<EncryptedPacket>>,
    scheduled: AtomicBool,
}

impl EncryptedQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<EncryptedPacket>> {
        match self.packets.lock() {
            Ok(guard) => guard,
            // a panicked producer cannot corrupt a queue of owned
            // packets; keep draining
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queues a finished packet.
    ///
    /// Returns true when the caller should schedule the worker: only
    /// the enqueuer that flips the flag does, so one worker pass is in
    /// flight at a time.
    pub fn tail(&self, packet: EncryptedPacket) -> bool {
        self.lock().push_back(packet);
        !self.scheduled.swap(true, Ordering::AcqRel)
    }

    /// Takes everything queued and re-arms scheduling
    pub(crate) fn drain(&self) -> VecDeque<EncryptedPacket> {
        let mut packets = self.lock();
        self.scheduled.store(false, Ordering::Release);
        core::mem::take(&mut *packets)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl OutQueue {
    /// A shareable handle for the crypto worker to queue finished
    /// packets through
    pub fn encrypted_queue(&self) -> Arc<EncryptedQueue> {
        self.encrypted.clone()
    }

    /// Queues an encrypted packet from the crypto worker.
    ///
    /// May be called without the socket lock. Returns true when the
    /// worker task needs to be scheduled.
    pub fn encrypted_tail(&self, packet: EncryptedPacket) -> bool {
        self.encrypted.tail(packet)
    }

    /// Worker body: transmits everything queued, or discards it when
    /// the socket already went terminal.
    ///
    /// Must run under the socket lock.
    pub fn drain_encrypted<C: Context>(&mut self, ctx: &mut C) {
        let packets = self.encrypted.drain();

        if self.state.is_closed() {
            tracing::trace!(dropped = packets.len(), "socket closed, purging write queue");
            return;
        }

        for packet in packets {
            ctx.packet().xmit(packet);
        }
        self.flush_packets(ctx);
    }
}
