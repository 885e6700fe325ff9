// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// The message channel: owns the region adapter, the framing protocol, the
// codec collaborators, and the per-process outbound/inbound queues.
//
// Single-threaded cooperative polling. tick() attempts one receive under
// the region lock, then — if the slot is idle or the receive completed —
// flushes one queued outbound message. send() takes a fast path when the
// outbound queue is empty, otherwise enqueues behind what is already
// waiting so local ordering is never violated.

use std::collections::VecDeque;

use crate::codec::{Checksum, Deserializer, ErrorHandler, Serializer};
use crate::frame::{FrameProto, RecvState, SendState};
use crate::region::{RegionAdapter, SharedRegion};

/// View the mapped region as a byte slice.
///
/// # Safety
/// The caller must hold the region lock and the adapter must not have been
/// released (non-null base pointer of at least `size()` bytes).
unsafe fn region_mem<A: RegionAdapter>(region: &A) -> &mut [u8] {
    let ptr = region.mem();
    debug_assert!(!ptr.is_null());
    std::slice::from_raw_parts_mut(ptr, region.size() as usize)
}

/// A cross-process, single-slot message channel.
///
/// Generic over the serializer, deserializer, checksum strategy, error
/// handler, and region adapter; all collaborators are held by value. One
/// instance per process per channel name — instances in the same process
/// sharing a name would fight over the local queues and are unsupported.
///
/// Construction never panics and never fails loudly: if the OS resources
/// cannot be created, the failure is reported through the error handler
/// and the channel stays permanently non-functional
/// ([`init_success`](Self::init_success) returns `false`).
pub struct MemChannel<S, D, C, E, A = SharedRegion>
where
    S: Serializer,
    D: Deserializer,
    C: Checksum,
    E: ErrorHandler,
    A: RegionAdapter,
{
    region: Option<A>,
    proto: FrameProto<C>,
    serializer: S,
    deserializer: D,
    errors: E,
    send_buf: VecDeque<Vec<u8>>,
    recv_buf: VecDeque<D::Item>,
    init_adapter: bool,
    init_proto: bool,
}

impl<S, D, C, E, A> MemChannel<S, D, C, E, A>
where
    S: Serializer,
    D: Deserializer,
    C: Checksum,
    E: ErrorHandler,
    A: RegionAdapter,
{
    /// Open the named region of `size` bytes and register with its segment.
    pub fn open(name: &str, size: u32, serializer: S, deserializer: D, errors: E) -> Self {
        let mut proto = FrameProto::new();
        let mut init_adapter = false;
        let mut init_proto = false;

        let region = match A::open(name, size) {
            Ok(r) => {
                init_adapter = true;
                Some(r)
            }
            Err(e) => {
                errors.error(format!("shared region init failed: {e}"));
                None
            }
        };

        if let Some(r) = &region {
            if r.wait_lock() {
                let mem = unsafe { region_mem(r) };
                match proto.init(mem) {
                    Ok(_) => init_proto = true,
                    Err(e) => errors.error(e.to_string()),
                }
                r.unlock();
            } else {
                errors.error("shared region lock failed during init".to_string());
            }
        }

        Self {
            region,
            proto,
            serializer,
            deserializer,
            errors,
            send_buf: VecDeque::new(),
            recv_buf: VecDeque::new(),
            init_adapter,
            init_proto,
        }
    }

    /// Whether construction fully succeeded. A channel that failed to open
    /// silently ignores send/tick calls.
    pub fn init_success(&self) -> bool {
        self.init_adapter && self.init_proto
    }

    /// Serialize and send a message. If the outbound queue is empty one
    /// immediate delivery is attempted; on anything but Success the
    /// serialized bytes enqueue at the tail — ordering is never broken
    /// around an in-flight attempt. Failures are reported through the
    /// error handler on every attempt; the message stays queued.
    pub fn send(&mut self, item: &S::Item) {
        if !self.init_success() {
            return;
        }
        let bytes = self.serializer.serialize(item);
        if !self.send_buf.is_empty() {
            self.send_buf.push_back(bytes);
            return;
        }
        if self.locked_send(&bytes) != SendState::Success {
            self.send_buf.push_back(bytes);
        }
    }

    /// One polling cycle: receive under lock, then flush one queued
    /// outbound message if the slot is (or just became) available.
    /// Returns whether the inbound queue holds messages afterwards.
    pub fn tick(&mut self) -> bool {
        if !self.init_success() {
            return false;
        }
        let state = self.locked_recv();
        if matches!(state, RecvState::Success | RecvState::Idle) {
            self.flush_front();
        }
        !self.recv_buf.is_empty()
    }

    /// FIFO dequeue of the inbound queue.
    pub fn pop_recv(&mut self) -> Option<D::Item> {
        self.recv_buf.pop_front()
    }

    /// Whether any received messages are waiting to be popped.
    pub fn has_recv(&self) -> bool {
        !self.recv_buf.is_empty()
    }

    /// Whether any outbound messages are still queued locally.
    pub fn has_unsend(&self) -> bool {
        !self.send_buf.is_empty()
    }

    /// Tear the channel down. With `force == false` the outbound queue is
    /// drained first by polling tick() — this blocks for as long as it
    /// takes the other registrants to acknowledge, with no internal
    /// timeout. With `force == true` queued messages are abandoned.
    pub fn destroy(mut self, force: bool) {
        self.shutdown(force);
    }

    // --- internals ---------------------------------------------------------

    /// Receive under the region lock, delivering into the inbound queue.
    /// A failed try_lock is reported as Busy (somebody else holds the
    /// region this cycle).
    fn locked_recv(&mut self) -> RecvState {
        let Some(region) = &self.region else {
            return RecvState::Uninit;
        };
        if !region.try_lock() {
            return RecvState::Busy;
        }
        let mem = unsafe { region_mem(region) };
        let deserializer = &self.deserializer;
        let recv_buf = &mut self.recv_buf;
        let state = self
            .proto
            .try_recv(mem, |payload| recv_buf.push_back(deserializer.deserialize(payload)));
        if let RecvState::Failed(e) = &state {
            self.errors.error(e.to_string());
        }
        region.unlock();
        state
    }

    /// Send `bytes` under the region lock. A failed try_lock is reported
    /// as Busy, same as an occupied slot.
    fn locked_send(&mut self, bytes: &[u8]) -> SendState {
        let Some(region) = &self.region else {
            return SendState::Uninit;
        };
        if !region.try_lock() {
            return SendState::Busy;
        }
        let mem = unsafe { region_mem(region) };
        let state = self.proto.try_send(mem, bytes);
        if let SendState::Failed(e) = &state {
            self.errors.error(e.to_string());
        }
        region.unlock();
        state
    }

    /// Try to deliver the head of the outbound queue; dequeued only on
    /// Success, requeued at the front otherwise.
    fn flush_front(&mut self) -> bool {
        let Some(bytes) = self.send_buf.pop_front() else {
            return false;
        };
        if self.locked_send(&bytes) == SendState::Success {
            true
        } else {
            self.send_buf.push_front(bytes);
            false
        }
    }

    fn shutdown(&mut self, force: bool) {
        if !force && self.init_success() {
            // Bounded only by the caller's patience, per the teardown
            // contract: no internal timeout.
            while !self.send_buf.is_empty() {
                self.tick();
                std::thread::yield_now();
            }
        }
        if self.init_proto && self.init_adapter {
            if let Some(region) = &self.region {
                if region.wait_lock() {
                    let mem = unsafe { region_mem(region) };
                    self.proto.release(mem);
                    region.unlock();
                }
            }
        }
        self.init_proto = false;
        if let Some(region) = &mut self.region {
            region.release();
        }
        self.init_adapter = false;
    }
}

impl<S, D, C, E, A> Drop for MemChannel<S, D, C, E, A>
where
    S: Serializer,
    D: Deserializer,
    C: Checksum,
    E: ErrorHandler,
    A: RegionAdapter,
{
    fn drop(&mut self) {
        // destroy() already ran shutdown for explicit teardown; the flags
        // make a second pass a no-op. An un-destroyed channel gets the
        // forced variant.
        self.shutdown(true);
    }
}
