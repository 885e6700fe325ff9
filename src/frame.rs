// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// Framing protocol for the single-slot broadcast mailbox.
//
// Slot layout (12-byte header, then payload):
//   [Count:1][MsgId:1][OwnerId:1][AckCount:1][Len:4 LE][Checksum:4 LE][Data:Len]
//
// One message occupies the slot at a time. Every *other* registrant reads
// it exactly once; the last expected reader clears the slot back to free.
// All field access goes through bounds-checked slice offsets — the caller
// hands in the locked segment as `&mut [u8]`.

use std::marker::PhantomData;

use crate::codec::Checksum;
use crate::error::FrameError;

/// Fixed header size in bytes.
pub const HEADER_SIZE: u32 = 12;

/// Registrant identities run 1..=MAX_REGISTRANTS; 255 is reserved as the
/// "segment full" marker.
pub const MAX_REGISTRANTS: u8 = 254;

const OFF_COUNT: usize = 0;
const OFF_MSG_ID: usize = 1;
const OFF_OWNER: usize = 2;
const OFF_ACK: usize = 3;
const OFF_LEN: usize = 4;
const OFF_CSUM: usize = 8;
const OFF_PAYLOAD: usize = HEADER_SIZE as usize;

/// Slot owner value meaning "free".
const OWNER_NONE: u8 = 0;

// --- header field accessors (also used by tests and the demo) -------------

pub fn registered_count(buf: &[u8]) -> u8 {
    buf[OFF_COUNT]
}

pub fn message_id(buf: &[u8]) -> u8 {
    buf[OFF_MSG_ID]
}

pub fn owner_id(buf: &[u8]) -> u8 {
    buf[OFF_OWNER]
}

pub fn ack_count(buf: &[u8]) -> u8 {
    buf[OFF_ACK]
}

pub fn payload_len(buf: &[u8]) -> u32 {
    read_u32(buf, OFF_LEN)
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn write_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

/// A slot is free iff no owner is recorded and nothing is pending acks.
fn slot_free(buf: &[u8]) -> bool {
    buf[OFF_OWNER] == OWNER_NONE && buf[OFF_ACK] == 0
}

// --- operation outcomes ----------------------------------------------------

/// Outcome of [`FrameProto::try_send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendState {
    /// The message now occupies the slot.
    Success,
    /// The slot holds an unconsumed message; try again later.
    Busy,
    /// The caller has no identity (init not run or already released).
    Uninit,
    /// The payload cannot be sent (see the carried error).
    Failed(FrameError),
}

/// Outcome of [`FrameProto::try_recv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvState {
    /// A new message was validated and delivered.
    Success,
    /// The slot is free; nothing to read.
    Idle,
    /// The slot holds our own message or one we already consumed.
    Busy,
    /// The caller has no identity.
    Uninit,
    /// The slot content is invalid (see the carried error); nothing delivered.
    Failed(FrameError),
}

// --- protocol state machine -------------------------------------------------

/// Per-registrant protocol state: an identity byte (0 = unregistered) and
/// the privately remembered id of the last message consumed.
///
/// `C` is the checksum strategy stamped into and validated against the
/// header; both ends of a segment must agree on it.
///
/// Known limitation: `MsgId` rotates through 254 non-zero values, and
/// duplicate suppression compares against a single remembered id. A reader
/// that sleeps through an exact multiple of the cycle can mistake a fresh
/// message for one it already consumed. The wire format has no room for a
/// generation counter, so this is documented rather than fixed.
pub struct FrameProto<C: Checksum> {
    ident: u8,
    last_seen: u8,
    _checksum: PhantomData<C>,
}

impl<C: Checksum> Default for FrameProto<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Checksum> FrameProto<C> {
    pub fn new() -> Self {
        Self {
            ident: 0,
            last_seen: 0,
            _checksum: PhantomData,
        }
    }

    /// The identity assigned by [`init`](Self::init); 0 before registration.
    pub fn ident(&self) -> u8 {
        self.ident
    }

    /// Register with the segment: bump `RegisteredCount` and adopt the new
    /// value as this caller's identity. Caller must hold the region lock.
    pub fn init(&mut self, buf: &mut [u8]) -> Result<u8, FrameError> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(FrameError::RegionTooSmall {
                size: buf.len() as u32,
                header: HEADER_SIZE,
            });
        }
        if buf[OFF_COUNT] >= MAX_REGISTRANTS {
            return Err(FrameError::TooManyWriters);
        }
        buf[OFF_COUNT] += 1;
        self.ident = buf[OFF_COUNT];
        Ok(self.ident)
    }

    /// Undo the registration. Caller must hold the region lock.
    pub fn release(&mut self, buf: &mut [u8]) {
        if self.ident == 0 {
            return;
        }
        if buf.len() > OFF_COUNT && buf[OFF_COUNT] > 0 {
            buf[OFF_COUNT] -= 1;
        }
        self.ident = 0;
    }

    /// Attempt to place `payload` into the slot.
    pub fn try_send(&mut self, buf: &mut [u8], payload: &[u8]) -> SendState {
        if self.ident == 0 {
            return SendState::Uninit;
        }
        if buf.len() < HEADER_SIZE as usize {
            return SendState::Failed(FrameError::RegionTooSmall {
                size: buf.len() as u32,
                header: HEADER_SIZE,
            });
        }
        if payload.len() + HEADER_SIZE as usize > buf.len() {
            return SendState::Failed(FrameError::TooLarge {
                payload: payload.len() as u32,
                header: HEADER_SIZE,
                capacity: buf.len() as u32,
            });
        }
        if !slot_free(buf) {
            return SendState::Busy;
        }

        // Advance the rotating message id, skipping 0 ("no message").
        let next_id = match buf[OFF_MSG_ID].wrapping_add(1) {
            0 => 1,
            id => id,
        };
        buf[OFF_MSG_ID] = next_id;
        buf[OFF_OWNER] = self.ident;
        buf[OFF_ACK] = 0;
        write_u32(buf, OFF_LEN, payload.len() as u32);
        write_u32(buf, OFF_CSUM, C::checksum(payload));
        buf[OFF_PAYLOAD..OFF_PAYLOAD + payload.len()].copy_from_slice(payload);
        SendState::Success
    }

    /// Attempt to consume the slot's message. A validated payload is handed
    /// to `deliver` exactly once; acknowledgment bookkeeping then either
    /// bumps `AckCount` or, for the last expected reader, frees the slot.
    pub fn try_recv<F>(&mut self, buf: &mut [u8], mut deliver: F) -> RecvState
    where
        F: FnMut(&[u8]),
    {
        if self.ident == 0 {
            return RecvState::Uninit;
        }
        if buf.len() < HEADER_SIZE as usize {
            return RecvState::Failed(FrameError::RegionTooSmall {
                size: buf.len() as u32,
                header: HEADER_SIZE,
            });
        }
        if slot_free(buf) {
            return RecvState::Idle;
        }

        let count = buf[OFF_COUNT] as i32;
        let ack = buf[OFF_ACK] as i32;

        // Our own message, or one we already consumed: not new data for us.
        // Reclaim the slot opportunistically once every other registrant
        // has acknowledged it.
        if buf[OFF_OWNER] == self.ident || self.last_seen == buf[OFF_MSG_ID] {
            if ack >= count - 1 {
                clear_slot(buf);
            }
            return RecvState::Busy;
        }

        // Remember the id before validation: a corrupt message is reported
        // once per reader, not on every poll.
        self.last_seen = buf[OFF_MSG_ID];

        let len = read_u32(buf, OFF_LEN);
        if len as usize + HEADER_SIZE as usize > buf.len() {
            return RecvState::Failed(FrameError::TooLarge {
                payload: len,
                header: HEADER_SIZE,
                capacity: buf.len() as u32,
            });
        }
        let payload = &buf[OFF_PAYLOAD..OFF_PAYLOAD + len as usize];
        let stored = read_u32(buf, OFF_CSUM);
        let computed = C::checksum(payload);
        if stored != computed {
            return RecvState::Failed(FrameError::ChecksumMismatch { stored, computed });
        }

        deliver(payload);

        if ack + 1 == count - 1 {
            clear_slot(buf);
        } else {
            buf[OFF_ACK] = buf[OFF_ACK].wrapping_add(1);
        }
        RecvState::Success
    }
}

/// Reset the slot to free: zero everything from `OwnerId` onward.
/// `RegisteredCount` and the rotating `MsgId` survive reclamation.
pub fn clear_slot(buf: &mut [u8]) {
    buf[OFF_OWNER..].fill(0);
}
