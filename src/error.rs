// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// Failure taxonomy for the framing protocol. OS-level failures from the
// region adapter stay `std::io::Error` so they carry the raw OS error text;
// everything the protocol itself can detect is enumerated here.

use thiserror::Error;

/// Failures detected by the framing protocol.
///
/// `Busy`, `Idle`, and `Uninit` are flow-control states, not errors; they
/// live on [`SendState`](crate::frame::SendState) and
/// [`RecvState`](crate::frame::RecvState) instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// A 255th registrant tried to attach to the segment.
    #[error("shared segment registrant count is at its maximum")]
    TooManyWriters,

    /// On send: the payload plus header does not fit the segment.
    /// On receive: the length field claims more bytes than the segment holds.
    #[error("message too large ({payload} + {header} > {capacity})")]
    TooLarge {
        payload: u32,
        header: u32,
        capacity: u32,
    },

    /// The stored checksum does not match the payload.
    #[error("message checksum failed (stored {stored:#010x}, computed {computed:#010x})")]
    ChecksumMismatch { stored: u32, computed: u32 },

    /// The segment cannot even hold the fixed header.
    #[error("shared segment too small for the slot header ({size} < {header})")]
    RegionTooSmall { size: u32, header: u32 },
}
