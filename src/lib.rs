// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// Cross-process, single-slot message channel over named shared memory.
// One 12-byte-headed slot acts as a broadcast mailbox: a message written by
// one registrant is read exactly once by every other registrant, and the
// slot frees itself after the last expected acknowledgment. Exclusion
// comes from a named mutex gated by a manual-reset idle event; everything
// is non-blocking polling apart from construction and teardown.

pub mod shm_name;

mod platform;

mod error;
pub use error::FrameError;

pub mod codec;
pub use codec::{
    BytesCodec, Checksum, Deserializer, ErrorHandler, Serializer, StderrErrors, StringCodec,
    SumChecksum,
};

pub mod frame;
pub use frame::{FrameProto, RecvState, SendState, HEADER_SIZE, MAX_REGISTRANTS};

mod region;
pub use region::{RegionAdapter, SharedRegion};

mod channel;
pub use channel::MemChannel;
