// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// Collaborator seams the channel is generic over: a checksum strategy for
// the wire header, serializer/deserializer for the payload type, and an
// error handler that receives human-readable failure strings. The defaults
// here are deliberately small; real embeddings supply their own codecs.

/// Checksum strategy for the slot header.
///
/// Stateless by design: the protocol stamps the checksum on send and
/// validates it on receive, so both sides must agree on the strategy.
pub trait Checksum {
    fn checksum(data: &[u8]) -> u32;
}

/// Wrapping byte-sum checksum. Weak but cheap; catches the truncation and
/// stale-slot corruption this channel actually worries about.
pub struct SumChecksum;

impl Checksum for SumChecksum {
    fn checksum(data: &[u8]) -> u32 {
        data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
    }
}

/// Turns an outbound message into bytes.
pub trait Serializer {
    type Item;

    fn serialize(&self, item: &Self::Item) -> Vec<u8>;
}

/// Turns received bytes back into a message.
pub trait Deserializer {
    type Item;

    fn deserialize(&self, bytes: &[u8]) -> Self::Item;
}

/// String payload codec. Deserialization is lossy on invalid UTF-8 rather
/// than failing: a message that passed the checksum is delivered as-is.
#[derive(Default, Clone, Copy)]
pub struct StringCodec;

impl Serializer for StringCodec {
    type Item = String;

    fn serialize(&self, item: &String) -> Vec<u8> {
        item.as_bytes().to_vec()
    }
}

impl Deserializer for StringCodec {
    type Item = String;

    fn deserialize(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Identity codec for raw byte payloads.
#[derive(Default, Clone, Copy)]
pub struct BytesCodec;

impl Serializer for BytesCodec {
    type Item = Vec<u8>;

    fn serialize(&self, item: &Vec<u8>) -> Vec<u8> {
        item.clone()
    }
}

impl Deserializer for BytesCodec {
    type Item = Vec<u8>;

    fn deserialize(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }
}

/// Receives human-readable failure strings from the channel.
///
/// Fire-and-forget; never called on the non-error hot path. The embedding
/// application decides whether to log, surface, or drop them.
pub trait ErrorHandler {
    fn error(&self, msg: String);
}

impl<F: Fn(String)> ErrorHandler for F {
    fn error(&self, msg: String) {
        self(msg)
    }
}

/// Error handler that writes failure strings to stderr.
#[derive(Default, Clone, Copy)]
pub struct StderrErrors;

impl ErrorHandler for StderrErrors {
    fn error(&self, msg: String) {
        eprintln!("memchan: {msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_checksum_adds_bytes() {
        assert_eq!(SumChecksum::checksum(&[1, 2, 3]), 6);
        assert_eq!(SumChecksum::checksum(&[]), 0);
    }

    #[test]
    fn sum_checksum_wraps() {
        let data = vec![0xffu8; 0x0100_0000 / 0xff + 1];
        // Must not panic in debug builds.
        let _ = SumChecksum::checksum(&data);
    }

    #[test]
    fn string_codec_round_trip() {
        let codec = StringCodec;
        let bytes = codec.serialize(&"hello".to_string());
        assert_eq!(codec.deserialize(&bytes), "hello");
    }

    #[test]
    fn string_codec_lossy_on_bad_utf8() {
        let codec = StringCodec;
        let s = codec.deserialize(&[0xff, 0xfe]);
        assert!(!s.is_empty());
    }

    #[test]
    fn closure_is_an_error_handler() {
        fn takes_handler<E: ErrorHandler>(h: &E) {
            h.error("boom".into());
        }
        let hits = std::cell::Cell::new(0);
        takes_handler(&|_msg: String| hits.set(hits.get() + 1));
        assert_eq!(hits.get(), 1);
    }
}
