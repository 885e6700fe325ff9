// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// Framing-protocol tests on plain in-memory segments: registration,
// broadcast acknowledgment, duplicate suppression, checksum validation,
// capacity bounds, and slot reclamation.

use memchan::frame::{self, FrameProto, RecvState, SendState, HEADER_SIZE};
use memchan::{FrameError, SumChecksum};

type Proto = FrameProto<SumChecksum>;

fn segment(size: usize) -> Vec<u8> {
    vec![0u8; size]
}

/// Register `n` fresh protos against `buf`.
fn registrants(buf: &mut [u8], n: usize) -> Vec<Proto> {
    (0..n)
        .map(|_| {
            let mut p = Proto::new();
            p.init(buf).expect("init");
            p
        })
        .collect()
}

fn recv_collect(p: &mut Proto, buf: &mut [u8]) -> (RecvState, Vec<Vec<u8>>) {
    let mut got = Vec::new();
    let state = p.try_recv(buf, |payload| got.push(payload.to_vec()));
    (state, got)
}

// ===========================================================================
// Registration
// ===========================================================================

#[test]
fn uninit_proto_cannot_send_or_recv() {
    let mut buf = segment(64);
    let mut p = Proto::new();
    assert_eq!(p.try_send(&mut buf, b"x"), SendState::Uninit);
    let (state, got) = recv_collect(&mut p, &mut buf);
    assert_eq!(state, RecvState::Uninit);
    assert!(got.is_empty());
}

#[test]
fn registration_caps_at_254() {
    let mut buf = segment(64);
    let mut protos = registrants(&mut buf, 254);
    assert_eq!(protos.last().unwrap().ident(), 254);
    assert_eq!(frame::registered_count(&buf), 254);

    let mut extra = Proto::new();
    assert_eq!(extra.init(&mut buf), Err(FrameError::TooManyWriters));
    assert_eq!(frame::registered_count(&buf), 254);

    // Releasing one slot makes room again.
    protos.pop().unwrap().release(&mut buf);
    assert_eq!(extra.init(&mut buf).unwrap(), 254);
}

// ===========================================================================
// Broadcast delivery and acknowledgment
// ===========================================================================

#[test]
fn message_reaches_every_other_registrant_exactly_once() {
    let mut buf = segment(256);
    let mut ps = registrants(&mut buf, 4);

    let payload = b"broadcast me".to_vec();
    let (sender, readers) = ps.split_at_mut(1);
    assert_eq!(sender[0].try_send(&mut buf, &payload), SendState::Success);

    for reader in readers.iter_mut() {
        let (state, got) = recv_collect(reader, &mut buf);
        assert_eq!(state, RecvState::Success);
        assert_eq!(got, vec![payload.clone()]);
    }

    // All three other registrants acknowledged: the slot is free again.
    assert_eq!(frame::owner_id(&buf), 0);
    assert_eq!(frame::ack_count(&buf), 0);

    // A second poll by any reader finds nothing.
    let (state, got) = recv_collect(&mut ps[1], &mut buf);
    assert_eq!(state, RecvState::Idle);
    assert!(got.is_empty());
}

#[test]
fn sender_never_sees_its_own_message() {
    let mut buf = segment(64);
    let mut ps = registrants(&mut buf, 2);

    assert_eq!(ps[0].try_send(&mut buf, b"mine"), SendState::Success);
    let (state, got) = recv_collect(&mut ps[0], &mut buf);
    assert_eq!(state, RecvState::Busy);
    assert!(got.is_empty());
}

#[test]
fn duplicate_poll_is_suppressed() {
    let mut buf = segment(64);
    let mut ps = registrants(&mut buf, 3);

    assert_eq!(ps[0].try_send(&mut buf, b"once"), SendState::Success);
    let (state, _) = recv_collect(&mut ps[1], &mut buf);
    assert_eq!(state, RecvState::Success);

    // Same reader polls again before the last one catches up.
    let (state, got) = recv_collect(&mut ps[1], &mut buf);
    assert_eq!(state, RecvState::Busy);
    assert!(got.is_empty());
    assert_eq!(frame::ack_count(&buf), 1);
}

#[test]
fn slot_reclamation_with_three_registrants() {
    let mut buf = segment(64);
    let mut ps = registrants(&mut buf, 3);

    assert_eq!(ps[0].try_send(&mut buf, b"hello"), SendState::Success);

    // First reader: ack 0 -> 1, slot still occupied.
    let (state, _) = recv_collect(&mut ps[1], &mut buf);
    assert_eq!(state, RecvState::Success);
    assert_eq!(frame::ack_count(&buf), 1);
    assert_ne!(frame::owner_id(&buf), 0);

    // Second (last expected) reader frees the slot.
    let (state, _) = recv_collect(&mut ps[2], &mut buf);
    assert_eq!(state, RecvState::Success);
    assert_eq!(frame::owner_id(&buf), 0);
    assert_eq!(frame::ack_count(&buf), 0);
}

#[test]
fn at_most_one_writer_occupies_the_slot() {
    let mut buf = segment(64);
    let mut ps = registrants(&mut buf, 3);

    assert_eq!(ps[0].try_send(&mut buf, b"first"), SendState::Success);
    assert_eq!(ps[1].try_send(&mut buf, b"second"), SendState::Busy);

    // The slot still carries the first message.
    let (state, got) = recv_collect(&mut ps[2], &mut buf);
    assert_eq!(state, RecvState::Success);
    assert_eq!(got, vec![b"first".to_vec()]);
}

#[test]
fn resend_after_reclamation_advances_message_id_by_one() {
    let mut buf = segment(64);
    let mut ps = registrants(&mut buf, 2);

    assert_eq!(ps[0].try_send(&mut buf, b"a"), SendState::Success);
    let id1 = frame::message_id(&buf);
    let (state, _) = recv_collect(&mut ps[1], &mut buf);
    assert_eq!(state, RecvState::Success);

    assert_eq!(ps[0].try_send(&mut buf, b"b"), SendState::Success);
    assert_eq!(frame::message_id(&buf), id1 + 1);
}

// ===========================================================================
// Validation failures
// ===========================================================================

#[test]
fn corrupted_payload_fails_checksum_and_is_not_delivered() {
    let mut buf = segment(64);
    let mut ps = registrants(&mut buf, 2);

    assert_eq!(ps[0].try_send(&mut buf, b"fragile"), SendState::Success);
    buf[HEADER_SIZE as usize] ^= 0xff; // flip the first payload byte

    let (state, got) = recv_collect(&mut ps[1], &mut buf);
    assert!(matches!(
        state,
        RecvState::Failed(FrameError::ChecksumMismatch { .. })
    ));
    assert!(got.is_empty());

    // The reader recorded the id: the corrupt message is reported once,
    // then treated as already seen.
    let (state, _) = recv_collect(&mut ps[1], &mut buf);
    assert_eq!(state, RecvState::Busy);
}

#[test]
fn corrupt_length_field_fails_as_too_large() {
    let mut buf = segment(64);
    let mut ps = registrants(&mut buf, 2);

    assert_eq!(ps[0].try_send(&mut buf, b"ok"), SendState::Success);
    buf[4..8].copy_from_slice(&u32::MAX.to_le_bytes());

    let (state, got) = recv_collect(&mut ps[1], &mut buf);
    assert!(matches!(state, RecvState::Failed(FrameError::TooLarge { .. })));
    assert!(got.is_empty());
}

#[test]
fn capacity_bound_is_size_minus_header() {
    let mut buf = segment(64);
    let mut ps = registrants(&mut buf, 2);

    // 52 + 12 == 64 fits exactly.
    let fits = vec![0xabu8; 52];
    assert_eq!(ps[0].try_send(&mut buf, &fits), SendState::Success);

    let (state, got) = recv_collect(&mut ps[1], &mut buf);
    assert_eq!(state, RecvState::Success);
    assert_eq!(got, vec![fits]);

    // One byte more is rejected before touching the slot.
    let too_big = vec![0xabu8; 53];
    assert!(matches!(
        ps[0].try_send(&mut buf, &too_big),
        SendState::Failed(FrameError::TooLarge { .. })
    ));
}

#[test]
fn recv_on_free_slot_is_idle() {
    let mut buf = segment(64);
    let mut ps = registrants(&mut buf, 2);
    let (state, got) = recv_collect(&mut ps[1], &mut buf);
    assert_eq!(state, RecvState::Idle);
    assert!(got.is_empty());
}

// ===========================================================================
// Message id rotation
// ===========================================================================

#[test]
fn message_id_never_lands_on_zero_over_a_full_cycle() {
    let mut buf = segment(64);
    let mut ps = registrants(&mut buf, 2);

    let mut seen = Vec::new();
    for i in 0..300u32 {
        let payload = i.to_le_bytes();
        assert_eq!(ps[0].try_send(&mut buf, &payload), SendState::Success);
        let id = frame::message_id(&buf);
        assert_ne!(id, 0);
        seen.push(id);
        let (state, _) = recv_collect(&mut ps[1], &mut buf);
        assert_eq!(state, RecvState::Success);
    }
    // ids 1..=255 then wrap back to 1
    assert_eq!(seen[0], 1);
    assert_eq!(seen[254], 255);
    assert_eq!(seen[255], 1);
}
