// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memchan contributors
//
// Two-or-more-process chat over one shared slot.
//
// Usage:
//   demo_slot_chat <channel> <nick>
//
// Every line typed on stdin is broadcast to the other participants on the
// same channel name. Run one instance per terminal. EOF (Ctrl-D) drains
// the outbound queue and leaves.

use std::io::BufRead;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use memchan::{MemChannel, SharedRegion, StderrErrors, StringCodec, SumChecksum};

const SEGMENT_SIZE: u32 = 4096;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: demo_slot_chat <channel> <nick>");
        std::process::exit(1);
    }
    let channel = &args[1];
    let nick = args[2].clone();

    let mut ch: MemChannel<StringCodec, StringCodec, SumChecksum, _, SharedRegion> =
        MemChannel::open(channel, SEGMENT_SIZE, StringCodec, StringCodec, StderrErrors);
    if !ch.init_success() {
        eprintln!("could not open channel '{channel}'");
        std::process::exit(1);
    }
    println!("joined '{channel}' as {nick}; type lines, Ctrl-D to leave");

    // stdin is read on a side thread so the poll loop stays non-blocking.
    let (tx, rx) = mpsc::channel::<String>();
    let reader = thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        while ch.tick() {
            if let Some(msg) = ch.pop_recv() {
                println!("{msg}");
            }
        }

        match rx.try_recv() {
            Ok(line) => {
                if !line.is_empty() {
                    ch.send(&format!("[{nick}] {line}"));
                }
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => break,
        }

        thread::sleep(Duration::from_millis(20));
    }

    if ch.has_unsend() {
        println!("leaving; draining queued messages...");
    }
    ch.destroy(false);
    let _ = reader.join();
}
