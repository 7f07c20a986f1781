//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Integration tests for telnetcodec
//!
//! These tests drive the public decoder the way a connection does: bytes
//! arrive in arbitrary chunks and the events must not depend on the chunking.

use bytes::{Bytes, BytesMut};
use mudwire_telnetcodec::consts::{self, option};
use mudwire_telnetcodec::naws::WindowSize;
use mudwire_telnetcodec::{TelnetCodec, TelnetEvent, TelnetReply};
use proptest::collection::vec;
use proptest::prelude::*;
use tokio_util::codec::Decoder;

// ============================================================================
// Helper Functions
// ============================================================================

fn decode_chunks(codec: &mut TelnetCodec, chunks: &[&[u8]]) -> Vec<TelnetEvent> {
    let mut events = Vec::new();
    for chunk in chunks {
        let mut buffer = BytesMut::from(*chunk);
        while let Some(event) = codec.decode(&mut buffer).unwrap() {
            events.push(event);
        }
        assert!(buffer.is_empty());
    }
    events
}

/// Joins adjacent `Data` runs, which may be cut at different places
/// depending on how the input was chunked.
fn normalize(events: Vec<TelnetEvent>) -> Vec<TelnetEvent> {
    let mut out: Vec<TelnetEvent> = Vec::new();
    for event in events {
        if let TelnetEvent::Data(next) = &event {
            if let Some(TelnetEvent::Data(prev)) = out.last_mut() {
                let mut merged = BytesMut::from(&prev[..]);
                merged.extend_from_slice(next);
                *prev = merged.freeze();
                continue;
            }
        }
        out.push(event);
    }
    out
}

fn login_sequence() -> Vec<u8> {
    let mut input = Vec::new();
    input.extend_from_slice(&[consts::IAC, consts::WILL, option::TTYPE]);
    input.extend_from_slice(&[consts::IAC, consts::WILL, option::NAWS]);
    input.extend_from_slice(&[consts::IAC, consts::SB, option::NAWS, 0, 100, 0, 40]);
    input.extend_from_slice(&[consts::IAC, consts::SE]);
    input.extend_from_slice(b"wizard\r\n");
    input.extend_from_slice(&[consts::IAC, consts::SB, option::TTYPE, consts::TTYPE_IS]);
    input.extend_from_slice(b"ANSI");
    input.extend_from_slice(&[consts::IAC, consts::SE]);
    input.extend_from_slice(b"pass\xFF\xFFword\r\n");
    input
}

// ============================================================================
// Session Scenarios
// ============================================================================

#[test]
fn test_login_sequence() {
    let mut codec = TelnetCodec::new();
    let events = normalize(decode_chunks(&mut codec, &[&login_sequence()]));
    assert_eq!(
        events,
        vec![
            TelnetEvent::TelnetDetected,
            TelnetEvent::Reply(TelnetReply::TERMINAL_TYPE_SEND),
            TelnetEvent::WindowSize(WindowSize::new(100, 40)),
            TelnetEvent::Data(Bytes::from_static(b"wizard \x08\0")),
            TelnetEvent::TerminalType("ANSI".to_string()),
            TelnetEvent::Data(Bytes::from_static(b"pass\xFFword \x08\0")),
        ]
    );
}

#[test]
fn test_plain_client_is_not_detected() {
    let mut codec = TelnetCodec::new();
    let events = decode_chunks(&mut codec, &[b"who\n", b"quit\n"]);
    assert_eq!(
        normalize(events),
        vec![TelnetEvent::Data(Bytes::from_static(b"who \x08\0quit \x08\0"))]
    );
    assert!(!codec.is_telnet_detected());
}

#[test]
fn test_iac_iac_is_literal() {
    let mut codec = TelnetCodec::new();
    let events = decode_chunks(&mut codec, &[&[consts::IAC], &[consts::IAC]]);
    assert_eq!(events, vec![TelnetEvent::Data(Bytes::from_static(&[0xFF]))]);
}

#[test]
fn test_every_two_way_split_of_login() {
    let input = login_sequence();
    let whole = normalize(decode_chunks(&mut TelnetCodec::new(), &[&input]));
    for split in 0..=input.len() {
        let (head, tail) = input.split_at(split);
        let parts = normalize(decode_chunks(&mut TelnetCodec::new(), &[head, tail]));
        assert_eq!(parts, whole, "split at {split}");
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn split_frame_idempotence(
        prefix in vec(any::<u8>(), 0..48),
        suffix in vec(any::<u8>(), 0..48),
    ) {
        let mut input = prefix;
        input.extend_from_slice(&[consts::IAC, consts::WILL, option::TTYPE]);
        input.extend_from_slice(&suffix);

        let whole = normalize(decode_chunks(&mut TelnetCodec::new(), &[&input]));
        for split in 0..=input.len() {
            let (head, tail) = input.split_at(split);
            let parts = normalize(decode_chunks(&mut TelnetCodec::new(), &[head, tail]));
            prop_assert_eq!(&parts, &whole);
        }
    }

    #[test]
    fn byte_at_a_time_matches_single_pass(input in vec(any::<u8>(), 0..128)) {
        let whole = normalize(decode_chunks(&mut TelnetCodec::new(), &[&input]));
        let singles: Vec<&[u8]> = input.chunks(1).collect();
        let drip = normalize(decode_chunks(&mut TelnetCodec::new(), &singles));
        prop_assert_eq!(drip, whole);
    }
}
