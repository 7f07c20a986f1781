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


use crate::consts::{self, ZERO_SENTINEL, option};
use crate::naws::WindowSize;
use crate::{CodecError, TelnetEvent, TelnetReply};
use bytes::{Buf, BufMut, BytesMut};
use std::collections::VecDeque;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

/// Written into the input buffer for every newline in line mode. The space
/// and backspace cancel out, so an empty line still produces a command.
pub const LINE_TERMINATOR: &[u8] = b" \x08\0";

/// Telnet decoder state. One byte of input moves the decoder from one state
/// to the next through [`transition`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecoderState {
    /// Normal Data
    #[default]
    NormalData,
    /// Received IAC, Next byte is Command
    InterpretAsCommand,
    /// Received DO Command, Next Byte is the option
    NegotiateDo,
    /// Received DONT Command, Next Byte is the option
    NegotiateDont,
    /// Received WILL Command, Next Byte is the option
    NegotiateWill,
    /// Received WONT Command, Next Byte is the option
    NegotiateWont,
    /// Inside `IAC SB`, collecting the payload
    Subnegotiate,
    /// Received IAC during Subnegotiation, Next Byte is command
    SubnegotiateIAC,
}

/// What the codec must do after feeding one byte through [`transition`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Byte consumed, nothing to do
    Skip,
    /// Append the byte to the clean text
    Emit(u8),
    /// Append [`LINE_TERMINATOR`] to the clean text
    EndOfLine,
    /// Queue a canned reply
    Reply(TelnetReply),
    /// The peer answered an option negotiation, which proves it speaks
    /// Telnet; some answers need a reply of our own
    Negotiated(Option<TelnetReply>),
    /// Reset the scratch buffer for a new subnegotiation
    BeginSubnegotiation,
    /// Append the byte to the scratch buffer
    Collect(u8),
    /// Close the subnegotiation and dispatch the scratch buffer
    EndSubnegotiation,
}

/// Pure transition function of the Telnet decoder.
///
/// `single_char` selects character-at-a-time handling of carriage return and
/// newline; in line mode carriage returns are dropped and newlines become
/// [`LINE_TERMINATOR`].
///
/// ```
/// use mudwire_telnetcodec::{DecoderState, Step, transition};
///
/// let (state, step) = transition(DecoderState::InterpretAsCommand, 255, false);
/// assert_eq!(state, DecoderState::NormalData);
/// assert_eq!(step, Step::Emit(255));
/// ```
pub fn transition(state: DecoderState, byte: u8, single_char: bool) -> (DecoderState, Step) {
    use DecoderState::{
        InterpretAsCommand, NegotiateDo, NegotiateDont, NegotiateWill, NegotiateWont, NormalData,
        Subnegotiate, SubnegotiateIAC,
    };

    match (state, byte) {
        (NormalData, consts::IAC) => (InterpretAsCommand, Step::Skip),
        (NormalData, b'\r') if !single_char => (NormalData, Step::Skip),
        (NormalData, b'\n') if !single_char => (NormalData, Step::EndOfLine),
        (NormalData, _) => (NormalData, Step::Emit(byte)),

        (InterpretAsCommand, consts::IAC) => (NormalData, Step::Emit(consts::IAC)),
        (InterpretAsCommand, consts::DO) => (NegotiateDo, Step::Skip),
        (InterpretAsCommand, consts::DONT) => (NegotiateDont, Step::Skip),
        (InterpretAsCommand, consts::WILL) => (NegotiateWill, Step::Skip),
        (InterpretAsCommand, consts::WONT) => (NegotiateWont, Step::Skip),
        (InterpretAsCommand, consts::SB) => (Subnegotiate, Step::BeginSubnegotiation),
        (InterpretAsCommand, consts::BRK) => (NormalData, Step::Reply(TelnetReply::BREAK)),
        (InterpretAsCommand, consts::IP) => (NormalData, Step::Reply(TelnetReply::INTERRUPT)),
        (InterpretAsCommand, consts::AO) => (NormalData, Step::Reply(TelnetReply::ABORT_OUTPUT)),
        (InterpretAsCommand, consts::AYT) => {
            (NormalData, Step::Reply(TelnetReply::ARE_YOU_THERE))
        }
        // SE without SB, DM, NOP, GA, EC, EL and unknown commands
        (InterpretAsCommand, _) => (NormalData, Step::Skip),

        (NegotiateDo, option::TM) => (
            NormalData,
            Step::Negotiated(Some(TelnetReply::TIMING_MARK)),
        ),
        (NegotiateWill, option::TTYPE) => (
            NormalData,
            Step::Negotiated(Some(TelnetReply::TERMINAL_TYPE_SEND)),
        ),
        (NegotiateDo | NegotiateDont | NegotiateWill | NegotiateWont, _) => {
            (NormalData, Step::Negotiated(None))
        }

        (Subnegotiate, consts::IAC) => (SubnegotiateIAC, Step::Skip),
        (Subnegotiate, _) => (Subnegotiate, Step::Collect(byte)),

        (SubnegotiateIAC, consts::IAC) => (Subnegotiate, Step::Collect(consts::IAC)),
        (SubnegotiateIAC, consts::SE) => (NormalData, Step::EndSubnegotiation),
        (SubnegotiateIAC, _) => transition(InterpretAsCommand, byte, single_char),
    }
}

/// Per-connection Telnet decoder.
///
/// `TelnetCodec` turns the raw byte stream of one connection into clean
/// command text plus a queue of side effects. All parsing state (the current
/// [`DecoderState`], the subnegotiation scratch buffer and any text not yet
/// handed out) lives in the codec, so a sequence split across two reads
/// decodes exactly as if it had arrived in one.
///
/// # Example
/// ```
/// use bytes::BytesMut;
/// use mudwire_telnetcodec::{TelnetCodec, TelnetEvent};
/// use tokio_util::codec::Decoder;
///
/// let mut codec = TelnetCodec::new();
/// let mut input = BytesMut::from(&b"look\r\n"[..]);
/// let event = codec.decode(&mut input).unwrap();
/// assert_eq!(event, Some(TelnetEvent::Data(bytes::Bytes::from_static(b"look \x08\0"))));
/// ```
#[derive(Debug)]
pub struct TelnetCodec {
    decoder_state: DecoderState,
    single_char: bool,
    telnet_detected: bool,
    scratch: BytesMut,
    scratch_capacity: usize,
    text: BytesMut,
    pending: VecDeque<TelnetEvent>,
}

impl TelnetCodec {
    /// Creates a codec in line mode with the default scratch capacity.
    pub fn new() -> TelnetCodec {
        TelnetCodec::default()
    }

    /// Creates a codec whose subnegotiation scratch buffer holds at most
    /// `capacity` bytes. Payload beyond that is consumed and dropped.
    pub fn with_scratch_capacity(capacity: usize) -> TelnetCodec {
        TelnetCodec {
            scratch: BytesMut::with_capacity(capacity),
            scratch_capacity: capacity,
            ..TelnetCodec::default()
        }
    }

    /// Current decoder state
    pub fn state(&self) -> DecoderState {
        self.decoder_state
    }

    /// Whether carriage return and newline pass through untouched
    pub fn is_single_char(&self) -> bool {
        self.single_char
    }

    /// Switch between line mode and character-at-a-time mode
    pub fn set_single_char(&mut self, single_char: bool) {
        self.single_char = single_char;
    }

    /// Whether the peer has answered any option negotiation
    pub fn is_telnet_detected(&self) -> bool {
        self.telnet_detected
    }

    fn advance(&mut self, byte: u8) {
        let (next, step) = transition(self.decoder_state, byte, self.single_char);
        self.decoder_state = next;
        match step {
            Step::Skip => {}
            Step::Emit(byte) => self.text.put_u8(byte),
            Step::EndOfLine => self.text.extend_from_slice(LINE_TERMINATOR),
            Step::Reply(reply) => self.pending.push_back(TelnetEvent::Reply(reply)),
            Step::Negotiated(reply) => {
                if !self.telnet_detected {
                    self.telnet_detected = true;
                    self.pending.push_back(TelnetEvent::TelnetDetected);
                }
                if let Some(reply) = reply {
                    self.pending.push_back(TelnetEvent::Reply(reply));
                }
            }
            Step::BeginSubnegotiation => self.scratch.clear(),
            Step::Collect(byte) => {
                if self.scratch.len() < self.scratch_capacity {
                    self.scratch
                        .put_u8(if byte == 0 { ZERO_SENTINEL } else { byte });
                } else {
                    trace!("subnegotiation scratch full, dropping 0x{:02X}", byte);
                }
            }
            Step::EndSubnegotiation => {
                let event = self.finish_subnegotiation();
                self.pending.push_back(event);
            }
        }
    }

    fn finish_subnegotiation(&mut self) -> TelnetEvent {
        let payload = self.scratch.split().freeze();
        match payload.first().copied() {
            // TTYPE IS is zero on the wire, so it sits in the buffer as the sentinel
            Some(option::TTYPE) if payload.get(1) == Some(&ZERO_SENTINEL) => {
                let terminal = String::from_utf8_lossy(&payload[2..]).into_owned();
                debug!(terminal = %terminal, "terminal type reported");
                TelnetEvent::TerminalType(terminal)
            }
            Some(option::NAWS) => {
                let size = WindowSize::from_subnegotiation(&payload[1..]);
                debug!(%size, "window size reported");
                TelnetEvent::WindowSize(size)
            }
            _ => TelnetEvent::Subnegotiation(payload),
        }
    }
}

impl Default for TelnetCodec {
    fn default() -> Self {
        TelnetCodec {
            decoder_state: DecoderState::NormalData,
            single_char: false,
            telnet_detected: false,
            scratch: BytesMut::with_capacity(consts::DEFAULT_SCRATCH_CAPACITY),
            scratch_capacity: consts::DEFAULT_SCRATCH_CAPACITY,
            text: BytesMut::new(),
            pending: VecDeque::new(),
        }
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetEvent;
    type Error = CodecError;

    /// Consumes bytes from `src` until a side effect is produced or `src` is
    /// empty.
    ///
    /// Clean text is returned as one `Data` run ahead of any side effect that
    /// followed it, so event order matches byte order. `Ok(None)` means every
    /// byte of `src` has been consumed and nothing is left to report.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<TelnetEvent>, Self::Error> {
        loop {
            if !self.pending.is_empty() {
                if !self.text.is_empty() {
                    return Ok(Some(TelnetEvent::Data(self.text.split().freeze())));
                }
                return Ok(self.pending.pop_front());
            }
            if !src.has_remaining() {
                break;
            }
            let byte = src.get_u8();
            self.advance(byte);
        }
        if self.text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(TelnetEvent::Data(self.text.split().freeze())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tracing_test::traced_test;

    // ============================================================================
    // Helper Functions
    // ============================================================================

    fn collect_all(codec: &mut TelnetCodec, mut src: BytesMut) -> Vec<TelnetEvent> {
        let mut out = Vec::new();
        while let Some(event) = codec.decode(&mut src).expect("decode should not error") {
            out.push(event);
        }
        out
    }

    fn decode_bytes(input: &[u8]) -> Vec<TelnetEvent> {
        collect_all(&mut TelnetCodec::new(), BytesMut::from(input))
    }

    fn data(bytes: &'static [u8]) -> TelnetEvent {
        TelnetEvent::Data(Bytes::from_static(bytes))
    }

    // ============================================================================
    // Transition Table
    // ============================================================================

    #[test]
    fn transition_data_bytes() {
        assert_eq!(
            transition(DecoderState::NormalData, b'a', false),
            (DecoderState::NormalData, Step::Emit(b'a'))
        );
        assert_eq!(
            transition(DecoderState::NormalData, consts::IAC, false),
            (DecoderState::InterpretAsCommand, Step::Skip)
        );
    }

    #[test]
    fn transition_line_mode_newlines() {
        assert_eq!(
            transition(DecoderState::NormalData, b'\r', false),
            (DecoderState::NormalData, Step::Skip)
        );
        assert_eq!(
            transition(DecoderState::NormalData, b'\n', false),
            (DecoderState::NormalData, Step::EndOfLine)
        );
    }

    #[test]
    fn transition_single_char_newlines() {
        assert_eq!(
            transition(DecoderState::NormalData, b'\r', true),
            (DecoderState::NormalData, Step::Emit(b'\r'))
        );
        assert_eq!(
            transition(DecoderState::NormalData, b'\n', true),
            (DecoderState::NormalData, Step::Emit(b'\n'))
        );
    }

    #[test]
    fn transition_negotiation_states() {
        assert_eq!(
            transition(DecoderState::InterpretAsCommand, consts::WILL, false),
            (DecoderState::NegotiateWill, Step::Skip)
        );
        assert_eq!(
            transition(DecoderState::NegotiateWill, option::TTYPE, false),
            (
                DecoderState::NormalData,
                Step::Negotiated(Some(TelnetReply::TERMINAL_TYPE_SEND))
            )
        );
        assert_eq!(
            transition(DecoderState::NegotiateWont, option::TTYPE, false),
            (DecoderState::NormalData, Step::Negotiated(None))
        );
        assert_eq!(
            transition(DecoderState::NegotiateDo, option::TM, false),
            (
                DecoderState::NormalData,
                Step::Negotiated(Some(TelnetReply::TIMING_MARK))
            )
        );
        assert_eq!(
            transition(DecoderState::NegotiateDo, option::ECHO, false),
            (DecoderState::NormalData, Step::Negotiated(None))
        );
    }

    #[test]
    fn transition_subnegotiation() {
        assert_eq!(
            transition(DecoderState::Subnegotiate, 0, false),
            (DecoderState::Subnegotiate, Step::Collect(0))
        );
        assert_eq!(
            transition(DecoderState::SubnegotiateIAC, consts::IAC, false),
            (DecoderState::Subnegotiate, Step::Collect(consts::IAC))
        );
        assert_eq!(
            transition(DecoderState::SubnegotiateIAC, consts::SE, false),
            (DecoderState::NormalData, Step::EndSubnegotiation)
        );
        // Anything else after IAC inside a subnegotiation is a plain command
        assert_eq!(
            transition(DecoderState::SubnegotiateIAC, consts::WILL, false),
            (DecoderState::NegotiateWill, Step::Skip)
        );
    }

    #[test]
    fn transition_stray_se_is_ignored() {
        assert_eq!(
            transition(DecoderState::InterpretAsCommand, consts::SE, false),
            (DecoderState::NormalData, Step::Skip)
        );
    }

    // ============================================================================
    // Decoding Text
    // ============================================================================

    #[test]
    fn decode_line_mode_text() {
        assert_eq!(decode_bytes(b"say hi\r\n"), vec![data(b"say hi \x08\0")]);
    }

    #[test]
    fn decode_single_char_text() {
        let mut codec = TelnetCodec::new();
        codec.set_single_char(true);
        let events = collect_all(&mut codec, BytesMut::from(&b"y\r\n"[..]));
        assert_eq!(events, vec![data(b"y\r\n")]);
    }

    #[test]
    fn decode_escaped_iac() {
        assert_eq!(
            decode_bytes(&[b'a', consts::IAC, consts::IAC, b'b']),
            vec![data(b"a\xFFb")]
        );
    }

    #[test]
    fn decode_empty_input() {
        assert!(decode_bytes(b"").is_empty());
    }

    // ============================================================================
    // Decoding Commands
    // ============================================================================

    #[test]
    fn decode_are_you_there() {
        let events = decode_bytes(&[b'x', consts::IAC, consts::AYT, b'y']);
        assert_eq!(
            events,
            vec![
                data(b"x"),
                TelnetEvent::Reply(TelnetReply::ARE_YOU_THERE),
                data(b"y"),
            ]
        );
    }

    #[test]
    fn decode_break_interrupt_abort() {
        let events = decode_bytes(&[
            consts::IAC,
            consts::BRK,
            consts::IAC,
            consts::IP,
            consts::IAC,
            consts::AO,
        ]);
        assert_eq!(
            events,
            vec![
                TelnetEvent::Reply(TelnetReply::BREAK),
                TelnetEvent::Reply(TelnetReply::INTERRUPT),
                TelnetEvent::Reply(TelnetReply::ABORT_OUTPUT),
            ]
        );
    }

    #[test]
    fn decode_ignored_commands() {
        let events = decode_bytes(&[consts::IAC, consts::NOP, consts::IAC, consts::SE, b'z']);
        assert_eq!(events, vec![data(b"z")]);
    }

    #[test]
    fn decode_will_ttype_detects_and_requests() {
        let mut codec = TelnetCodec::new();
        let events = collect_all(
            &mut codec,
            BytesMut::from(&[consts::IAC, consts::WILL, option::TTYPE][..]),
        );
        assert_eq!(
            events,
            vec![
                TelnetEvent::TelnetDetected,
                TelnetEvent::Reply(TelnetReply::TERMINAL_TYPE_SEND),
            ]
        );
        assert!(codec.is_telnet_detected());

        // Detection is reported once
        let events = collect_all(
            &mut codec,
            BytesMut::from(&[consts::IAC, consts::WONT, option::NAWS][..]),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn decode_do_timing_mark() {
        let events = decode_bytes(&[consts::IAC, consts::DO, option::TM]);
        assert_eq!(
            events,
            vec![
                TelnetEvent::TelnetDetected,
                TelnetEvent::Reply(TelnetReply::TIMING_MARK),
            ]
        );
    }

    // ============================================================================
    // Decoding Subnegotiation
    // ============================================================================

    #[test]
    fn decode_terminal_type() {
        let mut input = vec![consts::IAC, consts::SB, option::TTYPE, consts::TTYPE_IS];
        input.extend_from_slice(b"xterm-256color");
        input.extend_from_slice(&[consts::IAC, consts::SE]);
        assert_eq!(
            decode_bytes(&input),
            vec![TelnetEvent::TerminalType("xterm-256color".to_string())]
        );
    }

    #[test]
    fn decode_window_size() {
        let input = [
            consts::IAC,
            consts::SB,
            option::NAWS,
            0,
            80,
            0,
            24,
            consts::IAC,
            consts::SE,
        ];
        assert_eq!(
            decode_bytes(&input),
            vec![TelnetEvent::WindowSize(WindowSize::new(80, 24))]
        );
    }

    #[test]
    fn decode_window_size_with_escaped_iac() {
        let input = [
            consts::IAC,
            consts::SB,
            option::NAWS,
            0,
            consts::IAC,
            consts::IAC,
            0,
            24,
            consts::IAC,
            consts::SE,
        ];
        assert_eq!(
            decode_bytes(&input),
            vec![TelnetEvent::WindowSize(WindowSize::new(255, 24))]
        );
    }

    #[test]
    fn decode_unknown_subnegotiation() {
        let input = [consts::IAC, consts::SB, 201, 0, b'x', consts::IAC, consts::SE];
        assert_eq!(
            decode_bytes(&input),
            vec![TelnetEvent::Subnegotiation(Bytes::from_static(&[201, b'I', b'x']))]
        );
    }

    #[test]
    fn decode_scratch_overflow_is_consumed() {
        let mut codec = TelnetCodec::with_scratch_capacity(4);
        let mut input = vec![consts::IAC, consts::SB, 201];
        input.extend_from_slice(b"abcdefgh");
        input.extend_from_slice(&[consts::IAC, consts::SE]);
        input.extend_from_slice(b"ok");
        let events = collect_all(&mut codec, BytesMut::from(&input[..]));
        assert_eq!(
            events,
            vec![
                TelnetEvent::Subnegotiation(Bytes::from_static(b"\xC9abc")),
                data(b"ok"),
            ]
        );
    }

    #[test]
    #[traced_test]
    fn decode_default_scratch_overflow_is_logged() {
        let mut input = vec![consts::IAC, consts::SB, 201];
        input.extend_from_slice(&[b'z'; 120]);
        input.extend_from_slice(&[consts::IAC, consts::SE]);
        let events = decode_bytes(&input);

        let [TelnetEvent::Subnegotiation(payload)] = &events[..] else {
            panic!("expected one sub-option, got {:?}", events);
        };
        assert_eq!(payload.len(), consts::DEFAULT_SCRATCH_CAPACITY);
        assert!(logs_contain("subnegotiation scratch full"));
    }

    // ============================================================================
    // Chunked Input
    // ============================================================================

    #[test]
    fn decode_resumes_across_reads() {
        let mut codec = TelnetCodec::new();
        let first = collect_all(&mut codec, BytesMut::from(&[b'a', consts::IAC][..]));
        assert_eq!(first, vec![data(b"a")]);
        assert_eq!(codec.state(), DecoderState::InterpretAsCommand);

        let second = collect_all(&mut codec, BytesMut::from(&[consts::WILL][..]));
        assert!(second.is_empty());
        assert_eq!(codec.state(), DecoderState::NegotiateWill);

        let third = collect_all(&mut codec, BytesMut::from(&[option::TTYPE, b'b'][..]));
        assert_eq!(
            third,
            vec![
                TelnetEvent::TelnetDetected,
                TelnetEvent::Reply(TelnetReply::TERMINAL_TYPE_SEND),
                data(b"b"),
            ]
        );
    }
}
