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


//! Canned byte sequences the driver writes back to a Telnet peer

use crate::consts::{self, option};

/// A fixed sequence of bytes to queue on a connection's output.
///
/// Replies are produced by the decoder while it answers in-band commands, and
/// are also used directly by the driver when it changes negotiation state
/// (echo, suppress-go-ahead) or ends a prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TelnetReply {
    /// Bytes to append to the output buffer
    pub bytes: &'static [u8],
    /// Flush the output buffer right after appending
    pub flush: bool,
    /// Send as urgent (out-of-band) data
    pub urgent: bool,
}

impl TelnetReply {
    const fn plain(bytes: &'static [u8]) -> Self {
        TelnetReply {
            bytes,
            flush: false,
            urgent: false,
        }
    }

    const fn flushed(bytes: &'static [u8]) -> Self {
        TelnetReply {
            bytes,
            flush: true,
            urgent: false,
        }
    }

    /// Answer to `IAC BREAK`
    pub const BREAK: TelnetReply =
        TelnetReply::flushed(&[28, consts::IAC, consts::WILL, option::TM]);

    /// Answer to `IAC IP`
    pub const INTERRUPT: TelnetReply =
        TelnetReply::plain(&[127, consts::IAC, consts::WILL, option::TM]);

    /// Answer to `IAC AO`, sent out-of-band
    pub const ABORT_OUTPUT: TelnetReply = TelnetReply {
        bytes: &[consts::IAC, consts::DM],
        flush: true,
        urgent: true,
    };

    /// Answer to `IAC AYT`
    pub const ARE_YOU_THERE: TelnetReply = TelnetReply::plain(b"\n[-Yes-] \n");

    /// Answer to `IAC DO TIMING-MARK`
    pub const TIMING_MARK: TelnetReply =
        TelnetReply::flushed(&[consts::IAC, consts::WILL, option::TM]);

    /// Sent after the peer agrees to `TERMINAL-TYPE`
    pub const TERMINAL_TYPE_SEND: TelnetReply = TelnetReply::flushed(&[
        consts::IAC,
        consts::SB,
        option::TTYPE,
        consts::TTYPE_SEND,
        consts::IAC,
        consts::SE,
    ]);

    /// Ask the peer for its terminal type
    pub const DO_TERMINAL_TYPE: TelnetReply =
        TelnetReply::plain(&[consts::IAC, consts::DO, option::TTYPE]);

    /// Ask the peer to report its window size
    pub const DO_NAWS: TelnetReply = TelnetReply::plain(&[consts::IAC, consts::DO, option::NAWS]);

    /// Stop the peer echoing locally (password entry)
    pub const WILL_ECHO: TelnetReply =
        TelnetReply::flushed(&[consts::IAC, consts::WILL, option::ECHO]);

    /// Let the peer echo locally again
    pub const WONT_ECHO: TelnetReply =
        TelnetReply::flushed(&[consts::IAC, consts::WONT, option::ECHO]);

    /// Enter character-at-a-time mode
    pub const WILL_SGA: TelnetReply =
        TelnetReply::flushed(&[consts::IAC, consts::WILL, option::SGA]);

    /// Leave character-at-a-time mode
    pub const WONT_SGA: TelnetReply =
        TelnetReply::flushed(&[consts::IAC, consts::WONT, option::SGA]);

    /// Marks the end of a prompt
    pub const GO_AHEAD: TelnetReply = TelnetReply::plain(&[consts::IAC, consts::GA]);
}
