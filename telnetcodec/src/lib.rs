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


//! # Mudwire Telnet Protocol Codec
//!
//! This crate decodes the client side of a MUD driver's Telnet connections. It
//! turns a raw byte stream into clean command text and answers the in-band
//! parts of the protocol on its own.
//!
//! ## Overview
//!
//! The Telnet protocol (RFC 854) interleaves user text with commands
//! introduced by the IAC (Interpret As Command) byte. This codec handles:
//!
//! - **Data**: text bytes, with `IAC IAC` unescaped to a literal 0xFF and
//!   line endings rewritten for the driver's input buffer
//! - **Control commands**: Break, Interrupt Process, Abort Output and Are You
//!   There are answered with fixed replies
//! - **Option negotiation**: any DO, DONT, WILL or WONT from the peer proves
//!   it speaks Telnet; `DO TIMING-MARK` and `WILL TERMINAL-TYPE` are answered
//! - **Subnegotiation**: terminal type and window size (NAWS) payloads are
//!   decoded, anything else is passed on raw
//!
//! ## Core Components
//!
//! ### [`TelnetCodec`]
//!
//! The per-connection decoder. It implements [`tokio_util::codec::Decoder`]
//! and yields [`TelnetEvent`]s.
//!
//! ### [`transition`]
//!
//! The pure `(state, byte) -> (state, step)` function behind the decoder. It
//! can be exercised without a codec or a socket.
//!
//! ### [`TelnetReply`]
//!
//! Canned byte sequences queued on the connection's output, both the answers
//! produced by the decoder and the ones the driver sends on its own
//! (`DO TERMINAL-TYPE`, `WILL ECHO`, `GA`, ...).
//!
//! ## Usage Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use mudwire_telnetcodec::{TelnetCodec, TelnetEvent, TelnetReply};
//! use tokio_util::codec::Decoder;
//!
//! let mut codec = TelnetCodec::new();
//! let mut input = BytesMut::from(&b"hi\xFF\xFB\x18"[..]); // text + WILL TTYPE
//! let mut events = Vec::new();
//! while let Some(event) = codec.decode(&mut input).unwrap() {
//!     events.push(event);
//! }
//! assert_eq!(events[1], TelnetEvent::TelnetDetected);
//! assert_eq!(events[2], TelnetEvent::Reply(TelnetReply::TERMINAL_TYPE_SEND));
//! ```
//!
//! ## Line Endings
//!
//! In line mode a carriage return is dropped and a newline is written as
//! `space, backspace, NUL`. The NUL terminates the command and the
//! space/backspace pair erases itself, so an empty line still produces an
//! empty command. In character-at-a-time mode both bytes pass through.
//!
//! ## Thread Safety
//!
//! `TelnetCodec` holds per-connection state and is not meant to be shared.
//! Each connection owns its own codec instance.

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

mod codec;
pub mod consts;
mod event;
pub mod naws;
mod reply;
mod result;

pub use self::codec::{DecoderState, LINE_TERMINATOR, Step, TelnetCodec, transition};
pub use self::event::TelnetEvent;
pub use self::reply::TelnetReply;
pub use self::result::{CodecError, CodecResult};
