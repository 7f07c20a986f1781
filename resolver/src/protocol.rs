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


//! Address resolution wire protocol
//!
//! A request travels as two frames:
//!
//! ```text
//! +---------+----------+   +----------+----------------+
//! | DATALEN | length   |   | kind tag | query ... \0   |
//! +---------+----------+   +----------+----------------+
//!   i32 LE    i32 LE         i32 LE     `length - 4` bytes
//! ```
//!
//! The answer is a single text line, `"<query> <result>\n"`, where the
//! result is `0` when the lookup failed.

use crate::{ProtocolError, Result};
use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

/// Message tag: resolve a dotted-decimal address to a host name
pub const NAME_BY_IP: i32 = 0;
/// Message tag: resolve a host name to a dotted-decimal address
pub const IP_BY_NAME: i32 = 1;
/// Frame tag announcing the length of the following message
pub const DATALEN: i32 = 2;

/// Size of the fixed buffer a request is assembled in.
pub const REQUEST_BUFFER_SIZE: usize = 100;
/// Header words (DATALEN, length, kind) that precede the query.
pub const REQUEST_OVERHEAD: usize = 12;
/// Longest query that fits in a request buffer together with its NUL.
pub const MAX_QUERY_LENGTH: usize = REQUEST_BUFFER_SIZE - REQUEST_OVERHEAD - 1;
/// Default size of a receiver's leftover buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 256;
/// Result sent back when a lookup fails.
pub const FAILED: &str = "0";

const WORD: usize = 4;

/// Kind of lookup carried by a request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Address to host name
    NameByIp,
    /// Host name to address
    IpByName,
}

impl RequestKind {
    /// Picks the lookup direction for a query: anything starting with a
    /// digit is treated as an address.
    pub fn for_query(query: &str) -> Self {
        if query.starts_with(|c: char| c.is_ascii_digit()) {
            RequestKind::NameByIp
        } else {
            RequestKind::IpByName
        }
    }

    /// Wire tag of this kind
    pub fn tag(self) -> i32 {
        match self {
            RequestKind::NameByIp => NAME_BY_IP,
            RequestKind::IpByName => IP_BY_NAME,
        }
    }

    /// Kind for a wire tag, if the tag names a lookup
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            NAME_BY_IP => Some(RequestKind::NameByIp),
            IP_BY_NAME => Some(RequestKind::IpByName),
            _ => None,
        }
    }
}

/// A single lookup request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrRequest {
    /// Lookup direction
    pub kind: RequestKind,
    /// Dotted-decimal address or host name
    pub query: String,
}

impl AddrRequest {
    /// Creates a request whose kind is inferred from the query
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        AddrRequest {
            kind: RequestKind::for_query(&query),
            query,
        }
    }

    /// Number of bytes the request occupies on the wire
    pub fn encoded_len(&self) -> usize {
        REQUEST_OVERHEAD + self.query.len() + 1
    }

    /// Checks that the query can be framed
    pub fn validate(&self) -> Result<()> {
        if self.query.is_empty() {
            return Err(ProtocolError::EmptyQuery);
        }
        if self.query.len() > MAX_QUERY_LENGTH {
            return Err(ProtocolError::QueryTooLong {
                length: self.query.len(),
                max: MAX_QUERY_LENGTH,
            });
        }
        if !self.query.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(ProtocolError::Unprintable);
        }
        Ok(())
    }
}

/// Answer to a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrResponse {
    /// The query exactly as it was received
    pub query: String,
    /// Resolved name or address, `None` when the lookup failed
    pub result: Option<String>,
}

impl AddrResponse {
    /// Creates a successful response
    pub fn resolved(query: impl Into<String>, result: impl Into<String>) -> Self {
        AddrResponse {
            query: query.into(),
            result: Some(result.into()),
        }
    }

    /// Creates a failed response
    pub fn failed(query: impl Into<String>) -> Self {
        AddrResponse {
            query: query.into(),
            result: None,
        }
    }

    /// Appends the response line to `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        let result = self.result.as_deref().unwrap_or(FAILED);
        dst.reserve(self.query.len() + result.len() + 2);
        dst.put_slice(self.query.as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(result.as_bytes());
        dst.put_u8(b'\n');
    }

    /// Parses a response line (without its newline). Returns `None` when the
    /// line has no separator.
    pub fn parse(line: &str) -> Option<Self> {
        let (query, result) = line.trim_end_matches(['\r', '\n']).split_once(' ')?;
        let result = result.trim();
        Some(AddrResponse {
            query: query.to_string(),
            result: (result != FAILED && !result.is_empty()).then(|| result.to_string()),
        })
    }
}

/// Codec for the request side of the protocol.
///
/// The decoder works directly on a connection's leftover buffer: bytes that
/// do not yet form a complete request stay in `src` for the next read. A
/// `DATALEN` frame makes the decoder wait until the announced number of bytes
/// is present; if they are not, the scan rewinds to just before the `DATALEN`
/// frame so nothing is lost.
#[derive(Clone, Debug)]
pub struct RequestCodec {
    max_length: usize,
}

impl RequestCodec {
    /// Creates a codec for a leftover buffer of `max_length` bytes.
    /// Announced lengths whose frame could not fit in it are treated as
    /// corrupt.
    pub fn new(max_length: usize) -> Self {
        RequestCodec { max_length }
    }

    /// Size of the leftover buffer this codec decodes from
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Largest announced length accepted: the message plus its `DATALEN`
    /// frame must fit in the leftover buffer.
    pub fn max_declared_length(&self) -> usize {
        self.max_length.saturating_sub(2 * WORD)
    }
}

impl Default for RequestCodec {
    fn default() -> Self {
        RequestCodec::new(DEFAULT_BUFFER_SIZE)
    }
}

impl Decoder for RequestCodec {
    type Item = AddrRequest;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<AddrRequest>> {
        let mut pos = 0;
        let mut expecting = 0;
        let mut datalen_at = None;

        let request = loop {
            let remaining = src.len() - pos;
            if remaining <= WORD {
                break None;
            }
            let tag = LittleEndian::read_i32(&src[pos..pos + WORD]);
            match tag {
                DATALEN => {
                    if remaining <= 2 * WORD {
                        break None;
                    }
                    let declared = LittleEndian::read_i32(&src[pos + WORD..pos + 2 * WORD]);
                    match usize::try_from(declared) {
                        Ok(length) if length > 0 && length <= self.max_declared_length() => {
                            expecting = length;
                            datalen_at = Some(pos);
                        }
                        _ => {
                            warn!(declared, "bad data length, ignoring");
                            expecting = 0;
                            datalen_at = None;
                        }
                    }
                    pos += 2 * WORD;
                }
                NAME_BY_IP | IP_BY_NAME => {
                    if expecting > 0 && remaining < expecting {
                        break None;
                    }
                    let body = &src[pos + WORD..];
                    let end = body
                        .iter()
                        .position(|b| !b.is_ascii_graphic())
                        .unwrap_or(body.len());
                    if end == body.len() {
                        // terminator not received yet
                        break None;
                    }
                    if end == 0 || body[end] != 0 {
                        trace!(pos, "empty or unprintable query, resynchronising");
                        pos += 1;
                        continue;
                    }
                    let query = String::from_utf8_lossy(&body[..end]).into_owned();
                    let kind = RequestKind::from_tag(tag).unwrap_or(RequestKind::IpByName);
                    pos += WORD + end + 1;
                    break Some(AddrRequest { kind, query });
                }
                _ => {
                    trace!(pos, tag, "unknown message tag, resynchronising");
                    pos += 1;
                }
            }
        };

        match request {
            Some(request) => {
                src.advance(pos);
                Ok(Some(request))
            }
            None => {
                // Keep an incomplete message together with the DATALEN that announced it
                let keep_from = match datalen_at {
                    Some(at) if expecting > 0 => at,
                    _ => pos,
                };
                src.advance(keep_from);
                Ok(None)
            }
        }
    }
}

impl Encoder<AddrRequest> for RequestCodec {
    type Error = ProtocolError;

    fn encode(&mut self, request: AddrRequest, dst: &mut BytesMut) -> Result<()> {
        request.validate()?;
        let message_length = WORD + request.query.len() + 1;
        dst.reserve(request.encoded_len());
        dst.put_i32_le(DATALEN);
        dst.put_i32_le(i32::try_from(message_length).unwrap_or(i32::MAX));
        dst.put_i32_le(request.kind.tag());
        dst.put_slice(request.query.as_bytes());
        dst.put_u8(0);
        Ok(())
    }
}
