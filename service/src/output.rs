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


//! Output ring buffer
//!
//! Each connection queues outgoing text in a fixed-size circular buffer.
//! Appends translate `\n` to `\r\n` and flush on their own when the ring
//! fills up; flushes write with non-blocking sends and leave whatever the
//! socket would not take for the next pass.

use socket2::SockRef;
use std::io;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tracing::{trace, warn};

/// Destination for flushed bytes
pub trait OutputSink {
    /// Writes as much of `bytes` as the peer will take without blocking.
    ///
    /// `urgent` asks for the bytes to go out as TCP urgent data.
    fn send(&mut self, bytes: &[u8], urgent: bool) -> io::Result<usize>;
}

impl OutputSink for TcpStream {
    fn send(&mut self, bytes: &[u8], urgent: bool) -> io::Result<usize> {
        let stream: &TcpStream = self;
        if urgent {
            stream.try_io(Interest::WRITABLE, || {
                SockRef::from(stream).send_out_of_band(bytes)
            })
        } else {
            stream.try_write(bytes)
        }
    }
}

/// Outcome of a flush that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Everything queued has been written
    Complete,
    /// The socket would block; the rest stays queued
    Pending,
}

/// Fixed-capacity circular byte buffer.
///
/// `producer - consumer (mod capacity)` always equals `len`; when the ring is
/// full the two cursors meet and `len` tells full from empty.
#[derive(Debug)]
pub struct OutputBuffer {
    buf: Box<[u8]>,
    producer: usize,
    consumer: usize,
    len: usize,
    out_of_band: bool,
}

impl OutputBuffer {
    /// Creates an empty buffer holding up to `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        OutputBuffer {
            buf: vec![0; capacity.max(2)].into_boxed_slice(),
            producer: 0,
            consumer: 0,
            len: 0,
            out_of_band: false,
        }
    }

    /// Total capacity
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes waiting to be written
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Room left before the next flush
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Whether the next write goes out as urgent data
    pub fn is_out_of_band(&self) -> bool {
        self.out_of_band
    }

    /// Queues `bytes`, translating `\n` to `\r\n`.
    ///
    /// Flushes through `sink` whenever the ring fills. Returns the number of
    /// input bytes queued; anything past that was discarded because the sink
    /// would block while the ring was still full. A hard sink error aborts the
    /// append and is returned.
    pub fn append<S: OutputSink>(&mut self, sink: &mut S, bytes: &[u8]) -> io::Result<usize> {
        for (index, &byte) in bytes.iter().enumerate() {
            let needed = if byte == b'\n' { 2 } else { 1 };
            if self.free() < needed {
                self.flush(sink)?;
                if self.free() < needed {
                    warn!(
                        discarded = bytes.len() - index,
                        "Output buffer full, discarding rest of message"
                    );
                    return Ok(index);
                }
            }
            if byte == b'\n' {
                self.push(b'\r');
            }
            self.push(byte);
        }
        Ok(bytes.len())
    }

    /// Queues `bytes` and marks the next write as urgent
    pub fn append_urgent<S: OutputSink>(&mut self, sink: &mut S, bytes: &[u8]) -> io::Result<usize> {
        self.out_of_band = true;
        self.append(sink, bytes)
    }

    /// Writes queued bytes until the ring is empty or the sink would block.
    ///
    /// Any error other than would-block, including a zero-byte write, is
    /// returned and leaves the queued bytes in place.
    pub fn flush<S: OutputSink>(&mut self, sink: &mut S) -> io::Result<FlushStatus> {
        while self.len > 0 {
            let contiguous = self.len.min(self.capacity() - self.consumer);
            let chunk = &self.buf[self.consumer..self.consumer + contiguous];
            match sink.send(chunk, self.out_of_band) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "peer accepted no bytes",
                    ));
                }
                Ok(written) => {
                    trace!(written, urgent = self.out_of_band, "Flushed output");
                    self.consumer = (self.consumer + written) % self.capacity();
                    self.len -= written;
                    self.out_of_band = false;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FlushStatus::Pending);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(FlushStatus::Complete)
    }

    /// Drops everything queued
    pub fn clear(&mut self) {
        self.producer = 0;
        self.consumer = 0;
        self.len = 0;
        self.out_of_band = false;
    }

    fn push(&mut self, byte: u8) {
        self.buf[self.producer] = byte;
        self.producer = (self.producer + 1) % self.capacity();
        self.len += 1;
    }
}
