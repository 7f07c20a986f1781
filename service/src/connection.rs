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


//! A live client connection

use crate::input::InputBuffer;
use crate::output::{FlushStatus, OutputBuffer, OutputSink};
use crate::{
    ConnectionFlags, ConnectionId, ConnectionInfo, ConnectionKind, ConnectionState, Identity,
    Result, ServerConfig, ServerMetrics, ServiceError,
};
use bytes::{BufMut, Bytes, BytesMut};
use mudwire_telnetcodec::naws::WindowSize;
use mudwire_telnetcodec::{TelnetCodec, TelnetEvent, TelnetReply};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;
use tracing::{debug, instrument, trace, warn};

/// Growth of one raw Telnet byte in the input buffer: a newline becomes
/// three bytes.
const TELNET_EXPANSION: usize = 3;

/// Input delivered straight to the handler at read time
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InputEvent {
    TerminalType(String),
    WindowSize(WindowSize),
    Suboption(Bytes),
    Line(String),
    Binary(Bytes),
}

/// Result of one non-blocking read
#[derive(Debug)]
pub(crate) enum ReadStatus {
    /// Bytes arrived; `raw` is exactly what the peer sent
    Received { raw: Bytes, events: Vec<InputEvent> },
    /// Nothing to read right now
    WouldBlock,
    /// The peer closed the connection
    Closed,
}

/// Counts bytes as they leave through the socket
struct CountingSink<'a> {
    stream: &'a mut TcpStream,
    sent: &'a mut u64,
    metrics: &'a ServerMetrics,
}

impl OutputSink for CountingSink<'_> {
    fn send(&mut self, bytes: &[u8], urgent: bool) -> io::Result<usize> {
        let written = self.stream.send(bytes, urgent)?;
        *self.sent += written as u64;
        self.metrics.bytes_sent(written as u64);
        Ok(written)
    }
}

/// One accepted client socket and everything the driver tracks for it
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    local_port: u16,
    kind: ConnectionKind,
    state: ConnectionState,
    flags: ConnectionFlags,
    owner: Option<Identity>,
    codec: TelnetCodec,
    input: InputBuffer,
    output: OutputBuffer,
    read_buf: BytesMut,
    connected_at: Instant,
    last_activity: Instant,
    bytes_sent: u64,
    bytes_received: u64,
    metrics: Arc<ServerMetrics>,
}

impl Connection {
    #[instrument(skip(stream, config, metrics), fields(connection_id = %id))]
    pub(crate) fn new(
        id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        local_port: u16,
        kind: ConnectionKind,
        config: &ServerConfig,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        debug!(%peer_addr, %kind, "Creating connection");
        let now = Instant::now();
        Connection {
            id,
            stream,
            peer_addr,
            local_port,
            kind,
            state: ConnectionState::Open,
            flags: ConnectionFlags::default(),
            owner: None,
            codec: TelnetCodec::with_scratch_capacity(config.scratch_capacity),
            input: InputBuffer::new(config.input_buffer_size),
            output: OutputBuffer::new(config.output_buffer_size),
            read_buf: BytesMut::with_capacity(config.input_buffer_size),
            connected_at: now,
            last_activity: now,
            bytes_sent: 0,
            bytes_received: 0,
            metrics,
        }
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Local port the connection was accepted on
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Protocol spoken on this connection
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Status flags
    pub fn flags(&self) -> ConnectionFlags {
        self.flags
    }

    /// Identity bound to this connection
    pub fn owner(&self) -> Option<Identity> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<Identity>) {
        self.owner = owner;
    }

    /// Time since the last command was taken
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Bytes written to the socket so far
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Bytes read from the socket so far
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Bytes waiting in the output buffer
    pub fn pending_output(&self) -> usize {
        self.output.len()
    }

    pub(crate) fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Readiness the event loop should wait for, if any.
    ///
    /// A connection with a command queued is not read from until the
    /// scheduler has drained it.
    pub(crate) fn interest(&self) -> Option<Interest> {
        if self.state != ConnectionState::Open || self.flags.net_dead {
            return None;
        }
        let writable = !self.output.is_empty();
        match (self.flags.command_ready, writable) {
            (true, false) => None,
            (true, true) => Some(Interest::WRITABLE),
            (false, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::READABLE | Interest::WRITABLE),
        }
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            owner: self.owner,
            kind: self.kind,
            state: self.state,
            flags: self.flags,
            peer_addr: self.peer_addr,
            local_port: self.local_port,
            connected_at: self.connected_at,
            last_activity: self.last_activity,
        }
    }

    // Output

    /// Queues text for the peer. Writes to a dead or closing connection are
    /// silently dropped.
    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.flags.net_dead || self.state != ConnectionState::Open {
            return Ok(());
        }
        let mut sink = CountingSink {
            stream: &mut self.stream,
            sent: &mut self.bytes_sent,
            metrics: &self.metrics,
        };
        let result = self.output.append(&mut sink, bytes);
        self.settle(result).map(|_| ())
    }

    /// Queues a canned Telnet sequence, flushing if it asks for it
    pub(crate) fn write_reply(&mut self, reply: TelnetReply) -> Result<()> {
        if self.flags.net_dead || self.state != ConnectionState::Open {
            return Ok(());
        }
        trace!(connection_id = %self.id, bytes = ?reply.bytes, "Queueing Telnet reply");
        let mut sink = CountingSink {
            stream: &mut self.stream,
            sent: &mut self.bytes_sent,
            metrics: &self.metrics,
        };
        let result = if reply.urgent {
            self.output.append_urgent(&mut sink, reply.bytes)
        } else {
            self.output.append(&mut sink, reply.bytes)
        };
        self.settle(result)?;
        if reply.flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes queued output without blocking
    pub(crate) fn flush(&mut self) -> Result<FlushStatus> {
        if self.flags.net_dead || self.output.is_empty() {
            return Ok(FlushStatus::Complete);
        }
        let mut sink = CountingSink {
            stream: &mut self.stream,
            sent: &mut self.bytes_sent,
            metrics: &self.metrics,
        };
        let result = self.output.flush(&mut sink);
        self.settle(result)
    }

    /// Turns a hard output failure into `net_dead`
    fn settle<T>(&mut self, result: io::Result<T>) -> Result<T> {
        result.map_err(|err| {
            warn!(connection_id = %self.id, "Write failed: {}", err);
            self.mark_dead();
            ServiceError::Io(err)
        })
    }

    pub(crate) fn mark_dead(&mut self) {
        if !self.flags.net_dead {
            self.flags.net_dead = true;
            self.metrics.connection_error();
        }
    }

    // Input

    /// Reads whatever the socket has without blocking
    pub(crate) fn read(&mut self) -> Result<ReadStatus> {
        let allowance = match self.kind {
            ConnectionKind::Telnet => self.input.read_allowance(TELNET_EXPANSION),
            ConnectionKind::Ascii => self.input.read_allowance(1),
            ConnectionKind::Binary => self.input.capacity().saturating_sub(1),
        };
        if allowance == 0 {
            return Ok(ReadStatus::WouldBlock);
        }

        self.read_buf.clear();
        self.read_buf.reserve(allowance);
        let read = self
            .stream
            .try_read_buf(&mut (&mut self.read_buf).limit(allowance));
        match read {
            Ok(0) => {
                debug!(connection_id = %self.id, "Peer closed connection");
                Ok(ReadStatus::Closed)
            }
            Ok(count) => {
                self.bytes_received += count as u64;
                self.metrics.bytes_received(count as u64);
                let raw = self.read_buf.split().freeze();
                let events = self.receive(&raw);
                Ok(ReadStatus::Received { raw, events })
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(ReadStatus::WouldBlock),
            Err(err) => {
                warn!(connection_id = %self.id, "Read failed: {}", err);
                self.mark_dead();
                Err(ServiceError::Io(err))
            }
        }
    }

    /// Feeds raw bytes through the connection's protocol
    pub(crate) fn receive(&mut self, raw: &[u8]) -> Vec<InputEvent> {
        match self.kind {
            ConnectionKind::Telnet => self.receive_telnet(raw),
            ConnectionKind::Ascii => {
                self.input.push(raw);
                let mut events = Vec::new();
                while let Some(line) = self.input.next_line() {
                    events.push(InputEvent::Line(String::from_utf8_lossy(&line).into_owned()));
                }
                events
            }
            ConnectionKind::Binary => vec![InputEvent::Binary(Bytes::copy_from_slice(raw))],
        }
    }

    fn receive_telnet(&mut self, raw: &[u8]) -> Vec<InputEvent> {
        let mut src = BytesMut::from(raw);
        let mut events = Vec::new();
        loop {
            match self.codec.decode(&mut src) {
                Ok(Some(TelnetEvent::Data(text))) => {
                    self.input.push(&text);
                }
                Ok(Some(TelnetEvent::Reply(reply))) => {
                    if let Err(err) = self.write_reply(reply) {
                        debug!(connection_id = %self.id, "Reply not sent: {}", err);
                    }
                }
                Ok(Some(TelnetEvent::TelnetDetected)) => {
                    debug!(connection_id = %self.id, "Telnet detected");
                    self.flags.telnet_detected = true;
                }
                Ok(Some(TelnetEvent::TerminalType(terminal))) => {
                    events.push(InputEvent::TerminalType(terminal));
                }
                Ok(Some(TelnetEvent::WindowSize(size))) => {
                    events.push(InputEvent::WindowSize(size));
                }
                Ok(Some(TelnetEvent::Subnegotiation(payload))) => {
                    events.push(InputEvent::Suboption(payload));
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(connection_id = %self.id, "Telnet decode failed: {}", err);
                    break;
                }
            }
        }
        if self.input.has_command(self.flags.single_char) {
            self.flags.command_ready = true;
        }
        events
    }

    /// Takes the next complete command from the input buffer.
    ///
    /// Clears `command_ready` once the buffer has no complete command left,
    /// and turns echo back on if it was suppressed for this command.
    pub(crate) fn next_command(&mut self) -> Option<String> {
        if !self.flags.command_ready {
            return None;
        }
        let single_char = self.flags.single_char;
        let Some(command) = self.input.first_command(single_char) else {
            self.flags.command_ready = false;
            return None;
        };
        if !self.input.has_command(single_char) {
            self.flags.command_ready = false;
        }
        if self.flags.no_echo {
            self.flags.no_echo = false;
            if let Err(err) = self.write_reply(TelnetReply::WONT_ECHO) {
                debug!(connection_id = %self.id, "Echo reply not sent: {}", err);
            }
        }
        self.last_activity = Instant::now();
        Some(String::from_utf8_lossy(&command).into_owned())
    }

    /// Switches echo suppression and character-at-a-time input
    pub(crate) fn set_input_mode(&mut self, no_echo: bool, single_char: bool) -> Result<()> {
        if no_echo && !self.flags.no_echo {
            self.write_reply(TelnetReply::WILL_ECHO)?;
        }
        self.flags.no_echo = no_echo;

        if single_char != self.flags.single_char {
            self.write_reply(if single_char {
                TelnetReply::WILL_SGA
            } else {
                TelnetReply::WONT_SGA
            })?;
            self.flags.single_char = single_char;
            self.codec.set_single_char(single_char);
            if self.input.has_command(single_char) {
                self.flags.command_ready = true;
            }
        }
        Ok(())
    }

    // Teardown

    /// Starts teardown: refuses a second close, then flushes what it can
    pub(crate) fn begin_close(&mut self) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(ServiceError::AlreadyClosed(self.id));
        }
        if let Err(err) = self.flush() {
            debug!(connection_id = %self.id, "Final flush failed: {}", err);
        }
        self.state = ConnectionState::Closing;
        Ok(())
    }

    /// Completes teardown. The socket closes when the connection is dropped.
    pub(crate) fn finish_close(&mut self) -> Duration {
        self.state = ConnectionState::Closed;
        self.input.clear();
        self.output.clear();
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("owner", &self.owner)
            .finish()
    }
}
