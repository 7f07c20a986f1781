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


//! Core types for the driver's connection layer

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Handle to a registry slot.
///
/// The generation changes every time the slot is reused, so a handle kept
/// past its connection's teardown is detected instead of reaching a stranger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId {
    slot: usize,
    generation: u64,
}

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(slot: usize, generation: u64) -> Self {
        Self { slot, generation }
    }

    /// Registry slot index
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Slot generation at the time the connection was opened
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}.{}", self.slot, self.generation)
    }
}

/// Opaque handle for the session object that owns a connection.
///
/// Identities are chosen by the [`ServerHandler`](crate::ServerHandler) when
/// it accepts a connection; the connection layer never interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(u64);

impl Identity {
    /// Wrap a collaborator-chosen value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered and serving traffic
    Open,
    /// Teardown has started; further closes are refused
    Closing,
    /// Torn down, never visible in the registry
    Closed,
}

impl ConnectionState {
    /// Check if the connection is being or has been torn down
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Protocol spoken on a listening port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionKind {
    /// Telnet with negotiation and the command scheduler
    #[default]
    Telnet,
    /// Plain newline-delimited text, delivered as it arrives
    Ascii,
    /// Raw bytes, delivered as they arrive
    Binary,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telnet => write!(f, "telnet"),
            Self::Ascii => write!(f, "ascii"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Per-connection status flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionFlags {
    /// A hard I/O error was seen; teardown happens on the next pass
    pub net_dead: bool,
    /// Output is flushed but the connection is waiting to be closed
    pub awaiting_close: bool,
    /// The input buffer holds at least one complete command
    pub command_ready: bool,
    /// Character-at-a-time input
    pub single_char: bool,
    /// Echo is suppressed until the next command is taken
    pub no_echo: bool,
    /// The peer has negotiated at least one Telnet option
    pub telnet_detected: bool,
}

/// A command taken from a connection's input buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Connection the command came from
    pub connection: ConnectionId,
    /// Owner of the connection when the command was taken
    pub identity: Identity,
    /// Command text with backspaces resolved
    pub text: String,
}

/// Connection information snapshot
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: ConnectionId,
    /// Owning identity, if one has been bound
    pub owner: Option<Identity>,
    /// Protocol of the port the connection arrived on
    pub kind: ConnectionKind,
    /// Current state
    pub state: ConnectionState,
    /// Current flags
    pub flags: ConnectionFlags,
    /// Peer address
    pub peer_addr: SocketAddr,
    /// Local port the connection was accepted on
    pub local_port: u16,
    /// When the connection was accepted
    pub connected_at: Instant,
    /// When the last command was taken
    pub last_activity: Instant,
}

impl ConnectionInfo {
    /// Get the connection duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Get the idle duration
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Server snapshot for debug information
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Number of live connections
    pub active_connections: usize,
    /// Total connections since server start
    pub total_connections: u64,
    /// Listening addresses
    pub bind_addresses: Vec<SocketAddr>,
    /// Server uptime
    pub uptime: Duration,
}

impl fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TelnetServer {{ active: {}, total: {}, addrs: {:?}, uptime: {:?} }}",
            self.active_connections, self.total_connections, self.bind_addresses, self.uptime
        )
    }
}
