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


//! Server configuration

use crate::types::ConnectionKind;
use mudwire_telnetcodec::consts::DEFAULT_SCRATCH_CAPACITY;
use std::net::SocketAddr;
use std::time::Duration;

/// Most listening ports a server will open
pub const MAX_PORTS: usize = 5;

/// Default input buffer size, the longest command a player can type
pub const DEFAULT_INPUT_BUFFER_SIZE: usize = 2048;

/// Default output ring buffer size
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 4096;

/// A listening port and the protocol spoken on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// Address to bind; port 0 picks an ephemeral port
    pub address: SocketAddr,
    /// Protocol for connections accepted here
    pub kind: ConnectionKind,
}

impl PortConfig {
    /// A Telnet port
    pub fn telnet(address: SocketAddr) -> Self {
        Self {
            address,
            kind: ConnectionKind::Telnet,
        }
    }

    /// A newline-delimited text port
    pub fn ascii(address: SocketAddr) -> Self {
        Self {
            address,
            kind: ConnectionKind::Ascii,
        }
    }

    /// A raw binary port
    pub fn binary(address: SocketAddr) -> Self {
        Self {
            address,
            kind: ConnectionKind::Binary,
        }
    }
}

/// Server configuration
///
/// Use the builder pattern methods to customize the configuration.
///
/// # Example
///
/// ```
/// use mudwire_service::{PortConfig, ServerConfig};
/// use std::time::Duration;
///
/// let config = ServerConfig::new("127.0.0.1:4000".parse().unwrap())
///     .with_port(PortConfig::binary("127.0.0.1:4001".parse().unwrap()))
///     .with_max_connections(200)
///     .with_poll_timeout(Duration::from_millis(500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listening ports, at most [`MAX_PORTS`]
    pub ports: Vec<PortConfig>,

    /// Size of the connection registry
    pub max_connections: usize,

    /// Longest wait for socket activity when no commands are queued
    pub poll_timeout: Duration,

    /// Output ring buffer size per connection
    pub output_buffer_size: usize,

    /// Input buffer size per connection
    pub input_buffer_size: usize,

    /// Telnet subnegotiation scratch buffer size
    pub scratch_capacity: usize,

    /// Address server to send name lookups to
    pub address_server: Option<SocketAddr>,

    /// Line written to a client turned away because the registry is full
    pub rejection_message: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ports: vec![PortConfig::telnet(SocketAddr::from(([0, 0, 0, 0], 4000)))],
            max_connections: 64,
            poll_timeout: Duration::from_secs(1),
            output_buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
            input_buffer_size: DEFAULT_INPUT_BUFFER_SIZE,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
            address_server: None,
            rejection_message: "The server is full, please try again later.\n".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with a single Telnet port
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            ports: vec![PortConfig::telnet(bind_address)],
            ..Default::default()
        }
    }

    /// Add another listening port
    pub fn with_port(mut self, port: PortConfig) -> Self {
        self.ports.push(port);
        self
    }

    /// Set the registry size
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the poll timeout
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the output ring buffer size
    pub fn with_output_buffer_size(mut self, size: usize) -> Self {
        self.output_buffer_size = size;
        self
    }

    /// Set the input buffer size
    pub fn with_input_buffer_size(mut self, size: usize) -> Self {
        self.input_buffer_size = size;
        self
    }

    /// Set the subnegotiation scratch size
    pub fn with_scratch_capacity(mut self, size: usize) -> Self {
        self.scratch_capacity = size;
        self
    }

    /// Send name lookups to the address server at `address`
    pub fn with_address_server(mut self, address: SocketAddr) -> Self {
        self.address_server = Some(address);
        self
    }

    /// Set the registry-full rejection line
    pub fn with_rejection_message(mut self, message: impl Into<String>) -> Self {
        self.rejection_message = message.into();
        self
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.ports.is_empty() {
            return Err("at least one port must be configured".to_string());
        }

        if self.ports.len() > MAX_PORTS {
            return Err(format!("at most {} ports may be configured", MAX_PORTS));
        }

        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }

        if self.poll_timeout.is_zero() {
            return Err("poll_timeout must be greater than 0".to_string());
        }

        if self.output_buffer_size < 16 {
            return Err("output_buffer_size must be at least 16 bytes".to_string());
        }

        if self.input_buffer_size < 64 {
            return Err("input_buffer_size must be at least 64 bytes".to_string());
        }

        if self.scratch_capacity < 8 {
            return Err("scratch_capacity must be at least 8 bytes".to_string());
        }

        Ok(())
    }
}
