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


//! Resolver configuration

use crate::protocol::DEFAULT_BUFFER_SIZE;
use std::net::SocketAddr;
use std::time::Duration;

/// Resolver process configuration
///
/// # Example
///
/// ```
/// use mudwire_resolver::ResolverConfig;
///
/// let config = ResolverConfig::new("127.0.0.1:9990".parse().unwrap())
///     .with_max_connections(4)
///     .with_max_events_per_pass(5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Address to listen on for driver connections
    pub bind_address: SocketAddr,

    /// Number of driver connection slots
    pub max_connections: usize,

    /// Queued events handled per loop iteration before polling again
    pub max_events_per_pass: usize,

    /// Size of each connection's leftover buffer
    pub buffer_size: usize,

    /// Upper bound on queue nodes, `None` for unbounded
    pub max_queued_events: Option<usize>,

    /// Longest wait for socket readiness
    pub poll_timeout: Duration,

    /// Lookups running on the blocking pool at once; further requests wait
    pub max_lookups_in_flight: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 9990)),
            max_connections: 8,
            max_events_per_pass: 10,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_queued_events: Some(1024),
            poll_timeout: Duration::from_secs(2),
            max_lookups_in_flight: 16,
        }
    }
}

impl ResolverConfig {
    /// Create a new configuration listening on the given address
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the number of connection slots
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-iteration event batch limit
    pub fn with_max_events_per_pass(mut self, max: usize) -> Self {
        self.max_events_per_pass = max;
        self
    }

    /// Set the leftover buffer size
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the queue node limit
    pub fn with_max_queued_events(mut self, max: Option<usize>) -> Self {
        self.max_queued_events = max;
        self
    }

    /// Set the readiness poll timeout
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set how many lookups may run at once
    pub fn with_max_lookups_in_flight(mut self, max: usize) -> Self {
        self.max_lookups_in_flight = max;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }

        if self.max_events_per_pass == 0 {
            return Err("max_events_per_pass must be greater than 0".to_string());
        }

        if self.buffer_size < 16 {
            return Err("buffer_size must be at least 16 bytes".to_string());
        }

        if self.max_queued_events == Some(0) {
            return Err("max_queued_events must be greater than 0".to_string());
        }

        if self.max_lookups_in_flight == 0 {
            return Err("max_lookups_in_flight must be greater than 0".to_string());
        }

        if self.poll_timeout.is_zero() {
            return Err("poll_timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}
