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


//! Lock-free metrics for the driver's connection layer
//!
//! Every recorder updates both the local counters behind
//! [`ServerMetrics::snapshot`] and the process-wide `metrics` registry, so an
//! installed exporter sees the same numbers.

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection counts
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,

    // Throughput
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    commands_dispatched: AtomicU64,

    // Address server
    resolver_requests: AtomicU64,
    resolver_responses: AtomicU64,
    resolver_failures: AtomicU64,

    // Errors
    connection_errors: AtomicU64,

    total_connection_duration_ns: AtomicU64,
    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            commands_dispatched: AtomicU64::new(0),
            resolver_requests: AtomicU64::new(0),
            resolver_responses: AtomicU64::new(0),
            resolver_failures: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Connection tracking

    /// Record a new connection being opened
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        counter!("mudwire.connections.total").increment(1);
        gauge!("mudwire.connections.active").increment(1.0);
    }

    /// Record a connection being closed
    pub fn connection_closed(&self, duration: Duration) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.total_connection_duration_ns.fetch_add(
            u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        gauge!("mudwire.connections.active").decrement(1.0);
    }

    /// Record a connection turned away at accept
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
        counter!("mudwire.connections.rejected").increment(1);
    }

    /// Get the current number of active connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of connections since server start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    // Throughput tracking

    /// Record bytes sent
    pub fn bytes_sent(&self, count: u64) {
        self.bytes_sent.fetch_add(count, Ordering::Relaxed);
        counter!("mudwire.bytes.sent").increment(count);
    }

    /// Record bytes received
    pub fn bytes_received(&self, count: u64) {
        self.bytes_received.fetch_add(count, Ordering::Relaxed);
        counter!("mudwire.bytes.received").increment(count);
    }

    /// Record a command handed to the dispatcher
    pub fn command_dispatched(&self) {
        self.commands_dispatched.fetch_add(1, Ordering::Relaxed);
        counter!("mudwire.commands.dispatched").increment(1);
    }

    // Address server tracking

    /// Record a lookup sent to the address server
    pub fn resolver_request(&self) {
        self.resolver_requests.fetch_add(1, Ordering::Relaxed);
        counter!("mudwire.resolver.requests").increment(1);
    }

    /// Record a response line from the address server
    pub fn resolver_response(&self) {
        self.resolver_responses.fetch_add(1, Ordering::Relaxed);
        counter!("mudwire.resolver.responses").increment(1);
    }

    /// Record a lookup failed without reaching the address server
    pub fn resolver_failure(&self) {
        self.resolver_failures.fetch_add(1, Ordering::Relaxed);
        counter!("mudwire.resolver.failures").increment(1);
    }

    // Error tracking

    /// Record a connection error
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
        counter!("mudwire.errors.connection").increment(1);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            commands_dispatched: self.commands_dispatched.load(Ordering::Relaxed),
            resolver_requests: self.resolver_requests.load(Ordering::Relaxed),
            resolver_responses: self.resolver_responses.load(Ordering::Relaxed),
            resolver_failures: self.resolver_failures.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let total = self.total_connections.load(Ordering::Relaxed);
        if total == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / total)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total connections since server start
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Connections turned away because the registry was full
    pub rejected_connections: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Commands handed to the dispatcher
    pub commands_dispatched: u64,
    /// Lookups sent to the address server
    pub resolver_requests: u64,
    /// Response lines received from the address server
    pub resolver_responses: u64,
    /// Lookups failed immediately
    pub resolver_failures: u64,
    /// Total connection errors
    pub connection_errors: u64,
    /// Server uptime
    pub uptime: Duration,
    /// Average connection duration
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    /// Calculate commands per second
    pub fn commands_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.commands_dispatched as f64 / self.uptime.as_secs_f64()
    }

    /// Calculate bytes per second (sent)
    pub fn bytes_sent_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.bytes_sent as f64 / self.uptime.as_secs_f64()
    }
}
