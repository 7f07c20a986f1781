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


//! Name lookup backends

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use tracing::debug;

/// Blocking name service used by the resolver.
///
/// Calls run on the blocking thread pool, several at once, so implementations
/// may block on the network.
pub trait NameLookup: Send + Sync + 'static {
    /// Reverse lookup of an IPv4 address
    fn name_by_ip(&self, addr: Ipv4Addr) -> Option<String>;

    /// Forward lookup of a host name
    fn ip_by_name(&self, name: &str) -> Option<Ipv4Addr>;
}

/// Lookups through the operating system resolver
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLookup;

impl NameLookup for SystemLookup {
    fn name_by_ip(&self, addr: Ipv4Addr) -> Option<String> {
        reverse_lookup(addr)
    }

    fn ip_by_name(&self, name: &str) -> Option<Ipv4Addr> {
        (name, 0)
            .to_socket_addrs()
            .ok()?
            .find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
    }
}

/// Reverse lookup through `getnameinfo`.
///
/// The system falls back to the numeric form when the address has no name,
/// which counts as a failed lookup.
fn reverse_lookup(addr: Ipv4Addr) -> Option<String> {
    let ip = IpAddr::V4(addr);
    match dns_lookup::lookup_addr(&ip) {
        Ok(name) if name != ip.to_string() => Some(name),
        Ok(_) => None,
        Err(err) => {
            debug!(%addr, "Reverse lookup failed: {}", err);
            None
        }
    }
}

/// Fixed host table, for tests and isolated deployments
#[derive(Clone, Debug, Default)]
pub struct StaticLookup {
    hosts: HashMap<Ipv4Addr, String>,
}

impl StaticLookup {
    /// Creates an empty table
    pub fn new() -> Self {
        StaticLookup::default()
    }

    /// Adds an address/name pair, answering both directions
    pub fn with_host(mut self, addr: Ipv4Addr, name: impl Into<String>) -> Self {
        self.hosts.insert(addr, name.into());
        self
    }
}

impl NameLookup for StaticLookup {
    fn name_by_ip(&self, addr: Ipv4Addr) -> Option<String> {
        self.hosts.get(&addr).cloned()
    }

    fn ip_by_name(&self, name: &str) -> Option<Ipv4Addr> {
        self.hosts
            .iter()
            .find(|(_, host)| host.eq_ignore_ascii_case(name))
            .map(|(addr, _)| *addr)
    }
}
