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


//! Driver side of the address server conversation
//!
//! Lookups are written to the address server as framed requests and parked
//! in a fixed table until a response line arrives. A response is matched by
//! comparing its query string with every parked request: all requests that
//! asked the same question are answered by the same line, and a request whose
//! query comes back spelled differently is never answered.

use crate::ConnectionManager;
use crate::types::Identity;
use bytes::BytesMut;
use mudwire_resolver::{AddrRequest, AddrResponse, RequestCodec, RequestKind};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, LinesCodec};
use tracing::{debug, info, trace, warn};

/// Size of the pending request table
pub const MAX_PENDING: usize = 200;

/// Size of the address to name cache
pub const IP_CACHE_SIZE: usize = 200;

/// Longest response line accepted from the address server
const MAX_RESPONSE_LENGTH: usize = 200;

/// Called once with the outcome of a lookup
pub type ResolveCallback = Box<dyn FnOnce(&mut ConnectionManager, &Resolution) + Send>;

/// Position of a request in the pending table, counted from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(usize);

impl RequestHandle {
    fn from_slot(slot: usize) -> Self {
        RequestHandle(slot + 1)
    }

    /// The handle as the number handed to collaborators
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lookup-{}", self.0)
    }
}

/// Outcome of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The request that was answered; `None` for immediate failures
    pub handle: Option<RequestHandle>,
    /// The query as it was asked
    pub query: String,
    /// Host name, when known
    pub name: Option<String>,
    /// Dotted address, when known
    pub address: Option<String>,
}

impl Resolution {
    /// A lookup that failed before reaching the address server
    pub fn failed(query: impl Into<String>) -> Self {
        Resolution {
            handle: None,
            query: query.into(),
            name: None,
            address: None,
        }
    }

    /// Builds the outcome of a response line for the request in `handle`.
    ///
    /// A reverse lookup's query is the address and its result the name; a
    /// forward lookup is the other way around. A failed result leaves the
    /// address unset either way.
    pub fn from_response(handle: RequestHandle, response: &AddrResponse) -> Self {
        let query = response.query.clone();
        let result = response.result.clone();
        let (name, address) = match RequestKind::for_query(&query) {
            RequestKind::NameByIp => (result.clone(), result.map(|_| query.clone())),
            RequestKind::IpByName => (Some(query.clone()), result),
        };
        Resolution {
            handle: Some(handle),
            query,
            name,
            address,
        }
    }

    /// Whether both the name and the address are known
    pub fn is_resolved(&self) -> bool {
        self.name.is_some() && self.address.is_some()
    }
}

/// Ring of recently resolved addresses.
///
/// The newest entry overwrites the oldest; an address already present is not
/// added again.
#[derive(Debug)]
pub struct IpCache {
    entries: Vec<Option<(Ipv4Addr, String)>>,
    cursor: usize,
}

impl IpCache {
    /// Creates an empty cache of `capacity` entries
    pub fn new(capacity: usize) -> Self {
        IpCache {
            entries: (0..capacity.max(1)).map(|_| None).collect(),
            cursor: 0,
        }
    }

    /// Records a name for `addr` unless one is already cached
    pub fn insert(&mut self, addr: Ipv4Addr, name: impl Into<String>) {
        if self.lookup(addr).is_some() {
            return;
        }
        self.entries[self.cursor] = Some((addr, name.into()));
        self.cursor = (self.cursor + 1) % self.entries.len();
    }

    /// Cached name for `addr`
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<&str> {
        self.entries
            .iter()
            .flatten()
            .find(|(cached, _)| *cached == addr)
            .map(|(_, name)| name.as_str())
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct PendingRequest {
    query: String,
    owner: Identity,
    callback: ResolveCallback,
}

/// A response matched to a parked request, ready to run
pub(crate) struct Completion {
    pub(crate) callback: ResolveCallback,
    pub(crate) resolution: Resolution,
}

/// Connection to the address server plus the pending request table
pub struct ResolverClient {
    stream: Option<TcpStream>,
    codec: RequestCodec,
    lines: LinesCodec,
    read_buf: BytesMut,
    pending: Vec<Option<PendingRequest>>,
    cache: IpCache,
}

impl ResolverClient {
    /// A client with no address server; every lookup fails immediately
    pub fn disconnected() -> Self {
        ResolverClient {
            stream: None,
            codec: RequestCodec::default(),
            lines: LinesCodec::new_with_max_length(MAX_RESPONSE_LENGTH),
            read_buf: BytesMut::with_capacity(MAX_RESPONSE_LENGTH),
            pending: (0..MAX_PENDING).map(|_| None).collect(),
            cache: IpCache::new(IP_CACHE_SIZE),
        }
    }

    /// Connects to the address server at `address`
    pub async fn connect(address: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        info!("Connected to address server at {}", address);
        Ok(Self::from_stream(stream))
    }

    /// Uses an already connected stream
    pub fn from_stream(stream: TcpStream) -> Self {
        ResolverClient {
            stream: Some(stream),
            ..Self::disconnected()
        }
    }

    /// Whether the address server connection is up
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub(crate) fn stream(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }

    /// Number of parked requests
    pub fn pending_count(&self) -> usize {
        self.pending.iter().flatten().count()
    }

    /// The address to name cache
    pub fn cache(&self) -> &IpCache {
        &self.cache
    }

    /// Sends a lookup and parks `callback` until the answer arrives.
    ///
    /// The callback is handed back when the request cannot be sent, so the
    /// caller can report the failure right away.
    pub(crate) fn submit(
        &mut self,
        owner: Identity,
        query: &str,
        callback: ResolveCallback,
    ) -> std::result::Result<RequestHandle, ResolveCallback> {
        if self.stream.is_none() {
            debug!(query, "No address server, lookup fails");
            return Err(callback);
        }
        let Some(slot) = self.pending.iter().position(Option::is_none) else {
            warn!(query, "Pending lookup table full");
            return Err(callback);
        };
        if let Err(err) = self.send(AddrRequest::new(query)) {
            debug!(query, "Lookup not sent: {}", err);
            return Err(callback);
        }
        self.pending[slot] = Some(PendingRequest {
            query: query.to_string(),
            owner,
            callback,
        });
        let handle = RequestHandle::from_slot(slot);
        trace!(%handle, query, "Lookup parked");
        Ok(handle)
    }

    /// Asks for the name of `addr` to fill the cache; nobody waits for it
    pub(crate) fn query_name(&mut self, addr: Ipv4Addr) {
        if self.stream.is_none() {
            return;
        }
        if let Err(err) = self.send(AddrRequest::new(addr.to_string())) {
            debug!(%addr, "Name query not sent: {}", err);
        }
    }

    fn send(&mut self, request: AddrRequest) -> mudwire_resolver::Result<()> {
        let mut frame = BytesMut::new();
        self.codec.encode(request, &mut frame)?;
        let Some(stream) = self.stream.as_ref() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected).into());
        };
        match stream.try_write(&frame) {
            Ok(written) if written == frame.len() => Ok(()),
            Ok(written) => {
                warn!(written, expected = frame.len(), "Short write to address server");
                Err(io::Error::from(io::ErrorKind::WriteZero).into())
            }
            Err(err) => {
                if err.kind() != io::ErrorKind::WouldBlock {
                    warn!("Address server connection lost: {}", err);
                    self.stream = None;
                }
                Err(err.into())
            }
        }
    }

    /// Drops every request parked by `owner`. Returns how many were dropped.
    pub(crate) fn release_owner(&mut self, owner: Identity) -> usize {
        let mut released = 0;
        for entry in &mut self.pending {
            if entry.as_ref().is_some_and(|request| request.owner == owner) {
                *entry = None;
                released += 1;
            }
        }
        if released > 0 {
            debug!(%owner, released, "Released pending lookups");
        }
        released
    }

    /// Reads available response lines and returns the callbacks they
    /// complete. The cache is updated from every successful reverse lookup.
    pub(crate) fn read_responses(&mut self) -> Vec<Completion> {
        let Some(stream) = self.stream.as_ref() else {
            return Vec::new();
        };
        self.read_buf.reserve(MAX_RESPONSE_LENGTH);
        match stream.try_read_buf(&mut self.read_buf) {
            Ok(0) => {
                info!("Address server closed the connection");
                self.stream = None;
                return Vec::new();
            }
            Ok(count) => trace!(count, "Address server data"),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Vec::new(),
            Err(err) => {
                warn!("Address server read failed: {}", err);
                self.stream = None;
                return Vec::new();
            }
        }

        let mut completions = Vec::new();
        loop {
            match self.lines.decode(&mut self.read_buf) {
                Ok(Some(line)) => match AddrResponse::parse(&line) {
                    Some(response) => self.complete(&response, &mut completions),
                    None => warn!(line = %line, "Malformed address server response"),
                },
                Ok(None) => break,
                Err(err) => warn!("Address server response rejected: {}", err),
            }
        }
        completions
    }

    pub(crate) fn complete(&mut self, response: &AddrResponse, completions: &mut Vec<Completion>) {
        debug!(query = %response.query, result = ?response.result, "Address server answered");
        if let (RequestKind::NameByIp, Some(name)) =
            (RequestKind::for_query(&response.query), &response.result)
        {
            if let Ok(addr) = response.query.parse::<Ipv4Addr>() {
                self.cache.insert(addr, name.clone());
            }
        }
        for (slot, entry) in self.pending.iter_mut().enumerate() {
            if entry.as_ref().is_some_and(|request| request.query == response.query) {
                if let Some(request) = entry.take() {
                    completions.push(Completion {
                        callback: request.callback,
                        resolution: Resolution::from_response(RequestHandle::from_slot(slot), response),
                    });
                }
            }
        }
    }
}

impl fmt::Debug for ResolverClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverClient")
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_count())
            .field("cached", &self.cache.len())
            .finish()
    }
}
