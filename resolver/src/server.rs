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


//! Address server event loop
//!
//! The server accepts driver connections into a fixed table of slots. Socket
//! readiness is turned into [`QueuedEvent`]s on a recycling [`EventQueue`],
//! and each pass of the loop handles at most
//! [`ResolverConfig::max_events_per_pass`] of them before polling the sockets
//! again, so one chatty driver cannot starve new connections.
//!
//! Lookups run on the blocking pool, at most
//! [`ResolverConfig::max_lookups_in_flight`] at a time, and answers go back in
//! the order they finish. A slow name server only holds up its own request.

use crate::protocol::{AddrRequest, AddrResponse, RequestCodec, RequestKind};
use crate::queue::EventQueue;
use crate::{NameLookup, ProtocolError, ResolverConfig, Result};
use bytes::{BufMut, BytesMut};
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::Interest;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_util::codec::Decoder;
use tracing::{debug, info, instrument, trace, warn};

/// Sent to a driver that connects while every slot is in use
pub const NO_SLOTS_MESSAGE: &[u8] = b"no available slots -- closing connection.\n";

/// Work item on the server's event queue
#[derive(Debug)]
pub enum QueuedEvent {
    /// A driver connection waiting for a slot
    NewConnection(TcpStream, SocketAddr),
    /// The connection in this slot has bytes to read
    DataReady(usize),
}

struct ResolverConnection {
    stream: TcpStream,
    peer: SocketAddr,
    /// Distinguishes successive occupants of the slot
    serial: u64,
    leftover: BytesMut,
    /// A `DataReady` event for this slot is already on the queue
    queued: bool,
}

/// A decoded request waiting for room on the blocking pool
struct PendingLookup {
    slot: usize,
    serial: u64,
    request: AddrRequest,
}

/// A finished lookup addressed to the connection that asked for it
struct Answered {
    slot: usize,
    serial: u64,
    response: AddrResponse,
}

enum Activity {
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Answered(Answered),
    Ready,
    Idle,
    Shutdown,
}

/// Standalone address resolution server
pub struct AddressServer {
    config: ResolverConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    slots: Vec<Option<ResolverConnection>>,
    open: usize,
    queue: EventQueue<QueuedEvent>,
    codec: RequestCodec,
    lookup: Arc<dyn NameLookup>,
    lookups: FuturesUnordered<BoxFuture<'static, Answered>>,
    backlog: VecDeque<PendingLookup>,
    next_serial: u64,
    shutdown: Arc<Notify>,
    stopping: bool,
}

impl AddressServer {
    /// Binds the listening socket and prepares the slot table
    pub async fn bind(config: ResolverConfig, lookup: Arc<dyn NameLookup>) -> Result<Self> {
        config.validate().map_err(ProtocolError::InvalidConfig)?;

        let listener = TcpListener::bind(config.bind_address).await?;
        let local_addr = listener.local_addr()?;
        info!("Address server bound to {}", local_addr);

        let queue = match config.max_queued_events {
            Some(max) => EventQueue::with_limit(max),
            None => EventQueue::new(),
        };

        Ok(Self {
            slots: (0..config.max_connections).map(|_| None).collect(),
            codec: RequestCodec::new(config.buffer_size),
            config,
            listener,
            local_addr,
            open: 0,
            queue,
            lookup,
            lookups: FuturesUnordered::new(),
            backlog: VecDeque::new(),
            next_serial: 0,
            shutdown: Arc::new(Notify::new()),
            stopping: false,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of occupied slots
    pub fn connection_count(&self) -> usize {
        self.open
    }

    /// Number of events waiting on the queue
    pub fn queued_events(&self) -> usize {
        self.queue.len()
    }

    /// Number of lookups running or waiting for room
    pub fn outstanding_lookups(&self) -> usize {
        self.lookups.len() + self.backlog.len()
    }

    /// Handle that stops [`run`](Self::run) when notified
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Runs until the shutdown handle is notified
    pub async fn run(&mut self) -> Result<()> {
        info!("Address server running on {}", self.local_addr);
        while !self.stopping {
            self.poll_once().await;
        }
        info!("Address server stopped");
        Ok(())
    }

    /// Runs one pass of the loop and returns the number of events handled.
    ///
    /// Blocks for socket activity or a finished lookup only when nothing is
    /// queued.
    pub async fn poll_once(&mut self) -> usize {
        if self.queue.is_empty() {
            match self.wait_for_activity().await {
                Activity::Accepted(Ok((stream, peer))) => {
                    self.enqueue(QueuedEvent::NewConnection(stream, peer));
                }
                Activity::Accepted(Err(err)) => warn!("Accept failed: {}", err),
                Activity::Answered(answered) => self.deliver(answered),
                Activity::Shutdown => {
                    self.stopping = true;
                    return 0;
                }
                Activity::Ready | Activity::Idle => {}
            }
        }
        self.collect_ready();
        let handled = self.process_queue();
        self.collect_answers();
        self.start_lookups();
        handled
    }

    async fn wait_for_activity(&mut self) -> Activity {
        let mut readable: FuturesUnordered<_> = self
            .slots
            .iter()
            .flatten()
            .filter(|conn| !conn.queued)
            .map(|conn| conn.stream.readable())
            .collect();
        let lookups = &mut self.lookups;
        let answering = !lookups.is_empty();

        tokio::select! {
            biased;
            () = self.shutdown.notified() => Activity::Shutdown,
            Some(answered) = lookups.next(), if answering => Activity::Answered(answered),
            accepted = self.listener.accept() => Activity::Accepted(accepted),
            Some(_) = readable.next(), if !readable.is_empty() => Activity::Ready,
            () = tokio::time::sleep(self.config.poll_timeout) => Activity::Idle,
        }
    }

    fn enqueue(&mut self, event: QueuedEvent) {
        match self.queue.push(event) {
            Ok(()) => {}
            Err(QueuedEvent::NewConnection(stream, peer)) => {
                warn!(%peer, "Event queue full, rejecting connection");
                if let Err(err) = reject(stream) {
                    debug!("Could not send rejection: {}", err);
                }
            }
            Err(event) => warn!("Event queue full, dropping {:?}", event),
        }
    }

    /// Queues pending accepts and every readable connection not already queued
    fn collect_ready(&mut self) {
        while let Some(accepted) = self.listener.accept().now_or_never() {
            match accepted {
                Ok((stream, peer)) => self.enqueue(QueuedEvent::NewConnection(stream, peer)),
                Err(err) => {
                    warn!("Accept failed: {}", err);
                    break;
                }
            }
        }

        for (slot, entry) in self.slots.iter_mut().enumerate() {
            let Some(conn) = entry else { continue };
            if conn.queued {
                continue;
            }
            let ready = conn.stream.ready(Interest::READABLE).now_or_never();
            let Some(Ok(ready)) = ready else { continue };
            if !ready.is_readable() && !ready.is_read_closed() {
                continue;
            }
            match self.queue.push(QueuedEvent::DataReady(slot)) {
                Ok(()) => conn.queued = true,
                Err(_) => warn!(slot, "Event queue full, data event deferred"),
            }
        }
    }

    fn process_queue(&mut self) -> usize {
        let mut handled = 0;
        while handled < self.config.max_events_per_pass {
            let Some(event) = self.queue.pop() else { break };
            match event {
                QueuedEvent::NewConnection(stream, peer) => self.new_connection(stream, peer),
                QueuedEvent::DataReady(slot) => self.connection_data(slot),
            }
            handled += 1;
        }
        if !self.queue.is_empty() {
            trace!(remaining = self.queue.len(), "Batch limit reached");
        }
        handled
    }

    #[instrument(skip(self, stream))]
    fn new_connection(&mut self, stream: TcpStream, peer: SocketAddr) {
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            warn!("No available slots, rejecting connection");
            if let Err(err) = reject(stream) {
                debug!("Could not send rejection: {}", err);
            }
            return;
        };

        self.next_serial += 1;
        self.slots[slot] = Some(ResolverConnection {
            stream,
            peer,
            serial: self.next_serial,
            leftover: BytesMut::with_capacity(self.config.buffer_size),
            queued: false,
        });
        self.open += 1;
        info!(slot, "Driver connected");
    }

    fn connection_data(&mut self, slot: usize) {
        let capacity = self.config.buffer_size;
        let Some(conn) = self.slots.get_mut(slot).and_then(Option::as_mut) else {
            debug!(slot, "Data event for a closed slot");
            return;
        };
        conn.queued = false;
        let serial = conn.serial;

        if conn.leftover.len() >= capacity {
            warn!(slot, "Input buffer full without a complete request, discarding");
            conn.leftover.clear();
        }
        let room = capacity - conn.leftover.len();
        conn.leftover.reserve(room);

        let read = conn.stream.try_read_buf(&mut (&mut conn.leftover).limit(room));
        match read {
            Ok(0) => {
                self.terminate(slot);
                return;
            }
            Ok(n) => trace!(slot, bytes = n, "Read request data"),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
            Err(err) => {
                warn!(slot, "Read failed: {}", err);
                self.terminate(slot);
                return;
            }
        }

        loop {
            match self.codec.decode(&mut conn.leftover) {
                Ok(Some(request)) => {
                    debug!(slot, kind = ?request.kind, query = %request.query, "Lookup requested");
                    self.backlog.push_back(PendingLookup { slot, serial, request });
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(slot, "Undecodable request: {}", err);
                    conn.leftover.clear();
                    break;
                }
            }
        }
    }

    /// Moves waiting requests onto the blocking pool while there is room
    fn start_lookups(&mut self) {
        while self.lookups.len() < self.config.max_lookups_in_flight {
            let Some(PendingLookup { slot, serial, request }) = self.backlog.pop_front() else {
                break;
            };
            let lookup = Arc::clone(&self.lookup);
            self.lookups.push(
                async move {
                    let response = answer(lookup, request).await;
                    Answered { slot, serial, response }
                }
                .boxed(),
            );
        }
        if !self.backlog.is_empty() {
            trace!(waiting = self.backlog.len(), "Lookup limit reached");
        }
    }

    /// Delivers every lookup that has already finished
    fn collect_answers(&mut self) {
        while let Some(Some(answered)) = self.lookups.next().now_or_never() {
            self.deliver(answered);
        }
    }

    fn deliver(&mut self, answered: Answered) {
        let Answered { slot, serial, response } = answered;
        let current = self
            .slots
            .get(slot)
            .and_then(Option::as_ref)
            .is_some_and(|conn| conn.serial == serial);
        if current {
            self.reply(slot, &response);
        } else {
            debug!(slot, query = %response.query, "Driver left before its lookup finished");
        }
    }

    fn reply(&mut self, slot: usize, response: &AddrResponse) {
        let Some(conn) = self.slots.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };
        let mut line = BytesMut::new();
        response.encode(&mut line);
        match conn.stream.try_write(&line) {
            Ok(n) if n == line.len() => trace!(slot, "Response sent"),
            Ok(n) => warn!(slot, "Short write of response, {} of {} bytes", n, line.len()),
            Err(err) => warn!(slot, "Response write failed: {}", err),
        }
    }

    fn terminate(&mut self, slot: usize) {
        match self.slots.get_mut(slot).and_then(Option::take) {
            Some(conn) => {
                self.open -= 1;
                self.backlog.retain(|pending| pending.slot != slot);
                info!(slot, peer = %conn.peer, "Driver disconnected");
            }
            None => warn!(slot, "Connection already closed"),
        }
    }
}

/// Writes the rejection line and drops the socket.
///
/// A socket fresh from `accept` has no readiness recorded yet, so the line is
/// written straight through the std socket.
fn reject(stream: TcpStream) -> io::Result<()> {
    let mut stream = stream.into_std()?;
    stream.write_all(NO_SLOTS_MESSAGE)
}

/// Performs one lookup on the blocking pool
async fn answer(lookup: Arc<dyn NameLookup>, request: AddrRequest) -> AddrResponse {
    let AddrRequest { kind, query } = request;
    let result = match kind {
        RequestKind::NameByIp => match query.parse::<Ipv4Addr>() {
            Ok(addr) => tokio::task::spawn_blocking(move || lookup.name_by_ip(addr))
                .await
                .unwrap_or_else(|err| {
                    warn!("Lookup task failed: {}", err);
                    None
                }),
            Err(_) => {
                debug!(query = %query, "Malformed address in request");
                None
            }
        },
        RequestKind::IpByName => {
            let name = query.clone();
            tokio::task::spawn_blocking(move || lookup.ip_by_name(&name))
                .await
                .unwrap_or_else(|err| {
                    warn!("Lookup task failed: {}", err);
                    None
                })
                .map(|addr| addr.to_string())
        }
    };
    AddrResponse { query, result }
}
