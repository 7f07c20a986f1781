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


//! Connection registry
//!
//! The ConnectionManager is responsible for:
//! - The fixed table of connection slots and their generation counters
//! - Binding identities to connections
//! - Sending output, copying it up snoop chains
//! - Handing out ready commands in round-robin order
//! - Address lookups through the resolver client
//!
//! Every collaborator callback receives `&mut ConnectionManager`, so all of
//! these operations may be invoked from inside a callback.

use crate::lookup::{ResolveCallback, RequestHandle, Resolution, ResolverClient};
use crate::{
    Command, Connection, ConnectionId, ConnectionInfo, ConnectionKind, Identity, Result,
    ServerConfig, ServerMetrics, ServiceError, SnoopMap,
};
use mudwire_telnetcodec::TelnetReply;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, trace, warn};

/// Prefix marking text copied to a snooper
const SNOOP_PREFIX: u8 = b'%';

/// One registry slot. The generation is bumped every time the slot is
/// reused, so ids handed out for an earlier occupant go stale.
#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    connection: Option<Connection>,
}

/// Connection manager
pub struct ConnectionManager {
    config: ServerConfig,
    slots: Vec<Slot>,
    live: usize,
    owners: HashMap<Identity, ConnectionId>,
    snoop: SnoopMap,
    /// Slot the scheduler visits next; walks down and wraps to the top
    next_giver: usize,
    /// Slots left to visit in the current dispatch round
    round_steps: usize,
    resolver: ResolverClient,
    metrics: Arc<ServerMetrics>,
}

impl ConnectionManager {
    /// Create a manager with `config.max_connections` empty slots and no
    /// address server
    pub fn new(config: ServerConfig, metrics: Arc<ServerMetrics>) -> Self {
        let slots = (0..config.max_connections).map(|_| Slot::default()).collect();
        Self {
            next_giver: config.max_connections.saturating_sub(1),
            round_steps: 0,
            config,
            slots,
            live: 0,
            owners: HashMap::new(),
            snoop: SnoopMap::new(),
            resolver: ResolverClient::disconnected(),
            metrics,
        }
    }

    pub(crate) fn set_resolver(&mut self, resolver: ResolverClient) {
        self.resolver = resolver;
    }

    /// The address server client
    pub fn resolver(&self) -> &ResolverClient {
        &self.resolver
    }

    /// Server metrics
    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    /// Number of registry slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.live
    }

    /// Snapshot of every live connection
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.slots
            .iter()
            .filter_map(|slot| slot.connection.as_ref())
            .map(Connection::info)
            .collect()
    }

    // Registry

    /// Registers an accepted socket. The stream is handed back when every
    /// slot is taken so the caller can turn the client away.
    #[instrument(skip(self, stream), fields(%peer_addr))]
    pub(crate) fn open(
        &mut self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        local_port: u16,
        kind: ConnectionKind,
    ) -> std::result::Result<ConnectionId, TcpStream> {
        let Some(index) = self.slots.iter().position(|slot| slot.connection.is_none()) else {
            warn!(max = self.slots.len(), "Connection registry full");
            return Err(stream);
        };
        let slot = &mut self.slots[index];
        slot.generation += 1;
        let id = ConnectionId::new(index, slot.generation);
        slot.connection = Some(Connection::new(
            id,
            stream,
            peer_addr,
            local_port,
            kind,
            &self.config,
            Arc::clone(&self.metrics),
        ));
        self.live += 1;
        self.metrics.connection_opened();
        info!(connection_id = %id, %kind, local_port, "Connection opened");
        Ok(id)
    }

    /// Look up a live connection
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.slots
            .get(id.slot())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.connection.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.slots
            .get_mut(id.slot())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.connection.as_mut())
    }

    pub(crate) fn live(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.slots.iter().filter_map(|slot| slot.connection.as_ref())
    }

    pub(crate) fn ids(&self) -> Vec<ConnectionId> {
        self.slots
            .iter()
            .filter_map(|slot| slot.connection.as_ref().map(Connection::id))
            .collect()
    }

    /// The connection `identity` is bound to
    pub fn connection_of(&self, identity: Identity) -> Option<ConnectionId> {
        self.owners.get(&identity).copied()
    }

    /// The identity bound to `id`
    pub fn owner_of(&self, id: ConnectionId) -> Option<Identity> {
        self.get(id).and_then(Connection::owner)
    }

    fn interactive(&self, identity: Identity) -> Result<ConnectionId> {
        self.connection_of(identity)
            .ok_or(ServiceError::NotInteractive(identity))
    }

    fn connection_mut(&mut self, identity: Identity) -> Result<&mut Connection> {
        let id = self.interactive(identity)?;
        self.get_mut(id).ok_or(ServiceError::ConnectionNotFound(id))
    }

    /// Binds `identity` to the connection `id`
    pub fn bind_owner(&mut self, id: ConnectionId, identity: Identity) -> Result<()> {
        match self.connection_of(identity) {
            Some(current) if current == id => return Ok(()),
            Some(_) => return Err(ServiceError::AlreadyInteractive(identity)),
            None => {}
        }
        let previous = self
            .get(id)
            .ok_or(ServiceError::ConnectionNotFound(id))?
            .owner();
        if let Some(previous) = previous {
            self.owners.remove(&previous);
        }
        if let Some(connection) = self.get_mut(id) {
            connection.set_owner(Some(identity));
        }
        self.owners.insert(identity, id);
        debug!(connection_id = %id, %identity, "Identity bound");
        Ok(())
    }

    /// Moves the connection owned by `from` over to `to`
    #[instrument(skip(self))]
    pub fn transfer(&mut self, from: Identity, to: Identity) -> Result<()> {
        if self.owners.contains_key(&to) {
            return Err(ServiceError::AlreadyInteractive(to));
        }
        let id = self.interactive(from)?;
        let connection = self.get_mut(id).ok_or(ServiceError::ConnectionNotFound(id))?;
        connection.set_owner(Some(to));
        self.owners.remove(&from);
        self.owners.insert(to, id);
        info!(connection_id = %id, "Connection transferred");
        Ok(())
    }

    // Output

    /// Queues `text` for the connection owned by `identity`
    pub fn send(&mut self, identity: Identity, text: &str) -> Result<()> {
        let id = self.interactive(identity)?;
        self.write_to(id, text.as_bytes())
    }

    /// Queues `bytes` for `id` and copies them to any snoopers
    pub fn write_to(&mut self, id: ConnectionId, bytes: &[u8]) -> Result<()> {
        let connection = self.get_mut(id).ok_or(ServiceError::ConnectionNotFound(id))?;
        let result = connection.write(bytes);
        self.copy_to_watchers(id, bytes);
        result
    }

    /// Copies `bytes` up the snoop chain above `id`, one `%` per level
    pub(crate) fn copy_to_watchers(&mut self, id: ConnectionId, bytes: &[u8]) {
        let mut target = id;
        let mut copy: Option<Vec<u8>> = None;
        for _ in 0..self.snoop.len() {
            let Some(watcher) = self.snoop.watcher_of(target) else {
                break;
            };
            let copy = copy.get_or_insert_with(|| bytes.to_vec());
            copy.insert(0, SNOOP_PREFIX);
            if let Some(connection) = self.get_mut(watcher) {
                if let Err(err) = connection.write(copy) {
                    debug!(connection_id = %watcher, "Snoop copy not written: {}", err);
                }
            }
            target = watcher;
        }
    }

    /// Writes a prompt, followed by a go-ahead if the peer speaks Telnet
    pub(crate) fn write_prompt(&mut self, id: ConnectionId, prompt: &str) -> Result<()> {
        self.write_to(id, prompt.as_bytes())?;
        let Some(connection) = self.get_mut(id) else {
            return Ok(());
        };
        if connection.flags().telnet_detected {
            connection.write_reply(TelnetReply::GO_AHEAD)?;
        }
        connection.flush().map(|_| ())
    }

    /// Switches echo suppression and character-at-a-time input for the
    /// connection owned by `identity`
    pub fn set_input_mode(&mut self, identity: Identity, no_echo: bool, single_char: bool) -> Result<()> {
        self.connection_mut(identity)?
            .set_input_mode(no_echo, single_char)
    }

    /// Flushes every connection with queued output
    pub(crate) fn flush_all(&mut self) {
        for connection in self.slots.iter_mut().filter_map(|slot| slot.connection.as_mut()) {
            if connection.pending_output() == 0 {
                continue;
            }
            if let Err(err) = connection.flush() {
                debug!(connection_id = %connection.id(), "Flush failed: {}", err);
            }
        }
    }

    /// Sends the opening negotiation and queues a name lookup for the peer
    pub(crate) fn after_connect(&mut self, id: ConnectionId) {
        let Some(connection) = self.get_mut(id) else {
            return;
        };
        if connection.kind() == ConnectionKind::Telnet {
            let negotiation = connection
                .write_reply(TelnetReply::DO_TERMINAL_TYPE)
                .and_then(|_| connection.write_reply(TelnetReply::DO_NAWS))
                .and_then(|_| connection.flush());
            if let Err(err) = negotiation {
                debug!(connection_id = %id, "Negotiation not sent: {}", err);
            }
        }
        if let IpAddr::V4(addr) = connection.peer_addr().ip() {
            self.resolver.query_name(addr);
        }
    }

    // Snoop

    /// Makes `watcher` snoop on `target`, or stops it snooping when `target`
    /// is `None`.
    ///
    /// Returns `false` when the link would make a loop.
    #[instrument(skip(self))]
    pub fn snoop(&mut self, watcher: Identity, target: Option<Identity>) -> Result<bool> {
        let watcher_id = self.interactive(watcher)?;
        let Some(target) = target else {
            if let Some(previous) = self.snoop.unlink(watcher_id) {
                debug!(connection_id = %watcher_id, target = %previous, "Snoop stopped");
            }
            return Ok(true);
        };
        let target_id = self.interactive(target)?;
        let linked = self.snoop.link(watcher_id, target_id);
        if linked {
            debug!(connection_id = %watcher_id, target = %target_id, "Snoop started");
        } else {
            debug!(connection_id = %watcher_id, target = %target_id, "Snoop refused");
        }
        Ok(linked)
    }

    /// The identity snooping on `identity`
    pub fn snooped_by(&self, identity: Identity) -> Option<Identity> {
        let id = self.connection_of(identity)?;
        self.snoop
            .watcher_of(id)
            .and_then(|watcher| self.owner_of(watcher))
    }

    /// The identity `identity` is snooping on
    pub fn snooping(&self, identity: Identity) -> Option<Identity> {
        let id = self.connection_of(identity)?;
        self.snoop
            .target_of(id)
            .and_then(|target| self.owner_of(target))
    }

    // Queries

    /// Time since `identity` last entered a command
    pub fn idle_time(&self, identity: Identity) -> Result<Duration> {
        let id = self.interactive(identity)?;
        self.get(id)
            .map(Connection::idle_time)
            .ok_or(ServiceError::ConnectionNotFound(id))
    }

    /// Peer address of the connection owned by `identity`
    pub fn ip_number(&self, identity: Identity) -> Result<IpAddr> {
        let id = self.interactive(identity)?;
        self.get(id)
            .map(|connection| connection.peer_addr().ip())
            .ok_or(ServiceError::ConnectionNotFound(id))
    }

    /// Host name of the peer when a lookup has answered, otherwise the
    /// dotted address
    pub fn ip_name(&self, identity: Identity) -> Result<String> {
        let ip = self.ip_number(identity)?;
        let cached = match ip {
            IpAddr::V4(addr) => self.resolver.cache().lookup(addr),
            IpAddr::V6(_) => None,
        };
        Ok(cached.map_or_else(|| ip.to_string(), str::to_string))
    }

    // Lookups

    /// Asks the address server about `query` on behalf of `owner`.
    ///
    /// When the request cannot be sent the callback runs before this returns
    /// and `None` is returned. Otherwise the callback runs once the answer
    /// arrives, or never if the address server goes away first.
    pub fn resolve<F>(&mut self, owner: Identity, query: &str, callback: F) -> Option<RequestHandle>
    where
        F: FnOnce(&mut ConnectionManager, &Resolution) + Send + 'static,
    {
        let callback: ResolveCallback = Box::new(callback);
        match self.resolver.submit(owner, query, callback) {
            Ok(handle) => {
                self.metrics.resolver_request();
                Some(handle)
            }
            Err(callback) => {
                self.metrics.resolver_failure();
                callback(self, &Resolution::failed(query));
                None
            }
        }
    }

    /// Forgets every lookup `identity` is waiting on. Answers that arrive
    /// later are dropped.
    pub fn release_owner(&mut self, identity: Identity) -> usize {
        self.resolver.release_owner(identity)
    }

    /// Runs the callbacks for every answer the address server has sent
    pub(crate) fn process_resolver(&mut self) {
        for completion in self.resolver.read_responses() {
            self.metrics.resolver_response();
            trace!(query = %completion.resolution.query, "Running lookup callback");
            (completion.callback)(self, &completion.resolution);
        }
    }

    // Scheduling

    /// Takes one command from the next connection that has one.
    ///
    /// Slots are visited in descending order from where the previous call
    /// stopped, wrapping at zero, so every connection with a command ready is
    /// served once before any is served twice. Pending output of every
    /// visited connection is flushed on the way.
    pub fn next_command(&mut self) -> Option<Command> {
        let mut steps = self.slots.len();
        self.scan_for_command(&mut steps)
    }

    /// Starts a dispatch round. Until the next call, the cursor visits every
    /// slot at most once.
    pub(crate) fn start_round(&mut self) {
        self.round_steps = self.slots.len();
    }

    /// Next command of the current round; `None` once the cursor has passed
    /// every slot, so no connection is served twice in one round.
    pub(crate) fn next_round_command(&mut self) -> Option<Command> {
        let mut steps = self.round_steps;
        let command = self.scan_for_command(&mut steps);
        self.round_steps = steps;
        command
    }

    fn scan_for_command(&mut self, steps: &mut usize) -> Option<Command> {
        let count = self.slots.len();
        while *steps > 0 {
            *steps -= 1;
            let index = self.next_giver;
            self.next_giver = if index == 0 { count - 1 } else { index - 1 };

            let Some(connection) = self.slots[index].connection.as_mut() else {
                continue;
            };
            if let Err(err) = connection.flush() {
                debug!(connection_id = %connection.id(), "Flush failed: {}", err);
            }
            if !connection.flags().command_ready {
                continue;
            }
            let Some(identity) = connection.owner() else {
                continue;
            };
            if let Some(text) = connection.next_command() {
                self.metrics.command_dispatched();
                return Some(Command {
                    connection: connection.id(),
                    identity,
                    text,
                });
            }
        }
        None
    }

    /// Whether any owned connection has a command waiting
    pub fn has_ready_commands(&self) -> bool {
        self.slots
            .iter()
            .filter_map(|slot| slot.connection.as_ref())
            .any(|connection| connection.flags().command_ready && connection.owner().is_some())
    }

    // Teardown

    /// Closes the connection owned by `identity`. The disconnect callback is
    /// not invoked.
    pub fn close(&mut self, identity: Identity) -> Result<()> {
        let id = self.interactive(identity)?;
        self.close_connection(id)
    }

    /// Closes the connection `id`. Closing a connection that is already
    /// closing or gone is reported as [`ServiceError::AlreadyClosed`].
    pub fn close_connection(&mut self, id: ConnectionId) -> Result<()> {
        match self.begin_close(id) {
            Ok(_) => {
                self.finish_close(id);
                Ok(())
            }
            Err(err) => {
                warn!(connection_id = %id, "Connection already closed");
                Err(err)
            }
        }
    }

    /// First half of teardown. Returns the owner so the caller can notify it
    /// while the connection is still registered but refusing a second close.
    pub(crate) fn begin_close(&mut self, id: ConnectionId) -> Result<Option<Identity>> {
        let connection = self.get_mut(id).ok_or(ServiceError::AlreadyClosed(id))?;
        connection.begin_close()?;
        Ok(connection.owner())
    }

    /// Second half of teardown: unlinks snoops, unbinds the owner and frees
    /// the slot
    #[instrument(skip(self), fields(connection_id = %id))]
    pub(crate) fn finish_close(&mut self, id: ConnectionId) {
        let Some(slot) = self
            .slots
            .get_mut(id.slot())
            .filter(|slot| slot.generation == id.generation())
        else {
            return;
        };
        let Some(mut connection) = slot.connection.take() else {
            return;
        };
        self.snoop.remove(id);
        if let Some(owner) = connection.owner() {
            if self.owners.get(&owner) == Some(&id) {
                self.owners.remove(&owner);
            }
        }
        let lifetime = connection.finish_close();
        self.live -= 1;
        self.metrics.connection_closed(lifetime);
        info!(?lifetime, "Connection closed");
    }

    /// Closes every connection without notifying anyone
    pub(crate) fn close_all(&mut self) {
        for id in self.ids() {
            if self.begin_close(id).is_ok() {
                self.finish_close(id);
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("capacity", &self.slots.len())
            .field("live", &self.live)
            .field("owners", &self.owners.len())
            .field("snoops", &self.snoop.len())
            .field("resolver", &self.resolver)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    fn manager(max_connections: usize) -> ConnectionManager {
        let config = ServerConfig::default().with_max_connections(max_connections);
        ConnectionManager::new(config, Arc::new(ServerMetrics::new()))
    }

    /// Returns the server side of a loopback connection and its client
    async fn socket_pair(listener: &TcpListener) -> (TcpStream, SocketAddr, TcpStream) {
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        server.writable().await.unwrap();
        (server, peer, client)
    }

    async fn open_owned(
        manager: &mut ConnectionManager,
        listener: &TcpListener,
        identity: u64,
    ) -> (ConnectionId, TcpStream) {
        let (server, peer, client) = socket_pair(listener).await;
        let id = manager
            .open(server, peer, 4000, ConnectionKind::Ascii)
            .unwrap();
        manager.bind_owner(id, Identity::new(identity)).unwrap();
        (id, client)
    }

    // ============================================================================
    // Registry Tests
    // ============================================================================

    #[tokio::test]
    async fn test_open_until_full() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut manager = manager(2);
        let mut clients = Vec::new();
        for _ in 0..2 {
            let (server, peer, client) = socket_pair(&listener).await;
            assert!(manager.open(server, peer, 4000, ConnectionKind::Telnet).is_ok());
            clients.push(client);
        }
        let (server, peer, _client) = socket_pair(&listener).await;
        assert!(manager.open(server, peer, 4000, ConnectionKind::Telnet).is_err());
        assert_eq!(manager.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_id_after_reuse() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut manager = manager(1);
        let (first, _client) = open_owned(&mut manager, &listener, 1).await;
        manager.close(Identity::new(1)).unwrap();

        let (second, _client2) = open_owned(&mut manager, &listener, 2).await;
        assert_eq!(first.slot(), second.slot());
        assert_ne!(first, second);
        assert!(manager.get(first).is_none());
        assert!(manager.get(second).is_some());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_double_close_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut manager = manager(4);
        let (id, _client) = open_owned(&mut manager, &listener, 1).await;

        manager.close_connection(id).unwrap();
        assert!(matches!(
            manager.close_connection(id),
            Err(ServiceError::AlreadyClosed(_))
        ));
        assert_eq!(manager.connection_count(), 0);
        assert!(logs_contain("Connection already closed"));
    }

    #[tokio::test]
    async fn test_close_while_closing_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut manager = manager(4);
        let (id, _client) = open_owned(&mut manager, &listener, 1).await;

        assert_eq!(manager.begin_close(id).unwrap(), Some(Identity::new(1)));
        assert!(matches!(
            manager.close(Identity::new(1)),
            Err(ServiceError::AlreadyClosed(_))
        ));
        manager.finish_close(id);
        assert_eq!(manager.connection_count(), 0);
        assert!(manager.connection_of(Identity::new(1)).is_none());
    }

    // ============================================================================
    // Ownership Tests
    // ============================================================================

    #[tokio::test]
    async fn test_bind_owner_twice_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut manager = manager(4);
        let (_first, _c1) = open_owned(&mut manager, &listener, 1).await;
        let (server, peer, _c2) = socket_pair(&listener).await;
        let second = manager.open(server, peer, 4000, ConnectionKind::Ascii).unwrap();

        assert!(matches!(
            manager.bind_owner(second, Identity::new(1)),
            Err(ServiceError::AlreadyInteractive(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut manager = manager(4);
        let (id, _c1) = open_owned(&mut manager, &listener, 1).await;
        let (_other, _c2) = open_owned(&mut manager, &listener, 2).await;

        assert!(matches!(
            manager.transfer(Identity::new(1), Identity::new(2)),
            Err(ServiceError::AlreadyInteractive(_))
        ));
        assert!(matches!(
            manager.transfer(Identity::new(9), Identity::new(10)),
            Err(ServiceError::NotInteractive(_))
        ));

        manager.transfer(Identity::new(1), Identity::new(3)).unwrap();
        assert_eq!(manager.owner_of(id), Some(Identity::new(3)));
        assert_eq!(manager.connection_of(Identity::new(3)), Some(id));
        assert!(manager.connection_of(Identity::new(1)).is_none());
    }

    #[tokio::test]
    async fn test_send_to_non_interactive() {
        let mut manager = manager(1);
        assert!(matches!(
            manager.send(Identity::new(5), "hello"),
            Err(ServiceError::NotInteractive(_))
        ));
    }

    // ============================================================================
    // Scheduling Tests
    // ============================================================================

    async fn open_telnet(
        manager: &mut ConnectionManager,
        listener: &TcpListener,
        identity: u64,
        typed: &[u8],
    ) -> (ConnectionId, TcpStream) {
        let (server, peer, client) = socket_pair(listener).await;
        let id = manager
            .open(server, peer, 4000, ConnectionKind::Telnet)
            .unwrap();
        manager.bind_owner(id, Identity::new(identity)).unwrap();
        manager.get_mut(id).unwrap().receive(typed);
        (id, client)
    }

    #[tokio::test]
    async fn test_round_serves_each_connection_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut manager = manager(4);
        let (_busy, _c1) = open_telnet(&mut manager, &listener, 1, b"one\ntwo\nthree\n").await;
        let (_quiet, _c2) = open_telnet(&mut manager, &listener, 2, b"hello\n").await;

        manager.start_round();
        let mut served = Vec::new();
        while let Some(command) = manager.next_round_command() {
            served.push((command.identity, command.text));
        }
        served.sort();
        assert_eq!(
            served,
            vec![
                (Identity::new(1), "one".to_string()),
                (Identity::new(2), "hello".to_string()),
            ]
        );

        // The busy connection continues in the following rounds
        manager.start_round();
        let command = manager.next_round_command().unwrap();
        assert_eq!((command.identity, command.text.as_str()), (Identity::new(1), "two"));
        assert!(manager.next_round_command().is_none());

        manager.start_round();
        assert_eq!(manager.next_round_command().unwrap().text, "three");
        assert!(manager.next_round_command().is_none());
        assert!(!manager.has_ready_commands());
    }

    // ============================================================================
    // Snoop Tests
    // ============================================================================

    #[tokio::test]
    async fn test_snoop_copies_with_prefix() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut manager = manager(4);
        let (_target, _c1) = open_owned(&mut manager, &listener, 1).await;
        let (_watcher, mut watcher_client) = open_owned(&mut manager, &listener, 2).await;

        assert!(manager.snoop(Identity::new(2), Some(Identity::new(1))).unwrap());
        assert_eq!(manager.snooped_by(Identity::new(1)), Some(Identity::new(2)));
        assert_eq!(manager.snooping(Identity::new(2)), Some(Identity::new(1)));

        manager.send(Identity::new(1), "look").unwrap();
        manager.flush_all();

        let mut buf = [0u8; 5];
        watcher_client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"%look");
    }

    #[tokio::test]
    async fn test_snoop_loop_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut manager = manager(4);
        let (_a, _c1) = open_owned(&mut manager, &listener, 1).await;
        let (_b, _c2) = open_owned(&mut manager, &listener, 2).await;

        assert!(manager.snoop(Identity::new(2), Some(Identity::new(1))).unwrap());
        assert!(!manager.snoop(Identity::new(1), Some(Identity::new(2))).unwrap());
        assert!(manager.snoop(Identity::new(2), None).unwrap());
        assert_eq!(manager.snooped_by(Identity::new(1)), None);
    }

    #[tokio::test]
    async fn test_close_removes_snoop_links() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut manager = manager(4);
        let (_a, _c1) = open_owned(&mut manager, &listener, 1).await;
        let (_b, _c2) = open_owned(&mut manager, &listener, 2).await;
        manager.snoop(Identity::new(2), Some(Identity::new(1))).unwrap();

        manager.close(Identity::new(1)).unwrap();
        assert_eq!(manager.snooping(Identity::new(2)), None);
        assert!(manager.snoop.is_empty());
    }

    // ============================================================================
    // Lookup Tests
    // ============================================================================

    #[tokio::test]
    async fn test_resolve_without_server_fails_immediately() {
        let mut manager = manager(1);
        let outcome = Arc::new(std::sync::Mutex::new(None));
        let seen = Arc::clone(&outcome);

        let handle = manager.resolve(Identity::new(1), "mud.example.org", move |_, resolution| {
            *seen.lock().unwrap() = Some(resolution.clone());
        });

        assert!(handle.is_none());
        let resolution = outcome.lock().unwrap().clone().unwrap();
        assert_eq!(resolution.query, "mud.example.org");
        assert!(resolution.handle.is_none());
        assert!(!resolution.is_resolved());
    }

    #[tokio::test]
    async fn test_ip_name_falls_back_to_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut manager = manager(1);
        let (_id, _client) = open_owned(&mut manager, &listener, 1).await;

        assert_eq!(manager.ip_name(Identity::new(1)).unwrap(), "127.0.0.1");
        assert!(manager.ip_number(Identity::new(1)).unwrap().is_loopback());
        assert!(manager.idle_time(Identity::new(1)).unwrap() < Duration::from_secs(5));
    }
}
