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


//! Telnet server implementation
//!
//! The TelnetServer owns the listening ports and the [`ConnectionManager`]
//! and runs the driver's event loop on a single task. Each pass waits once
//! for activity, then works through it in a fixed order: new connections,
//! input, address server answers, queued commands and finally output.

use crate::connection::{InputEvent, ReadStatus};
use crate::lookup::ResolverClient;
use crate::{
    ConnectionId, ConnectionKind, ConnectionManager, Identity, Result, ServerConfig,
    ServerHandler, ServerMetrics, ServerSnapshot, ServiceError,
};
use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

/// A bound listening port
#[derive(Debug)]
struct Listener {
    listener: TcpListener,
    address: SocketAddr,
    kind: ConnectionKind,
}

/// What ended a wait for activity
enum Wake {
    Shutdown,
    Accepted(usize, io::Result<(TcpStream, SocketAddr)>),
    Activity,
}

/// Telnet server
///
/// # Example
///
/// ```no_run
/// use mudwire_service::{ConnectionId, ConnectionManager, Identity, ServerConfig, ServerHandler, TelnetServer};
/// use async_trait::async_trait;
///
/// struct Guest;
///
/// #[async_trait]
/// impl ServerHandler for Guest {
///     async fn on_connect(&self, _: &mut ConnectionManager, id: ConnectionId, _: u16) -> Option<Identity> {
///         Some(Identity::new(id.slot() as u64))
///     }
/// }
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServerConfig::new("0.0.0.0:4000".parse()?);
///     let mut server = TelnetServer::bind(config, Guest).await?;
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct TelnetServer<H: ServerHandler> {
    config: ServerConfig,
    listeners: Vec<Listener>,
    manager: ConnectionManager,
    handler: Arc<H>,
    metrics: Arc<ServerMetrics>,
    shutdown: Arc<Notify>,
    started_at: Instant,
    stopping: bool,
}

impl<H: ServerHandler> TelnetServer<H> {
    /// Binds every configured port and connects to the address server.
    ///
    /// An unreachable address server is logged and lookups fail until the
    /// server is restarted.
    pub async fn bind(config: ServerConfig, handler: H) -> Result<Self> {
        config.validate().map_err(ServiceError::Config)?;

        let mut listeners = Vec::with_capacity(config.ports.len());
        for port in &config.ports {
            let listener = TcpListener::bind(port.address).await?;
            let address = listener.local_addr()?;
            info!(%address, kind = %port.kind, "Listening");
            listeners.push(Listener {
                listener,
                address,
                kind: port.kind,
            });
        }

        let metrics = Arc::new(ServerMetrics::new());
        let mut manager = ConnectionManager::new(config.clone(), Arc::clone(&metrics));
        if let Some(address) = config.address_server {
            match ResolverClient::connect(address).await {
                Ok(client) => manager.set_resolver(client),
                Err(err) => warn!(%address, "Address server unavailable: {}", err),
            }
        }

        Ok(Self {
            config,
            listeners,
            manager,
            handler: Arc::new(handler),
            metrics,
            shutdown: Arc::new(Notify::new()),
            started_at: Instant::now(),
            stopping: false,
        })
    }

    /// Addresses the server is listening on, in configuration order
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|l| l.address).collect()
    }

    /// Get the connection manager
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Get the connection manager for changes outside a callback
    pub fn manager_mut(&mut self) -> &mut ConnectionManager {
        &mut self.manager
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle that stops [`run`](Self::run) when notified
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            active_connections: self.manager.connection_count(),
            total_connections: self.metrics.total_connections(),
            bind_addresses: self.local_addrs(),
            uptime: self.started_at.elapsed(),
        }
    }

    /// Runs the event loop until the shutdown handle is notified, then
    /// closes every connection.
    pub async fn run(&mut self) -> Result<()> {
        info!(addrs = ?self.local_addrs(), "Telnet server running");
        while !self.stopping {
            self.poll_once().await?;
        }
        self.manager.close_all();
        info!("Telnet server stopped");
        Ok(())
    }

    /// One pass of the event loop.
    ///
    /// Waits for activity, or not at all while commands are queued, then
    /// accepts, reads, delivers address server answers, dispatches commands
    /// and flushes output.
    pub async fn poll_once(&mut self) -> Result<()> {
        let timeout = if self.manager.has_ready_commands() {
            Duration::ZERO
        } else {
            self.config.poll_timeout
        };

        match self.wait_for_activity(timeout).await {
            Wake::Shutdown => {
                info!("Shutdown requested");
                self.stopping = true;
                return Ok(());
            }
            Wake::Accepted(index, result) => self.handle_accept(index, result).await,
            Wake::Activity => {}
        }

        for (index, result) in self.pending_accepts() {
            self.handle_accept(index, result).await;
        }

        for id in self.manager.ids() {
            self.service_connection(id).await;
        }

        self.manager.process_resolver();
        self.dispatch_commands().await;
        self.manager.flush_all();
        Ok(())
    }

    async fn wait_for_activity(&self, timeout: Duration) -> Wake {
        let mut accepts: FuturesUnordered<_> = self
            .listeners
            .iter()
            .enumerate()
            .map(|(index, l)| async move { (index, l.listener.accept().await) })
            .collect();
        let mut ready: FuturesUnordered<_> = self
            .manager
            .live()
            .filter_map(|conn| conn.interest().map(|interest| conn.stream().ready(interest)))
            .collect();
        let resolver = async {
            match self.manager.resolver().stream() {
                Some(stream) => stream.readable().await,
                None => std::future::pending().await,
            }
        };
        let idle = async {
            if timeout.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(timeout).await;
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.notified() => Wake::Shutdown,
            Some((index, result)) = accepts.next() => Wake::Accepted(index, result),
            Some(_) = ready.next() => Wake::Activity,
            _ = resolver => Wake::Activity,
            _ = idle => Wake::Activity,
        }
    }

    /// Connections that queued up behind the one that woke the loop
    fn pending_accepts(&self) -> Vec<(usize, io::Result<(TcpStream, SocketAddr)>)> {
        let limit = self.manager.capacity() + 1;
        let mut accepted = Vec::new();
        for (index, l) in self.listeners.iter().enumerate() {
            for _ in 0..limit {
                match l.listener.accept().now_or_never() {
                    Some(Ok(pair)) => accepted.push((index, Ok(pair))),
                    Some(Err(err)) => {
                        accepted.push((index, Err(err)));
                        break;
                    }
                    None => break,
                }
            }
        }
        accepted
    }

    #[instrument(skip(self, result))]
    async fn handle_accept(&mut self, index: usize, result: io::Result<(TcpStream, SocketAddr)>) {
        let (stream, peer_addr) = match result {
            Ok(pair) => pair,
            Err(err) => {
                error!("Failed to accept connection: {}", err);
                self.metrics.connection_error();
                return;
            }
        };
        let port = self.listeners[index].address.port();
        let kind = self.listeners[index].kind;

        let id = match self.manager.open(stream, peer_addr, port, kind) {
            Ok(id) => id,
            Err(stream) => {
                self.metrics.connection_rejected();
                info!(%peer_addr, "Rejecting connection, registry full");
                if let Err(err) = reject(stream, &self.config.rejection_message) {
                    debug!(%peer_addr, "Could not send rejection: {}", err);
                }
                return;
            }
        };

        let handler = Arc::clone(&self.handler);
        let Some(identity) = handler.on_connect(&mut self.manager, id, port).await else {
            debug!(connection_id = %id, "Connection refused by handler");
            self.close_quietly(id);
            return;
        };
        if let Err(err) = self.manager.bind_owner(id, identity) {
            warn!(connection_id = %id, "Could not bind {}: {}", identity, err);
            self.close_quietly(id);
            return;
        }
        self.manager.after_connect(id);
        handler.on_logon(&mut self.manager, identity).await;
    }

    fn close_quietly(&mut self, id: ConnectionId) {
        if self.manager.begin_close(id).is_ok() {
            self.manager.finish_close(id);
        }
    }

    /// Reads from one connection and delivers what arrived
    async fn service_connection(&mut self, id: ConnectionId) {
        let Some(conn) = self.manager.get_mut(id) else {
            return;
        };
        if conn.flags().net_dead {
            self.disconnect(id).await;
            return;
        }
        if conn.flags().command_ready {
            return;
        }

        let (raw, events) = match conn.read() {
            Ok(ReadStatus::WouldBlock) => return,
            Ok(ReadStatus::Received { raw, events }) => (raw, events),
            Ok(ReadStatus::Closed) | Err(_) => {
                self.disconnect(id).await;
                return;
            }
        };
        let echo = conn.kind() == ConnectionKind::Telnet && !conn.flags().no_echo;
        let owner = conn.owner();
        if echo {
            self.manager.copy_to_watchers(id, &raw);
        }

        let Some(identity) = owner else {
            return;
        };
        for event in events {
            self.deliver(identity, event).await;
        }
    }

    async fn deliver(&mut self, identity: Identity, event: InputEvent) {
        let handler = Arc::clone(&self.handler);
        let manager = &mut self.manager;
        match event {
            InputEvent::TerminalType(terminal) => {
                handler.on_terminal_type(manager, identity, &terminal).await
            }
            InputEvent::WindowSize(size) => handler.on_window_size(manager, identity, size).await,
            InputEvent::Suboption(payload) => {
                handler.on_suboption(manager, identity, &payload).await
            }
            InputEvent::Line(line) => {
                self.metrics.command_dispatched();
                handler.on_command(manager, identity, &line).await
            }
            InputEvent::Binary(bytes) => handler.on_binary(manager, identity, &bytes).await,
        }
    }

    /// Network-initiated teardown. The owner hears about it while the
    /// connection still refuses a second close.
    async fn disconnect(&mut self, id: ConnectionId) {
        match self.manager.begin_close(id) {
            Ok(owner) => {
                info!(connection_id = %id, "Connection lost");
                if let Some(identity) = owner {
                    let handler = Arc::clone(&self.handler);
                    handler.on_disconnect(&mut self.manager, identity).await;
                }
                self.manager.finish_close(id);
            }
            Err(err) => debug!(connection_id = %id, "Teardown skipped: {}", err),
        }
    }

    /// Hands out one command to each connection that has one ready
    async fn dispatch_commands(&mut self) {
        let handler = Arc::clone(&self.handler);
        self.manager.start_round();
        while let Some(command) = self.manager.next_round_command() {
            handler
                .on_command(&mut self.manager, command.identity, &command.text)
                .await;
            let Some(prompt) = handler.prompt(command.identity) else {
                continue;
            };
            if let Some(id) = self.manager.connection_of(command.identity) {
                if let Err(err) = self.manager.write_prompt(id, &prompt) {
                    debug!(connection_id = %id, "Prompt not written: {}", err);
                }
            }
        }
    }
}

impl<H: ServerHandler> std::fmt::Debug for TelnetServer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelnetServer")
            .field("addrs", &self.local_addrs())
            .field("connection_count", &self.manager.connection_count())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

/// Writes the rejection line and drops the socket.
///
/// A socket fresh from `accept` has no readiness recorded yet, so the line is
/// written straight through the std socket.
fn reject(stream: TcpStream, message: &str) -> io::Result<()> {
    let mut stream = stream.into_std()?;
    stream.write_all(message.as_bytes())
}
