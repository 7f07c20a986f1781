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


//! Shared harness for the loopback server tests

#![allow(dead_code)]

use async_trait::async_trait;
use mudwire_service::{
    ConnectionId, ConnectionManager, Identity, ServerConfig, ServerHandler, TelnetServer,
    WindowSize,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

/// Everything the recorder has been told
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Logon(Identity),
    Command(Identity, String),
    TerminalType(Identity, String),
    WindowSize(Identity, WindowSize),
    Suboption(Identity, Vec<u8>),
    Binary(Identity, Vec<u8>),
    Disconnect(Identity),
}

/// Handler that numbers identities from 1 and records every callback
pub struct Recorder {
    next: AtomicU64,
    seen: Arc<Mutex<Vec<Seen>>>,
    prompt: Option<String>,
}

impl Recorder {
    pub fn new() -> (Self, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Recorder {
            next: AtomicU64::new(1),
            seen: Arc::clone(&seen),
            prompt: None,
        };
        (recorder, seen)
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(prompt.to_string());
        self
    }

    fn record(&self, seen: Seen) {
        self.seen.lock().unwrap().push(seen);
    }
}

#[async_trait]
impl ServerHandler for Recorder {
    async fn on_connect(
        &self,
        _manager: &mut ConnectionManager,
        _id: ConnectionId,
        _port: u16,
    ) -> Option<Identity> {
        Some(Identity::new(self.next.fetch_add(1, Ordering::Relaxed)))
    }

    async fn on_logon(&self, _manager: &mut ConnectionManager, identity: Identity) {
        self.record(Seen::Logon(identity));
    }

    async fn on_command(&self, _manager: &mut ConnectionManager, identity: Identity, text: &str) {
        self.record(Seen::Command(identity, text.to_string()));
    }

    async fn on_terminal_type(
        &self,
        _manager: &mut ConnectionManager,
        identity: Identity,
        terminal: &str,
    ) {
        self.record(Seen::TerminalType(identity, terminal.to_string()));
    }

    async fn on_window_size(
        &self,
        _manager: &mut ConnectionManager,
        identity: Identity,
        size: WindowSize,
    ) {
        self.record(Seen::WindowSize(identity, size));
    }

    async fn on_suboption(&self, _manager: &mut ConnectionManager, identity: Identity, payload: &[u8]) {
        self.record(Seen::Suboption(identity, payload.to_vec()));
    }

    async fn on_binary(&self, _manager: &mut ConnectionManager, identity: Identity, bytes: &[u8]) {
        self.record(Seen::Binary(identity, bytes.to_vec()));
    }

    async fn on_disconnect(&self, _manager: &mut ConnectionManager, identity: Identity) {
        self.record(Seen::Disconnect(identity));
    }

    fn prompt(&self, _identity: Identity) -> Option<String> {
        self.prompt.clone()
    }
}

pub fn local_config() -> ServerConfig {
    ServerConfig::new("127.0.0.1:0".parse().unwrap()).with_poll_timeout(Duration::from_millis(20))
}

/// Runs the event loop until `done` holds
pub async fn pump_until<H, F>(server: &mut TelnetServer<H>, mut done: F)
where
    H: ServerHandler,
    F: FnMut(&TelnetServer<H>) -> bool,
{
    let deadline = Instant::now() + WAIT;
    while !done(&*server) {
        assert!(Instant::now() < deadline, "timed out pumping the event loop");
        server.poll_once().await.unwrap();
    }
}

/// Connects `count` clients one at a time, waiting for each to log on
pub async fn connect_clients<H: ServerHandler>(
    server: &mut TelnetServer<H>,
    port: usize,
    count: usize,
) -> Vec<TcpStream> {
    let addr = server.local_addrs()[port];
    let mut clients = Vec::with_capacity(count);
    for _ in 0..count {
        let expected = server.manager().connection_count() + 1;
        clients.push(TcpStream::connect(addr).await.unwrap());
        pump_until(server, |s| s.manager().connection_count() == expected).await;
    }
    clients
}

/// Runs the event loop while reading from `client` until what has arrived
/// contains `needle`. Returns everything read.
pub async fn read_until_contains<H: ServerHandler>(
    server: &mut TelnetServer<H>,
    client: &mut TcpStream,
    needle: &[u8],
) -> Vec<u8> {
    let deadline = Instant::now() + WAIT;
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    while !contains(&received, needle) {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {:?}, got {:?}",
            String::from_utf8_lossy(needle),
            String::from_utf8_lossy(&received)
        );
        server.poll_once().await.unwrap();
        if let Ok(result) = timeout(Duration::from_millis(10), client.read(&mut buf)).await {
            let count = result.unwrap();
            assert!(count > 0, "connection closed before {:?} arrived", needle);
            received.extend_from_slice(&buf[..count]);
        }
    }
    received
}

/// Runs the event loop until the server closes `client`
pub async fn read_until_closed<H: ServerHandler>(
    server: &mut TelnetServer<H>,
    client: &mut TcpStream,
) -> Vec<u8> {
    let deadline = Instant::now() + WAIT;
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        assert!(Instant::now() < deadline, "timed out waiting for the server to close");
        server.poll_once().await.unwrap();
        match timeout(Duration::from_millis(10), client.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => return received,
            Ok(Ok(count)) => received.extend_from_slice(&buf[..count]),
            Err(_) => {}
        }
    }
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

pub fn seen(log: &Arc<Mutex<Vec<Seen>>>) -> Vec<Seen> {
    log.lock().unwrap().clone()
}

pub fn commands(log: &Arc<Mutex<Vec<Seen>>>) -> Vec<(Identity, String)> {
    seen(log)
        .into_iter()
        .filter_map(|seen| match seen {
            Seen::Command(identity, text) => Some((identity, text)),
            _ => None,
        })
        .collect()
}
