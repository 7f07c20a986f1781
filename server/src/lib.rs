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


//! Line-echo collaborator for the mudwire driver
//!
//! [`EchoHandler`] stands in for a game: every connection gets a fresh
//! identity, each command is echoed back, and a handful of words poke at the
//! connection layer so it can be driven by hand from a Telnet client.
//!
//! | Command | Effect |
//! |---|---|
//! | `quit` | closes the connection |
//! | `who` | lists every connection |
//! | `host` | shows the peer's host name, or its address until a lookup answers |
//! | `resolve <query>` | asks the address server about a name or address |
//! | `snoop [n]` | snoops on identity `n`, or stops snooping |
//! | `password` | turns echo off for the next line |
//! | anything else | echoed back |

#![warn(missing_docs, future_incompatible, rust_2018_idioms)]

use async_trait::async_trait;
use mudwire_service::{
    ConnectionId, ConnectionManager, Identity, Resolution, ServerHandler, WindowSize,
};
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Prompt written after every command
pub const PROMPT: &str = "> ";

/// Echoing collaborator
#[derive(Debug)]
pub struct EchoHandler {
    next_identity: AtomicU64,
}

impl EchoHandler {
    /// Creates a handler that numbers identities from 1
    pub fn new() -> Self {
        EchoHandler {
            next_identity: AtomicU64::new(1),
        }
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn reply(manager: &mut ConnectionManager, identity: Identity, text: &str) {
    if let Err(err) = manager.send(identity, text) {
        debug!(%identity, "Reply not sent: {}", err);
    }
}

fn who(manager: &ConnectionManager) -> String {
    let mut out = String::new();
    for info in manager.connections() {
        let owner = info
            .owner
            .map_or_else(|| "-".to_string(), |identity| identity.to_string());
        let _ = writeln!(
            out,
            "{:<6} {:<8} {:<22} idle {}s",
            owner,
            info.kind,
            info.peer_addr,
            info.idle_duration().as_secs()
        );
    }
    out
}

fn report_lookup(manager: &mut ConnectionManager, identity: Identity, resolution: &Resolution) {
    let text = match (&resolution.name, &resolution.address) {
        (Some(name), Some(address)) => format!("{} is {}\n", name, address),
        _ => format!("No answer for {}\n", resolution.query),
    };
    reply(manager, identity, &text);
}

#[async_trait]
impl ServerHandler for EchoHandler {
    async fn on_connect(
        &self,
        _manager: &mut ConnectionManager,
        id: ConnectionId,
        port: u16,
    ) -> Option<Identity> {
        let identity = Identity::new(self.next_identity.fetch_add(1, Ordering::Relaxed));
        info!(connection_id = %id, %identity, port, "New player");
        Some(identity)
    }

    async fn on_logon(&self, manager: &mut ConnectionManager, identity: Identity) {
        reply(
            manager,
            identity,
            &format!("Welcome, you are {}. Type 'quit' to leave.\n{}", identity, PROMPT),
        );
    }

    async fn on_command(&self, manager: &mut ConnectionManager, identity: Identity, text: &str) {
        let mut words = text.split_whitespace();
        match (words.next(), words.next()) {
            (Some("quit"), _) => {
                reply(manager, identity, "Goodbye.\n");
                if let Err(err) = manager.close(identity) {
                    warn!(%identity, "Close failed: {}", err);
                }
            }
            (Some("who"), _) => {
                let list = who(manager);
                reply(manager, identity, &list);
            }
            (Some("host"), _) => match manager.ip_name(identity) {
                Ok(name) => reply(manager, identity, &format!("You are connected from {}\n", name)),
                Err(err) => debug!(%identity, "No address: {}", err),
            },
            (Some("resolve"), Some(query)) => {
                let query = query.to_string();
                manager.resolve(identity, &query, move |manager, resolution| {
                    report_lookup(manager, identity, resolution)
                });
            }
            (Some("snoop"), target) => {
                let target = target.and_then(|n| n.parse().ok()).map(Identity::new);
                let text = match manager.snoop(identity, target) {
                    Ok(true) if target.is_some() => "Snooping.\n",
                    Ok(true) => "Snoop stopped.\n",
                    Ok(false) => "That would make a loop.\n",
                    Err(_) => "Nobody by that number.\n",
                };
                reply(manager, identity, text);
            }
            (Some("password"), _) => {
                reply(manager, identity, "Password: ");
                if let Err(err) = manager.set_input_mode(identity, true, false) {
                    debug!(%identity, "Echo not suppressed: {}", err);
                }
            }
            _ => reply(manager, identity, &format!("You said: {}\n", text)),
        }
    }

    async fn on_terminal_type(&self, _manager: &mut ConnectionManager, identity: Identity, terminal: &str) {
        info!(%identity, terminal, "Terminal type");
    }

    async fn on_window_size(&self, _manager: &mut ConnectionManager, identity: Identity, size: WindowSize) {
        info!(%identity, %size, "Window size");
    }

    async fn on_disconnect(&self, manager: &mut ConnectionManager, identity: Identity) {
        manager.release_owner(identity);
        info!(%identity, "Link dead");
    }

    fn prompt(&self, _identity: Identity) -> Option<String> {
        Some(PROMPT.to_string())
    }
}
