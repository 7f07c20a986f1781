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


//! MUD driver connection layer
//!
//! This crate owns every client socket of a MUD driver and runs the event loop
//! that moves bytes between them and the game:
//!
//! - A fixed registry of connection slots with generation-counted ids
//! - Telnet decoding through `mudwire-telnetcodec`, plus raw line and binary
//!   ports
//! - A bounded output ring per connection, flushed without blocking
//! - A per-connection input buffer and a round-robin command scheduler that
//!   serves every ready connection once before serving any twice
//! - Name lookups through a separate address server (`mudwire-resolver`)
//! - Snooping and connection transfer between identities
//!
//! # Architecture
//!
//! ```text
//! TelnetServer  (listeners, event loop)
//!     ↓
//! ServerHandler (the game, called with &mut ConnectionManager)
//!     ↓
//! ConnectionManager → Connection → OutputBuffer / InputBuffer / TelnetCodec
//!     ↓
//! ResolverClient → address server
//! ```
//!
//! Everything runs on one task. Socket I/O never blocks: the loop waits once
//! per pass for any socket to become ready, then uses non-blocking reads and
//! writes.
//!
//! # Example
//!
//! ```no_run
//! use mudwire_service::{ConnectionId, ConnectionManager, Identity, ServerConfig, ServerHandler, TelnetServer};
//! use async_trait::async_trait;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl ServerHandler for Greeter {
//!     async fn on_connect(&self, _: &mut ConnectionManager, id: ConnectionId, _: u16) -> Option<Identity> {
//!         Some(Identity::new(id.generation()))
//!     }
//!
//!     async fn on_logon(&self, manager: &mut ConnectionManager, identity: Identity) {
//!         let _ = manager.send(identity, "Welcome!\n");
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new("0.0.0.0:4000".parse()?);
//!     let mut server = TelnetServer::bind(config, Greeter).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, future_incompatible, rust_2018_idioms)]

mod config;
mod connection;
mod error;
mod handler;
mod input;
mod lookup;
mod manager;
mod metrics;
mod output;
mod server;
mod snoop;
mod types;

pub use config::{
    DEFAULT_INPUT_BUFFER_SIZE, DEFAULT_OUTPUT_BUFFER_SIZE, MAX_PORTS, PortConfig, ServerConfig,
};
pub use connection::Connection;
pub use error::{Result, ServiceError};
pub use handler::ServerHandler;
pub use input::{InputBuffer, resolve_backspaces};
pub use lookup::{
    IP_CACHE_SIZE, IpCache, MAX_PENDING, RequestHandle, ResolveCallback, Resolution,
    ResolverClient,
};
pub use manager::ConnectionManager;
pub use self::metrics::{MetricsSnapshot, ServerMetrics};
pub use output::{FlushStatus, OutputBuffer, OutputSink};
pub use server::TelnetServer;
pub use snoop::SnoopMap;
pub use types::{
    Command, ConnectionFlags, ConnectionId, ConnectionInfo, ConnectionKind, ConnectionState,
    Identity, ServerSnapshot,
};

pub use mudwire_telnetcodec::naws::WindowSize;
