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


//! # Mudwire Address Resolver
//!
//! Host name lookups block, so the driver hands them to a separate process
//! and keeps serving players while the answer is pending. This crate holds
//! both halves of the conversation:
//!
//! - [`protocol`]: the framed request format sent by the driver and the
//!   one-line text responses sent back
//! - [`AddressServer`]: the standalone resolver, a single-threaded event loop
//!   over a fixed table of driver connections
//! - [`EventQueue`]: the recycling FIFO the server drains a bounded batch at a
//!   time
//! - [`NameLookup`]: the blocking name service the server calls
//!
//! ## Wire Format
//!
//! Requests are little-endian 32-bit words followed by a NUL-terminated
//! query:
//!
//! ```text
//! DATALEN(2) | length | NAME_BY_IP(0) or IP_BY_NAME(1) | query... | NUL
//! ```
//!
//! Responses are `"<query> <result>\n"`, where a result of `0` means the
//! lookup failed.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use mudwire_resolver::{AddressServer, ResolverConfig, SystemLookup};
//! use std::sync::Arc;
//!
//! # async fn run() -> mudwire_resolver::Result<()> {
//! let config = ResolverConfig::new("127.0.0.1:9990".parse().unwrap());
//! let mut server = AddressServer::bind(config, Arc::new(SystemLookup)).await?;
//! server.run().await
//! # }
//! ```

#![warn(missing_docs, future_incompatible, rust_2018_idioms)]

mod config;
mod error;
mod lookup;
pub mod protocol;
mod queue;
mod server;

pub use config::ResolverConfig;
pub use error::{ProtocolError, Result};
pub use lookup::{NameLookup, StaticLookup, SystemLookup};
pub use protocol::{AddrRequest, AddrResponse, RequestCodec, RequestKind};
pub use queue::EventQueue;
pub use server::{AddressServer, NO_SLOTS_MESSAGE, QueuedEvent};
