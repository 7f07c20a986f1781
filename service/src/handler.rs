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


//! Collaborator interface for the event loop

use crate::{ConnectionId, ConnectionManager, Identity};
use async_trait::async_trait;
use mudwire_telnetcodec::naws::WindowSize;

/// Server event handler trait
///
/// Implement this trait to receive decoded input from the event loop. Every
/// method gets the [`ConnectionManager`] and may send output, close
/// connections, start lookups or rearrange snoops from inside the call.
/// Only [`on_connect`](ServerHandler::on_connect) must be provided; the rest
/// default to doing nothing.
///
/// # Example
///
/// ```no_run
/// use mudwire_service::{ConnectionId, ConnectionManager, Identity, ServerHandler};
/// use async_trait::async_trait;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// struct Echo {
///     next: AtomicU64,
/// }
///
/// #[async_trait]
/// impl ServerHandler for Echo {
///     async fn on_connect(
///         &self,
///         _manager: &mut ConnectionManager,
///         _id: ConnectionId,
///         _port: u16,
///     ) -> Option<Identity> {
///         Some(Identity::new(self.next.fetch_add(1, Ordering::Relaxed)))
///     }
///
///     async fn on_command(&self, manager: &mut ConnectionManager, identity: Identity, text: &str) {
///         let _ = manager.send(identity, &format!("{}\n", text));
///     }
/// }
/// ```
#[async_trait]
pub trait ServerHandler: Send + Sync + 'static {
    /// Called for every accepted connection before any input is read.
    ///
    /// Returning `None` refuses the connection, which is closed straight
    /// away. The returned identity is bound to the connection.
    async fn on_connect(
        &self,
        manager: &mut ConnectionManager,
        id: ConnectionId,
        port: u16,
    ) -> Option<Identity>;

    /// Called once the identity is bound and the opening negotiation is sent
    async fn on_logon(&self, _manager: &mut ConnectionManager, _identity: Identity) {}

    /// Called with each complete command or line
    async fn on_command(&self, _manager: &mut ConnectionManager, _identity: Identity, _text: &str) {}

    /// Called when the peer reports its terminal type
    async fn on_terminal_type(
        &self,
        _manager: &mut ConnectionManager,
        _identity: Identity,
        _terminal: &str,
    ) {
    }

    /// Called when the peer reports its window size
    async fn on_window_size(
        &self,
        _manager: &mut ConnectionManager,
        _identity: Identity,
        _size: WindowSize,
    ) {
    }

    /// Called with any other subnegotiation, option byte first
    async fn on_suboption(
        &self,
        _manager: &mut ConnectionManager,
        _identity: Identity,
        _payload: &[u8],
    ) {
    }

    /// Called with raw input on binary ports
    async fn on_binary(&self, _manager: &mut ConnectionManager, _identity: Identity, _bytes: &[u8]) {}

    /// Called when the network drops a connection. Not called for
    /// [`ConnectionManager::close`].
    async fn on_disconnect(&self, _manager: &mut ConnectionManager, _identity: Identity) {}

    /// Text written after each command is handled
    fn prompt(&self, _identity: Identity) -> Option<String> {
        None
    }
}
