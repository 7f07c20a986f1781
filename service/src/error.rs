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


//! Error types for the driver's connection layer

use crate::types::{ConnectionId, Identity};
use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Connection layer error types
#[derive(Debug, Error)]
pub enum ServiceError {
    /// I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Address resolution protocol error
    #[error("Resolver protocol error: {0}")]
    Protocol(#[from] mudwire_resolver::ProtocolError),

    /// Connection with the given ID was not found
    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// The identity does not own a connection
    #[error("Identity {0} is not interactive")]
    NotInteractive(Identity),

    /// The identity already owns a connection
    #[error("Identity {0} is already interactive")]
    AlreadyInteractive(Identity),

    /// Teardown was requested for a connection already closing or closed
    #[error("Connection {0} is already closed")]
    AlreadyClosed(ConnectionId),

    /// Maximum number of connections reached
    #[error("Maximum connections ({0}) reached")]
    MaxConnectionsReached(usize),

    /// The address server connection is down
    #[error("Address server unavailable")]
    ResolverUnavailable,

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ServiceError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors leave the server running; the operation can be
    /// retried or simply ignored.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::AlreadyClosed(_)
                | ServiceError::MaxConnectionsReached(_)
                | ServiceError::ResolverUnavailable
                | ServiceError::Protocol(_)
        )
    }

    /// Check if the error is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ServiceError::ConnectionNotFound(_)
                | ServiceError::NotInteractive(_)
                | ServiceError::AlreadyClosed(_)
                | ServiceError::Io(_)
        )
    }
}
