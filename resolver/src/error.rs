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


//! Error types for the address resolution protocol

use thiserror::Error;

/// Result type for resolver operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Address resolution protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The query does not fit in a request buffer
    #[error("Query of {length} bytes exceeds the {max} byte limit")]
    QueryTooLong {
        /// Length of the rejected query
        length: usize,
        /// Longest query a request can carry
        max: usize,
    },

    /// Requests must carry a non-empty query
    #[error("Empty query")]
    EmptyQuery,

    /// Queries are host names or dotted addresses: printable, no spaces
    #[error("Query contains unprintable characters")]
    Unprintable,

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProtocolError {
    /// Whether the error came from the transport rather than the request
    pub fn is_io_error(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}
