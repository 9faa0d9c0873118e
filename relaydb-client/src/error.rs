// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Client-side errors.
//!
//! A [`ClientError::Server`] wraps the transportable error the server
//! sent back; its kind tells stale local state (protocol) apart from a
//! real database fault (database).

use thiserror::Error;

use relaydb_cache::CacheError;
use relaydb_core::{CoreError, WireError};

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an error response.
    #[error("server error: {0}")]
    Server(WireError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("connection is closed")]
    Closed,

    #[error("unexpected response: expected {0}")]
    UnexpectedResponse(&'static str),
}

impl ClientError {
    /// True when the server reported a protocol fault — a stale handle or
    /// an already-closed connection, as opposed to a database error.
    pub fn is_protocol(&self) -> bool {
        matches!(self, ClientError::Server(w) if w.is_protocol())
    }

    pub fn is_database(&self) -> bool {
        matches!(self, ClientError::Server(w) if w.is_database())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
