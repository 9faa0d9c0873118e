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

//! Error types for the RelayDB wire layer
//!
//! Two families live here:
//!
//! - [`CoreError`] — local failures in this crate (encoding, framing,
//!   packet building). Never serialized.
//! - [`WireError`] — the single transportable error representation. Every
//!   server-side failure that must cross the wire is normalized into one of
//!   these before leaving the dispatch engine, so clients can distinguish
//!   stale local state ([`WireErrorKind::Protocol`]) from a real database
//!   fault ([`WireErrorKind::Database`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::command::{GenericOp, InterfaceKind};

/// Local (non-transportable) errors raised by the wire layer.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("frame too large: {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("column type mismatch: column holds {expected}, row value is {got}")]
    ColumnType {
        expected: &'static str,
        got: &'static str,
    },

    #[error("row arity mismatch: packet has {columns} columns, row has {values} values")]
    RowArity { columns: usize, values: usize },

    #[error("unsupported generic call: {iface:?}/{op:?}")]
    UnsupportedCall { iface: InterfaceKind, op: GenericOp },
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Category tag on a [`WireError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorKind {
    /// Raised by the underlying database driver during command execution.
    /// Carries the driver's extended result code and a standardized state
    /// code so clients can react without parsing message text.
    Database { vendor_code: i32, sql_state: String },
    /// A command, argument, or result could not be encoded or decoded.
    Transport,
    /// Invalid/unknown handle, connection already closed, or an
    /// unresolvable generic-dispatch pair.
    Protocol,
}

/// The one error representation that crosses the wire.
///
/// Anything non-serializable in the original cause chain is reconstructed
/// as message text in `chain`; stack detail is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: WireErrorKind,
    pub message: String,
    /// Flattened cause chain, outermost first.
    pub chain: Vec<String>,
}

impl WireError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            kind: WireErrorKind::Protocol,
            message: message.into(),
            chain: Vec::new(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: WireErrorKind::Transport,
            message: message.into(),
            chain: Vec::new(),
        }
    }

    pub fn database(vendor_code: i32, sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: WireErrorKind::Database {
                vendor_code,
                sql_state: sql_state.into(),
            },
            message: message.into(),
            chain: Vec::new(),
        }
    }

    /// Flatten a cause chain into transportable message text.
    pub fn with_cause(mut self, cause: &(dyn std::error::Error + 'static)) -> Self {
        let mut next = Some(cause);
        while let Some(err) = next {
            self.chain.push(err.to_string());
            next = err.source();
        }
        self
    }

    pub fn is_protocol(&self) -> bool {
        self.kind == WireErrorKind::Protocol
    }

    pub fn is_database(&self) -> bool {
        matches!(self.kind, WireErrorKind::Database { .. })
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WireErrorKind::Database {
                vendor_code,
                sql_state,
            } => write!(
                f,
                "database error [{sql_state}/{vendor_code}]: {}",
                self.message
            ),
            WireErrorKind::Transport => write!(f, "transport error: {}", self.message),
            WireErrorKind::Protocol => write!(f, "protocol error: {}", self.message),
        }
    }
}

impl std::error::Error for WireError {}

impl From<CoreError> for WireError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnsupportedCall { iface, op } => {
                WireError::protocol(format!("unsupported generic call: {iface:?}/{op:?}"))
            }
            other => WireError::transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_chain_flattened() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = WireError::transport("encode failed").with_cause(&io);
        assert_eq!(err.chain, vec!["disk gone".to_string()]);
    }

    #[test]
    fn test_display_carries_codes() {
        let err = WireError::database(1555, "23000", "UNIQUE constraint failed");
        let text = err.to_string();
        assert!(text.contains("23000"));
        assert!(text.contains("1555"));
    }

    #[test]
    fn test_protocol_distinct_from_database() {
        let proto = WireError::protocol("connection already closed");
        assert!(proto.is_protocol());
        assert!(!proto.is_database());
    }
}
