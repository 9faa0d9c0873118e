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

//! Server-side errors and the wire normalization funnel
//!
//! Every error that must cross the wire goes through [`to_wire`]: driver
//! failures become `Database` errors carrying the SQLite extended result
//! code, encode/decode failures become `Transport`, and handle/session
//! misuse becomes `Protocol`. Nothing non-serializable ever leaves the
//! engine.

use thiserror::Error;

use relaydb_core::{CoreError, WireError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// The single wrapping routine: normalize any server-side failure into
/// the one transportable error representation.
pub fn to_wire(err: ServerError) -> WireError {
    match err {
        ServerError::Sqlite(db_err) => sqlite_to_wire(&db_err),
        ServerError::Wire(wire) => wire,
        ServerError::Core(core) => WireError::from(core),
        ServerError::Config(msg) => WireError::transport(format!("configuration: {msg}")),
        ServerError::Io(io_err) => WireError::transport(io_err.to_string()),
    }
}

fn sqlite_to_wire(err: &rusqlite::Error) -> WireError {
    match err {
        rusqlite::Error::SqliteFailure(ffi_err, msg) => {
            let message = msg
                .clone()
                .unwrap_or_else(|| ffi_err.to_string());
            WireError::database(
                ffi_err.extended_code,
                format!("{:?}", ffi_err.code),
                message,
            )
        }
        other => WireError::database(0, "GENERAL", other.to_string()).with_cause(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaydb_core::WireErrorKind;

    #[test]
    fn test_sqlite_failure_carries_codes() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn.prepare("SELECT * FROM missing_table").unwrap_err();
        let wire = to_wire(ServerError::Sqlite(err));
        match wire.kind {
            WireErrorKind::Database { .. } => {}
            other => panic!("expected database error, got {other:?}"),
        }
        assert!(wire.message.contains("missing_table"));
    }

    #[test]
    fn test_core_error_becomes_transport() {
        let wire = to_wire(ServerError::Core(CoreError::Encode("boom".into())));
        assert_eq!(wire.kind, WireErrorKind::Transport);
    }

    #[test]
    fn test_wire_error_passes_through() {
        let original = WireError::protocol("connection already closed");
        let wire = to_wire(ServerError::Wire(original.clone()));
        assert_eq!(wire, original);
    }
}
