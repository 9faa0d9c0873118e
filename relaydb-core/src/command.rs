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

//! Commands — serializable descriptions of one operation
//!
//! A [`Command`] carries no resource references directly; any resource
//! argument travels as a self-contained [`WireValue`], except where the
//! operation explicitly addresses another registered handle (a savepoint
//! release, a lob parameter).
//!
//! Rare operations with no dedicated variant go through [`Command::Call`]:
//! a closed tagged-variant dispatch keyed by ([`InterfaceKind`],
//! [`GenericOp`]). Unknown pairs are rejected as a protocol error at
//! decode time, not at invoke time — see [`call_supported`].

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::value::WireValue;

/// One prepared-statement parameter. Values travel self-contained; a lob
/// parameter addresses a previously registered large-object handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Value(WireValue),
    Lob(u64),
}

/// Target interface of a generic call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceKind {
    Connection,
    Cursor,
}

/// Operation selector of a generic call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenericOp {
    GetAutoCommit,
    IsReadOnly,
    LastInsertRowId,
    ChangeCount,
    RowCountSoFar,
}

/// The closed dispatch table: every (interface, operation) pair the server
/// will resolve. Anything else is a protocol error.
pub const GENERIC_CALLS: &[(InterfaceKind, GenericOp)] = &[
    (InterfaceKind::Connection, GenericOp::GetAutoCommit),
    (InterfaceKind::Connection, GenericOp::IsReadOnly),
    (InterfaceKind::Connection, GenericOp::LastInsertRowId),
    (InterfaceKind::Connection, GenericOp::ChangeCount),
    (InterfaceKind::Cursor, GenericOp::RowCountSoFar),
];

pub fn call_supported(iface: InterfaceKind, op: GenericOp) -> bool {
    GENERIC_CALLS.iter().any(|&(i, o)| i == iface && o == op)
}

/// Immutable, serializable description of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    // Connection-target operations.
    ExecuteUpdate { sql: String },
    ExecuteQuery { sql: String },
    Prepare { sql: String },
    Commit,
    Rollback,
    SetAutoCommit { on: bool },
    CreateSavepoint { name: String },
    CreateLob { data: Vec<u8> },
    Ping,
    CloseConnection,

    // Prepared-statement-target operations.
    PreparedUpdate { params: Vec<ParamValue> },
    PreparedQuery { params: Vec<ParamValue> },

    // Cursor-target operations.
    NextBatch,
    CursorMetadata,

    // Savepoint-target operations.
    ReleaseSavepoint,
    RollbackToSavepoint,

    // Lob-target operations.
    LobRead { offset: u64, len: u32 },
    LobLength,

    // Any non-connection handle.
    CloseTarget,

    // Generic dispatch for rare operations.
    Call {
        iface: InterfaceKind,
        op: GenericOp,
        args: Vec<WireValue>,
    },
}

impl Command {
    /// Decode-time validation: reject generic calls outside the closed
    /// dispatch table before they ever reach the engine.
    pub fn validate(&self) -> Result<()> {
        if let Command::Call { iface, op, .. } = self {
            if !call_supported(*iface, *op) {
                return Err(CoreError::UnsupportedCall {
                    iface: *iface,
                    op: *op,
                });
            }
        }
        Ok(())
    }

    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::ExecuteUpdate { .. } => "execute_update",
            Command::ExecuteQuery { .. } => "execute_query",
            Command::Prepare { .. } => "prepare",
            Command::Commit => "commit",
            Command::Rollback => "rollback",
            Command::SetAutoCommit { .. } => "set_auto_commit",
            Command::CreateSavepoint { .. } => "create_savepoint",
            Command::CreateLob { .. } => "create_lob",
            Command::Ping => "ping",
            Command::CloseConnection => "close_connection",
            Command::PreparedUpdate { .. } => "prepared_update",
            Command::PreparedQuery { .. } => "prepared_query",
            Command::NextBatch => "next_batch",
            Command::CursorMetadata => "cursor_metadata",
            Command::ReleaseSavepoint => "release_savepoint",
            Command::RollbackToSavepoint => "rollback_to_savepoint",
            Command::LobRead { .. } => "lob_read",
            Command::LobLength => "lob_length",
            Command::CloseTarget => "close_target",
            Command::Call { .. } => "call",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_pairs_validate() {
        let cmd = Command::Call {
            iface: InterfaceKind::Connection,
            op: GenericOp::LastInsertRowId,
            args: vec![],
        };
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn test_unknown_pair_rejected() {
        // RowCountSoFar only makes sense on a cursor.
        let cmd = Command::Call {
            iface: InterfaceKind::Connection,
            op: GenericOp::RowCountSoFar,
            args: vec![],
        };
        assert!(matches!(
            cmd.validate(),
            Err(CoreError::UnsupportedCall { .. })
        ));
    }

    #[test]
    fn test_named_commands_always_valid() {
        assert!(Command::Ping.validate().is_ok());
        assert!(Command::NextBatch.validate().is_ok());
    }
}
