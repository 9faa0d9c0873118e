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

//! Handle-backed client objects: prepared statements, savepoints, lobs.
//!
//! Each wraps a server-side handle valid only within its owning
//! connection. Prepared statements and lobs release their handle on drop
//! (best-effort); savepoints are released explicitly or swept away with
//! the transaction.

use std::sync::Arc;

use tracing::debug;

use relaydb_core::command::{Command, ParamValue};
use relaydb_core::wire::CommandResult;
use relaydb_core::{Handle, WireValue};

use crate::connection::ClientCore;
use crate::error::{ClientError, Result};
use crate::rows::QueryRows;

pub struct PreparedStatement {
    core: Arc<ClientCore>,
    handle: Handle,
    closed: bool,
}

impl PreparedStatement {
    pub(crate) fn new(core: Arc<ClientCore>, handle: Handle) -> Self {
        Self {
            core,
            handle,
            closed: false,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn execute(&self, params: Vec<ParamValue>) -> Result<u64> {
        match self
            .core
            .call(Some(self.handle.id), Command::PreparedUpdate { params })?
        {
            CommandResult::UpdateCount(count) => Ok(count),
            _ => Err(ClientError::UnexpectedResponse("update count")),
        }
    }

    pub fn query(&self, params: Vec<ParamValue>) -> Result<QueryRows> {
        match self
            .core
            .call(Some(self.handle.id), Command::PreparedQuery { params })?
        {
            CommandResult::Cursor { handle, columns } => {
                Ok(QueryRows::remote(Arc::clone(&self.core), handle, columns))
            }
            _ => Err(ClientError::UnexpectedResponse("cursor")),
        }
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.core
            .call(Some(self.handle.id), Command::CloseTarget)
            .map(|_| ())
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        if !self.closed && !self.core.is_closed() {
            self.closed = true;
            if self
                .core
                .call(Some(self.handle.id), Command::CloseTarget)
                .is_err()
            {
                debug!(statement = self.handle.id, "statement close on drop failed");
            }
        }
    }
}

pub struct Savepoint {
    core: Arc<ClientCore>,
    handle: Handle,
}

impl Savepoint {
    pub(crate) fn new(core: Arc<ClientCore>, handle: Handle) -> Self {
        Self { core, handle }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Roll the transaction back to this savepoint; the savepoint itself
    /// stays valid.
    pub fn rollback_to(&self) -> Result<()> {
        self.core
            .call(Some(self.handle.id), Command::RollbackToSavepoint)
            .map(|_| ())
    }

    /// Release the savepoint, consuming it.
    pub fn release(self) -> Result<()> {
        self.core
            .call(Some(self.handle.id), Command::ReleaseSavepoint)
            .map(|_| ())
    }
}

pub struct Lob {
    core: Arc<ClientCore>,
    handle: Handle,
    length: u64,
    closed: bool,
}

impl Lob {
    pub(crate) fn new(core: Arc<ClientCore>, handle: Handle, length: u64) -> Self {
        Self {
            core,
            handle,
            length,
            closed: false,
        }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Bind this lob as a prepared-statement parameter.
    pub fn as_param(&self) -> ParamValue {
        ParamValue::Lob(self.handle.id)
    }

    pub fn read(&self, offset: u64, len: u32) -> Result<Vec<u8>> {
        match self
            .core
            .call(Some(self.handle.id), Command::LobRead { offset, len })?
        {
            CommandResult::Value(WireValue::Bytes(bytes)) => Ok(bytes),
            _ => Err(ClientError::UnexpectedResponse("bytes")),
        }
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.core
            .call(Some(self.handle.id), Command::CloseTarget)
            .map(|_| ())
    }
}

impl Drop for Lob {
    fn drop(&mut self) {
        if !self.closed && !self.core.is_closed() {
            self.closed = true;
            if self
                .core
                .call(Some(self.handle.id), Command::CloseTarget)
                .is_err()
            {
                debug!(lob = self.handle.id, "lob close on drop failed");
            }
        }
    }
}
