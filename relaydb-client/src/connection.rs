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

//! The client connection.
//!
//! [`RelayConnection`] is the public surface: it owns the transport, the
//! optional mirror cache and its sweeper, and the keep-alive pinger. A
//! query is first offered to the mirror cache (when configured); only a
//! cache miss crosses the wire.
//!
//! Close is explicit and idempotent; dropping the connection closes it
//! best-effort. Commands on a closed connection fail locally with
//! [`ClientError::Closed`] before touching the socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use relaydb_cache::{CacheSweeper, MirrorCache};
use relaydb_core::command::{Command, GenericOp, InterfaceKind};
use relaydb_core::wire::{CommandResult, Request, Response};
use relaydb_core::{CallingContext, Handle, WireValue};

use crate::error::{ClientError, Result};
use crate::keepalive::KeepAlive;
use crate::options::ConnectOptions;
use crate::rows::QueryRows;
use crate::source::RemoteSource;
use crate::statement::{Lob, PreparedStatement, Savepoint};
use crate::transport::TcpTransport;

/// Shared state behind every surface object of one connection.
pub(crate) struct ClientCore {
    transport: TcpTransport,
    handle: Handle,
    client: String,
    /// Set by every real command, cleared by the keep-alive tick.
    dirty: AtomicBool,
    closed: AtomicBool,
}

impl ClientCore {
    pub(crate) fn conn_id(&self) -> u64 {
        self.handle.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn mark_closed(&self) -> bool {
        self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    fn ctx(&self, detail: &str) -> CallingContext {
        CallingContext::new(self.client.clone(), detail)
    }

    /// One command round trip. Every command except `Ping` marks the
    /// connection dirty for the keep-alive window.
    pub(crate) fn call(&self, target: Option<u64>, command: Command) -> Result<CommandResult> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        if !matches!(command, Command::Ping) {
            self.dirty.store(true, Ordering::Release);
        }
        let detail = command.name();
        let response = self.transport.roundtrip(&Request::Process {
            conn_id: self.handle.id,
            target_id: target,
            command,
            ctx: self.ctx(detail),
        })?;
        match response {
            Response::Result(result) => Ok(result),
            Response::Handle(handle) => Ok(CommandResult::Handle(handle)),
            Response::Error(err) => Err(ClientError::Server(err)),
        }
    }
}

pub struct RelayConnection {
    core: Arc<ClientCore>,
    cache: Option<Arc<MirrorCache>>,
    keepalive: Option<KeepAlive>,
    sweeper: Option<CacheSweeper>,
}

impl RelayConnection {
    /// Connect to `relaydb://host:port/database`.
    pub fn connect(url: &str) -> Result<Self> {
        Self::connect_with(ConnectOptions::parse(url)?)
    }

    pub fn connect_with(options: ConnectOptions) -> Result<Self> {
        let transport = TcpTransport::connect(&options.addr)?;
        let client = format!("relaydb-client/{}", env!("CARGO_PKG_VERSION"));
        let response = transport.roundtrip(&Request::Connect {
            database: options.database.clone(),
            properties: options.properties.clone(),
            client_info: options.client_info.clone(),
            ctx: CallingContext::new(client.clone(), "connect"),
        })?;
        let handle = match response {
            Response::Handle(handle) => handle,
            Response::Error(err) => return Err(ClientError::Server(err)),
            Response::Result(_) => return Err(ClientError::UnexpectedResponse("handle")),
        };
        debug!(conn = handle.id, database = %options.database, "connected");

        let core = Arc::new(ClientCore {
            transport,
            handle,
            client,
            dirty: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let rules = options.cache_rules()?;
        let (cache, sweeper) = if rules.is_empty() {
            (None, None)
        } else {
            let source = Arc::new(RemoteSource::new(Arc::clone(&core)));
            let cache = Arc::new(MirrorCache::new(rules, source.as_ref())?);
            let sweeper = CacheSweeper::spawn(Arc::clone(&cache), source);
            (Some(cache), Some(sweeper))
        };

        let keepalive = KeepAlive::spawn(Arc::clone(&core), options.keepalive_period());

        Ok(Self {
            core,
            cache,
            keepalive: Some(keepalive),
            sweeper,
        })
    }

    pub fn handle(&self) -> Handle {
        self.core.handle
    }

    /// Batch-size hint the server resolved for this session, smuggled in
    /// the connection handle's first auxiliary slot.
    pub fn batch_size_hint(&self) -> i64 {
        self.core.handle.aux1
    }

    pub fn execute(&self, sql: &str) -> Result<u64> {
        match self.core.call(None, Command::ExecuteUpdate { sql: sql.into() })? {
            CommandResult::UpdateCount(count) => Ok(count),
            _ => Err(ClientError::UnexpectedResponse("update count")),
        }
    }

    /// Run a query, serving it from the mirror cache when every table it
    /// references is mirrored.
    pub fn query(&self, sql: &str) -> Result<QueryRows> {
        if let Some(cache) = &self.cache {
            let source = RemoteSource::new(Arc::clone(&self.core));
            if let Some((columns, rows)) = cache.try_route(sql, &source) {
                return Ok(QueryRows::cached(columns, rows));
            }
        }
        match self.core.call(None, Command::ExecuteQuery { sql: sql.into() })? {
            CommandResult::Cursor { handle, columns } => {
                Ok(QueryRows::remote(Arc::clone(&self.core), handle, columns))
            }
            _ => Err(ClientError::UnexpectedResponse("cursor")),
        }
    }

    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement> {
        match self.core.call(None, Command::Prepare { sql: sql.into() })? {
            CommandResult::Handle(handle) => {
                Ok(PreparedStatement::new(Arc::clone(&self.core), handle))
            }
            _ => Err(ClientError::UnexpectedResponse("statement handle")),
        }
    }

    pub fn savepoint(&self, name: &str) -> Result<Savepoint> {
        match self
            .core
            .call(None, Command::CreateSavepoint { name: name.into() })?
        {
            CommandResult::Handle(handle) => Ok(Savepoint::new(Arc::clone(&self.core), handle)),
            _ => Err(ClientError::UnexpectedResponse("savepoint handle")),
        }
    }

    pub fn create_lob(&self, data: Vec<u8>) -> Result<Lob> {
        match self.core.call(None, Command::CreateLob { data })? {
            CommandResult::Lob { handle, length } => {
                Ok(Lob::new(Arc::clone(&self.core), handle, length))
            }
            _ => Err(ClientError::UnexpectedResponse("lob handle")),
        }
    }

    pub fn commit(&self) -> Result<()> {
        self.core.call(None, Command::Commit).map(|_| ())
    }

    pub fn rollback(&self) -> Result<()> {
        self.core.call(None, Command::Rollback).map(|_| ())
    }

    pub fn set_auto_commit(&self, on: bool) -> Result<()> {
        self.core
            .call(None, Command::SetAutoCommit { on })
            .map(|_| ())
    }

    pub fn auto_commit(&self) -> Result<bool> {
        match self.generic(InterfaceKind::Connection, GenericOp::GetAutoCommit)? {
            WireValue::Bool(v) => Ok(v),
            _ => Err(ClientError::UnexpectedResponse("bool")),
        }
    }

    pub fn is_read_only(&self) -> Result<bool> {
        match self.generic(InterfaceKind::Connection, GenericOp::IsReadOnly)? {
            WireValue::Bool(v) => Ok(v),
            _ => Err(ClientError::UnexpectedResponse("bool")),
        }
    }

    pub fn last_insert_rowid(&self) -> Result<i64> {
        match self.generic(InterfaceKind::Connection, GenericOp::LastInsertRowId)? {
            WireValue::I64(v) => Ok(v),
            _ => Err(ClientError::UnexpectedResponse("i64")),
        }
    }

    pub fn change_count(&self) -> Result<i64> {
        match self.generic(InterfaceKind::Connection, GenericOp::ChangeCount)? {
            WireValue::I64(v) => Ok(v),
            _ => Err(ClientError::UnexpectedResponse("i64")),
        }
    }

    pub fn ping(&self) -> Result<()> {
        self.core.call(None, Command::Ping).map(|_| ())
    }

    fn generic(&self, iface: InterfaceKind, op: GenericOp) -> Result<WireValue> {
        match self.core.call(
            None,
            Command::Call {
                iface,
                op,
                args: vec![],
            },
        )? {
            CommandResult::Value(value) => Ok(value),
            _ => Err(ClientError::UnexpectedResponse("value")),
        }
    }

    /// Close the connection and everything opened under it. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.core.is_closed() {
            return Ok(());
        }
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.stop();
        }
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        let result = self.core.call(None, Command::CloseConnection);
        self.core.mark_closed();
        result.map(|_| ())
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "close on drop failed");
        }
    }
}
