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

//! Command dispatch engine
//!
//! Executes an incoming `(connection-id, target-id, command, context)`
//! tuple against the owning session's registry and returns a result or a
//! transportable error.
//!
//! - `connect` resolves the database name against server configuration,
//!   opens the real connection, wraps it in a session, registers the
//!   connection itself as a handle, and returns that handle.
//! - `process` resolves the session (failing with "connection already
//!   closed" if absent), resolves the target resource (the connection
//!   itself when no target is given), and executes. Any result that is a
//!   new open resource is registered and returned as a handle, never by
//!   value.
//! - All failures funnel through [`to_wire`] before leaving the engine.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use relaydb_core::command::{Command, GenericOp, InterfaceKind, ParamValue};
use relaydb_core::wire::CommandResult;
use relaydb_core::{CallingContext, Handle, HandleIdGenerator, WireError, WireValue};

use crate::config::ServerConfig;
use crate::error::{to_wire, Result, ServerError};
use crate::registry::{RegistryEntry, ServerResource};
use crate::session::{ConnectionSession, StatementPolicy};
use crate::streaming::CursorStream;

/// Result-set type flag smuggled in a cursor handle's first auxiliary
/// slot: RelayDB cursors are always forward-only.
const CURSOR_FORWARD_ONLY: i64 = 1;

/// How long a connection waits out a competing lock before reporting
/// SQLITE_BUSY.
pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn closed_error() -> WireError {
    WireError::protocol("connection already closed")
}

pub struct DispatchEngine {
    sessions: DashMap<u64, Arc<ConnectionSession>>,
    ids: Arc<HandleIdGenerator>,
    config: Arc<ServerConfig>,
}

impl DispatchEngine {
    pub fn new(config: Arc<ServerConfig>, ids: Arc<HandleIdGenerator>) -> Self {
        Self {
            sessions: DashMap::new(),
            ids,
            config,
        }
    }

    /// Open a new connection session and return its handle. The handle's
    /// auxiliary slots carry the effective batch size.
    pub fn connect(
        &self,
        database: &str,
        properties: &std::collections::BTreeMap<String, String>,
        client_info: &std::collections::BTreeMap<String, String>,
        ctx: CallingContext,
    ) -> std::result::Result<Handle, WireError> {
        let db_config = self
            .config
            .databases
            .get(database)
            .ok_or_else(|| WireError::protocol(format!("unknown database: {database}")))?;

        let flags = if db_config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::default()
        };
        let conn = Connection::open_with_flags(&db_config.path, flags)
            .map_err(|e| to_wire(ServerError::Sqlite(e)))?;
        if !db_config.read_only {
            // WAL lets streaming cursors hold their read transactions
            // open without blocking this connection's commits.
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| to_wire(ServerError::Sqlite(e)))?;
        }
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| to_wire(ServerError::Sqlite(e)))?;

        let defaults = &self.config.defaults;
        let batch_size = properties
            .get("batch.size")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.batch_size);
        let charset = properties
            .get("charset")
            .cloned()
            .unwrap_or_else(|| defaults.charset.clone());
        let policy = StatementPolicy {
            allow_prefixes: db_config.allow_prefixes.clone(),
            rewrites: db_config
                .rewrites
                .iter()
                .map(|r| (r.from.clone(), r.to.clone()))
                .collect(),
        };

        let handle = Handle::with_aux(self.ids.next_id(), batch_size as i64, 0);
        let session = Arc::new(ConnectionSession::new(
            handle,
            conn,
            db_config.path.clone(),
            Arc::clone(&self.ids),
            policy,
            defaults.compression_policy(),
            batch_size,
            charset,
            db_config.read_only,
        ));
        session
            .registry()
            .register_existing(handle, ServerResource::Connection, ctx.clone());
        self.sessions.insert(handle.id, session);
        info!(
            conn = handle.id,
            database,
            client = %ctx.client,
            info = client_info.len(),
            "connection opened"
        );
        Ok(handle)
    }

    /// Execute one command. Fails with a protocol error when the session
    /// is gone — stale client state, not a database fault.
    pub fn process(
        &self,
        conn_id: u64,
        target_id: Option<u64>,
        command: Command,
        ctx: CallingContext,
    ) -> std::result::Result<CommandResult, WireError> {
        command.validate().map_err(WireError::from)?;
        let session = self
            .sessions
            .get(&conn_id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(closed_error)?;
        if session.is_closed() {
            return Err(closed_error());
        }
        session.touch();
        debug!(conn = conn_id, ?target_id, op = command.name(), "dispatch");
        self.execute(&session, target_id, command, ctx)
            .map_err(to_wire)
    }

    /// Tear down one session and everything it owns. Idempotent; safe to
    /// race an in-flight `process` call.
    pub fn close(&self, conn_id: u64) -> bool {
        match self.sessions.remove(&conn_id) {
            Some((_, session)) => {
                session.force_close();
                true
            }
            None => false,
        }
    }

    /// Close every session; used at server shutdown.
    pub fn close_all(&self) {
        let ids: Vec<u64> = self.sessions.iter().map(|s| *s.key()).collect();
        for id in ids {
            self.close(id);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot for the orphan supervisor's sweep.
    pub fn sessions_snapshot(&self) -> Vec<Arc<ConnectionSession>> {
        self.sessions.iter().map(|s| Arc::clone(s.value())).collect()
    }

    fn execute(
        &self,
        session: &Arc<ConnectionSession>,
        target_id: Option<u64>,
        command: Command,
        ctx: CallingContext,
    ) -> Result<CommandResult> {
        match command {
            Command::Ping => Ok(CommandResult::Unit),

            Command::ExecuteUpdate { sql } => {
                let sql = session.policy().apply(&sql)?;
                let count = session.db().execute(&sql, [])?;
                Ok(CommandResult::UpdateCount(count as u64))
            }

            Command::ExecuteQuery { sql } => {
                let sql = session.policy().apply(&sql)?;
                self.open_cursor(session, sql, vec![], ctx)
            }

            Command::Prepare { sql } => {
                let sql = session.policy().apply(&sql)?;
                // Prepare eagerly so syntax errors surface here, not at
                // first execution.
                session.db().prepare(&sql)?;
                let handle =
                    session
                        .registry()
                        .register(ServerResource::Prepared { sql }, ctx, 0, 0);
                Ok(CommandResult::Handle(handle))
            }

            Command::PreparedUpdate { params } => {
                let entry = self.target_entry(session, target_id)?;
                let ServerResource::Prepared { sql } = &entry.resource else {
                    return Err(not_a(&entry, "prepared statement"));
                };
                let values = self.resolve_params(session, params)?;
                let count = session
                    .db()
                    .execute(sql, rusqlite::params_from_iter(values))?;
                Ok(CommandResult::UpdateCount(count as u64))
            }

            Command::PreparedQuery { params } => {
                let entry = self.target_entry(session, target_id)?;
                let ServerResource::Prepared { sql } = &entry.resource else {
                    return Err(not_a(&entry, "prepared statement"));
                };
                let values = self.resolve_params(session, params)?;
                self.open_cursor(session, sql.clone(), values, ctx)
            }

            Command::NextBatch => {
                let entry = self.target_entry(session, target_id)?;
                let ServerResource::Cursor(stream) = &entry.resource else {
                    return Err(not_a(&entry, "cursor"));
                };
                Ok(CommandResult::Batch(stream.next_batch()?))
            }

            Command::CursorMetadata => {
                let entry = self.target_entry(session, target_id)?;
                let ServerResource::Cursor(stream) = &entry.resource else {
                    return Err(not_a(&entry, "cursor"));
                };
                Ok(CommandResult::Metadata(stream.metadata().to_vec()))
            }

            Command::Commit => {
                let db = session.db();
                if !db.is_autocommit() {
                    db.execute_batch("COMMIT; BEGIN")?;
                }
                Ok(CommandResult::Unit)
            }

            Command::Rollback => {
                let db = session.db();
                if !db.is_autocommit() {
                    db.execute_batch("ROLLBACK; BEGIN")?;
                }
                Ok(CommandResult::Unit)
            }

            Command::SetAutoCommit { on } => {
                let db = session.db();
                if on && !db.is_autocommit() {
                    db.execute_batch("COMMIT")?;
                } else if !on && db.is_autocommit() {
                    db.execute_batch("BEGIN")?;
                }
                Ok(CommandResult::Unit)
            }

            Command::CreateSavepoint { name } => {
                validate_identifier(&name)?;
                session
                    .db()
                    .execute_batch(&format!("SAVEPOINT {name}"))?;
                let handle = session.registry().register(
                    ServerResource::Savepoint { name },
                    ctx,
                    0,
                    0,
                );
                Ok(CommandResult::Handle(handle))
            }

            Command::ReleaseSavepoint => {
                let entry = self.target_entry(session, target_id)?;
                let ServerResource::Savepoint { name } = &entry.resource else {
                    return Err(not_a(&entry, "savepoint"));
                };
                session
                    .db()
                    .execute_batch(&format!("RELEASE SAVEPOINT {name}"))?;
                session.registry().remove(entry.handle.id);
                Ok(CommandResult::Unit)
            }

            Command::RollbackToSavepoint => {
                let entry = self.target_entry(session, target_id)?;
                let ServerResource::Savepoint { name } = &entry.resource else {
                    return Err(not_a(&entry, "savepoint"));
                };
                session
                    .db()
                    .execute_batch(&format!("ROLLBACK TO SAVEPOINT {name}"))?;
                Ok(CommandResult::Unit)
            }

            Command::CreateLob { data } => {
                let length = data.len() as u64;
                let handle =
                    session
                        .registry()
                        .register(ServerResource::Lob(data), ctx, 0, length as i64);
                Ok(CommandResult::Lob { handle, length })
            }

            Command::LobRead { offset, len } => {
                let entry = self.target_entry(session, target_id)?;
                let ServerResource::Lob(data) = &entry.resource else {
                    return Err(not_a(&entry, "lob"));
                };
                let start = (offset as usize).min(data.len());
                let end = start.saturating_add(len as usize).min(data.len());
                Ok(CommandResult::Value(WireValue::Bytes(
                    data[start..end].to_vec(),
                )))
            }

            Command::LobLength => {
                let entry = self.target_entry(session, target_id)?;
                let ServerResource::Lob(data) = &entry.resource else {
                    return Err(not_a(&entry, "lob"));
                };
                Ok(CommandResult::Value(WireValue::I64(data.len() as i64)))
            }

            Command::CloseTarget => {
                let id = target_id
                    .ok_or_else(|| WireError::protocol("close requires a target handle"))?;
                let entry = session
                    .registry()
                    .remove(id)
                    .ok_or_else(|| WireError::protocol(format!("unknown handle: {id}")))?;
                entry.resource.close()?;
                Ok(CommandResult::Unit)
            }

            Command::CloseConnection => {
                self.close(session.handle().id);
                Ok(CommandResult::Unit)
            }

            Command::Call { iface, op, args: _ } => self.generic_call(session, target_id, iface, op),
        }
    }

    /// The closed generic-dispatch table. `Command::validate` has already
    /// rejected unknown pairs at decode time; this match is the typed
    /// handler side of the same table.
    fn generic_call(
        &self,
        session: &Arc<ConnectionSession>,
        target_id: Option<u64>,
        iface: InterfaceKind,
        op: GenericOp,
    ) -> Result<CommandResult> {
        let value = match (iface, op) {
            (InterfaceKind::Connection, GenericOp::GetAutoCommit) => {
                WireValue::Bool(session.db().is_autocommit())
            }
            (InterfaceKind::Connection, GenericOp::IsReadOnly) => {
                WireValue::Bool(session.read_only())
            }
            (InterfaceKind::Connection, GenericOp::LastInsertRowId) => {
                WireValue::I64(session.db().last_insert_rowid())
            }
            (InterfaceKind::Connection, GenericOp::ChangeCount) => {
                WireValue::I64(session.db().changes() as i64)
            }
            (InterfaceKind::Cursor, GenericOp::RowCountSoFar) => {
                let entry = self.target_entry(session, target_id)?;
                let ServerResource::Cursor(stream) = &entry.resource else {
                    return Err(not_a(&entry, "cursor"));
                };
                WireValue::I64(stream.rows_delivered() as i64)
            }
            (iface, op) => {
                return Err(ServerError::Wire(WireError::protocol(format!(
                    "unresolvable generic call: {iface:?}/{op:?}"
                ))))
            }
        };
        Ok(CommandResult::Value(value))
    }

    fn open_cursor(
        &self,
        session: &Arc<ConnectionSession>,
        sql: String,
        params: Vec<rusqlite::types::Value>,
        ctx: CallingContext,
    ) -> Result<CommandResult> {
        let stream = CursorStream::open(
            session.db_path().clone(),
            sql,
            params,
            session.batch_size(),
            session.compression(),
        )?;
        let columns = stream.metadata().to_vec();
        let handle = session.registry().register(
            ServerResource::Cursor(stream),
            ctx,
            CURSOR_FORWARD_ONLY,
            session.batch_size() as i64,
        );
        Ok(CommandResult::Cursor { handle, columns })
    }

    fn target_entry(
        &self,
        session: &Arc<ConnectionSession>,
        target_id: Option<u64>,
    ) -> Result<Arc<RegistryEntry>> {
        let id = target_id
            .ok_or_else(|| WireError::protocol("command requires a target handle"))?;
        session
            .registry()
            .lookup(id)
            .ok_or_else(|| ServerError::Wire(WireError::protocol(format!("unknown handle: {id}"))))
    }

    fn resolve_params(
        &self,
        session: &Arc<ConnectionSession>,
        params: Vec<ParamValue>,
    ) -> Result<Vec<rusqlite::types::Value>> {
        params
            .into_iter()
            .map(|p| match p {
                ParamValue::Value(value) => Ok(to_sqlite(value)),
                ParamValue::Lob(id) => {
                    let entry = session.registry().lookup(id).ok_or_else(|| {
                        ServerError::Wire(WireError::protocol(format!("unknown lob handle: {id}")))
                    })?;
                    let ServerResource::Lob(data) = &entry.resource else {
                        return Err(not_a(&entry, "lob"));
                    };
                    Ok(rusqlite::types::Value::Blob(data.clone()))
                }
            })
            .collect()
    }
}

fn to_sqlite(value: WireValue) -> rusqlite::types::Value {
    match value {
        WireValue::Null => rusqlite::types::Value::Null,
        WireValue::Bool(v) => rusqlite::types::Value::Integer(v as i64),
        WireValue::I64(v) => rusqlite::types::Value::Integer(v),
        WireValue::F64(v) => rusqlite::types::Value::Real(v),
        WireValue::Text(v) => rusqlite::types::Value::Text(v),
        WireValue::Bytes(v) => rusqlite::types::Value::Blob(v),
    }
}

fn not_a(entry: &RegistryEntry, expected: &str) -> ServerError {
    ServerError::Wire(WireError::protocol(format!(
        "handle {} is a {:?}, not a {expected}",
        entry.handle.id, entry.kind
    )))
}

fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(ServerError::Wire(WireError::protocol(format!(
            "invalid savepoint name: {name}"
        ))))
    }
}
