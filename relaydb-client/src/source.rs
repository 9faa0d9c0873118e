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

//! `TableSource` over the remote connection: feeds the mirror cache by
//! streaming whole tables through an ordinary server-side cursor.

use std::sync::Arc;

use relaydb_cache::{TableSnapshot, TableSource};
use relaydb_core::command::Command;
use relaydb_core::compress::unpack;
use relaydb_core::wire::CommandResult;
use relaydb_core::{ColumnDesc, ColumnKind, RowPacket, WireError};

use crate::connection::ClientCore;
use crate::error::ClientError;

pub(crate) struct RemoteSource {
    core: Arc<ClientCore>,
}

impl RemoteSource {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self { core }
    }

    fn open_table_cursor(
        &self,
        table: &str,
    ) -> std::result::Result<(relaydb_core::Handle, Vec<ColumnDesc>), WireError> {
        // Table names come from the validated cache config, never from
        // user SQL.
        match self.core.call(
            None,
            Command::ExecuteQuery {
                sql: format!("SELECT * FROM {table}"),
            },
        ) {
            Ok(CommandResult::Cursor { handle, columns }) => Ok((handle, columns)),
            Ok(_) => Err(WireError::transport("unexpected result for table read")),
            Err(err) => Err(to_wire(err)),
        }
    }

    fn close_cursor(&self, cursor: relaydb_core::Handle) {
        let _ = self.core.call(Some(cursor.id), Command::CloseTarget);
    }
}

impl TableSource for RemoteSource {
    fn table_columns(&self, table: &str) -> std::result::Result<Vec<ColumnDesc>, WireError> {
        let (cursor, columns) = self.open_table_cursor(table)?;
        self.close_cursor(cursor);
        Ok(columns)
    }

    fn read_table(&self, table: &str) -> std::result::Result<TableSnapshot, WireError> {
        let (cursor, columns) = self.open_table_cursor(table)?;
        let kinds: Vec<ColumnKind> = columns.iter().map(|c| c.kind).collect();
        let mut packet = RowPacket::new(&kinds, 64);
        let result = (|| loop {
            match self.core.call(Some(cursor.id), Command::NextBatch) {
                Ok(CommandResult::Batch(Some(compressed))) => {
                    let batch = unpack(&compressed)
                        .map_err(|e| WireError::transport(e.to_string()))?;
                    for row in 0..batch.row_count() {
                        packet
                            .push_row(batch.row(row))
                            .map_err(|e| WireError::transport(e.to_string()))?;
                    }
                }
                Ok(CommandResult::Batch(None)) => return Ok(()),
                Ok(_) => return Err(WireError::transport("unexpected result for table read")),
                Err(err) => return Err(to_wire(err)),
            }
        })();
        self.close_cursor(cursor);
        result.map(|()| TableSnapshot {
            columns,
            rows: packet,
        })
    }
}

fn to_wire(err: ClientError) -> WireError {
    match err {
        ClientError::Server(wire) => wire,
        other => WireError::transport(other.to_string()),
    }
}
