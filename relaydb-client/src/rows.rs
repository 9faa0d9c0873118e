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

//! Streamed query results.
//!
//! A remote result pulls one compressed batch at a time; while the
//! client iterates a batch, the server's producer is already prefetching
//! the next one. A cached result was materialized from the mirror in one
//! piece and never touches the wire.

use std::sync::Arc;

use tracing::debug;

use relaydb_core::command::Command;
use relaydb_core::compress::unpack;
use relaydb_core::wire::CommandResult;
use relaydb_core::{ColumnDesc, Handle, RowPacket, WireValue};

use crate::connection::ClientCore;
use crate::error::{ClientError, Result};

pub struct QueryRows {
    columns: Vec<ColumnDesc>,
    inner: RowsInner,
}

enum RowsInner {
    Cached {
        packet: RowPacket,
        pos: usize,
    },
    Remote {
        core: Arc<ClientCore>,
        cursor: Handle,
        packet: Option<RowPacket>,
        pos: usize,
        exhausted: bool,
        closed: bool,
    },
}

impl QueryRows {
    pub(crate) fn cached(columns: Vec<ColumnDesc>, packet: RowPacket) -> Self {
        Self {
            columns,
            inner: RowsInner::Cached { packet, pos: 0 },
        }
    }

    pub(crate) fn remote(core: Arc<ClientCore>, cursor: Handle, columns: Vec<ColumnDesc>) -> Self {
        Self {
            columns,
            inner: RowsInner::Remote {
                core,
                cursor,
                packet: None,
                pos: 0,
                exhausted: false,
                closed: false,
            },
        }
    }

    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    /// True when this result was served from the mirror cache.
    pub fn from_cache(&self) -> bool {
        matches!(self.inner, RowsInner::Cached { .. })
    }

    /// Next row, or `None` once the result is exhausted.
    pub fn next_row(&mut self) -> Result<Option<Vec<WireValue>>> {
        match &mut self.inner {
            RowsInner::Cached { packet, pos } => {
                if *pos < packet.row_count() {
                    let row = packet.row(*pos);
                    *pos += 1;
                    Ok(Some(row))
                } else {
                    Ok(None)
                }
            }
            RowsInner::Remote {
                core,
                cursor,
                packet,
                pos,
                exhausted,
                ..
            } => loop {
                if let Some(current) = packet {
                    if *pos < current.row_count() {
                        let row = current.row(*pos);
                        *pos += 1;
                        return Ok(Some(row));
                    }
                }
                if *exhausted {
                    return Ok(None);
                }
                match core.call(Some(cursor.id), Command::NextBatch)? {
                    CommandResult::Batch(Some(compressed)) => {
                        *packet = Some(unpack(&compressed)?);
                        *pos = 0;
                    }
                    CommandResult::Batch(None) => {
                        *exhausted = true;
                    }
                    _ => return Err(ClientError::UnexpectedResponse("batch")),
                }
            },
        }
    }

    /// Collect every remaining row.
    pub fn collect_rows(&mut self) -> Result<Vec<Vec<WireValue>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Release the server-side cursor. Idempotent; a no-op for cached
    /// results.
    pub fn close(&mut self) -> Result<()> {
        if let RowsInner::Remote {
            core,
            cursor,
            closed,
            ..
        } = &mut self.inner
        {
            if !*closed {
                *closed = true;
                core.call(Some(cursor.id), Command::CloseTarget)?;
            }
        }
        Ok(())
    }
}

impl Drop for QueryRows {
    fn drop(&mut self) {
        if let RowsInner::Remote {
            core,
            cursor,
            closed,
            ..
        } = &mut self.inner
        {
            if !*closed && !core.is_closed() {
                *closed = true;
                if core.call(Some(cursor.id), Command::CloseTarget).is_err() {
                    debug!(cursor = cursor.id, "cursor close on drop failed");
                }
            }
        }
    }
}
