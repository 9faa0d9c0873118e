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

//! Result streaming engine
//!
//! Turns an open, potentially unbounded query result into a sequence of
//! serialized batches with background prefetch.
//!
//! # State machine (per cursor)
//!
//! ```text
//! Primed ──next_batch──► Streaming ──end-of-rows──► Exhausted
//!    │                       │                          │
//!    └───────close───────────┴──────────close───────────┴──► Closed
//! ```
//!
//! One producer thread per open cursor owns a dedicated read-only database
//! connection, its statement, and the live row iterator in a single stack
//! frame. It fills a batch of `batch_size` rows, serializes and compresses
//! it per the session policy, and pushes it into a bounded single-slot
//! channel — so the next batch is being fetched from the database while
//! the previous one is in flight to the client.
//!
//! Batch 0 is fetched synchronously at open time. A producer-side error is
//! captured and re-raised to the *next* `next_batch` caller, never
//! discarded. On close the producer observes the cancel flag or the
//! disconnected channel and exits without producing further batches.
//!
//! Streamed cursors read through their own read-only connection, so a
//! streamed query does not observe the owning session's uncommitted
//! writes. The backing database runs in WAL mode, so the cursor's open
//! read transaction never blocks the session's own commits either.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use relaydb_core::compress::{self, CompressedPacket, CompressionPolicy};
use relaydb_core::packet::RowPacket;
use relaydb_core::value::{ColumnDesc, ColumnKind, WireValue};
use relaydb_core::WireError;

use crate::error::{to_wire, Result, ServerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Primed,
    Streaming,
    Exhausted,
    Closed,
}

enum ProducerMsg {
    Columns(Vec<ColumnDesc>),
    Batch(CompressedPacket, usize),
    End,
    Fail(WireError),
}

struct CursorInner {
    state: CursorState,
    /// Batch 0, fetched synchronously at open, handed out by the first
    /// `next_batch`.
    primed: Option<(CompressedPacket, usize)>,
    /// Error captured from the producer while priming; re-raised to the
    /// next `next_batch` caller.
    pending_error: Option<WireError>,
    rx: Option<Receiver<ProducerMsg>>,
    join: Option<JoinHandle<()>>,
}

/// One open streaming cursor.
pub struct CursorStream {
    columns: Vec<ColumnDesc>,
    inner: Mutex<CursorInner>,
    cancel: Arc<AtomicBool>,
    delivered: AtomicU64,
}

impl CursorStream {
    /// Run `sql` against the database at `db_path` and prime batch 0.
    pub fn open(
        db_path: PathBuf,
        sql: String,
        params: Vec<rusqlite::types::Value>,
        batch_size: usize,
        policy: CompressionPolicy,
    ) -> Result<Self> {
        let (tx, rx) = bounded(1);
        let cancel = Arc::new(AtomicBool::new(false));
        let producer_cancel = Arc::clone(&cancel);
        let join = std::thread::Builder::new()
            .name("relay-cursor".into())
            .spawn(move || {
                produce(tx, producer_cancel, db_path, sql, params, batch_size, policy)
            })?;

        // Column metadata always arrives before the first batch.
        let columns = match rx.recv() {
            Ok(ProducerMsg::Columns(cols)) => cols,
            Ok(ProducerMsg::Fail(err)) => {
                let _ = join.join();
                return Err(ServerError::Wire(err));
            }
            _ => {
                let _ = join.join();
                return Err(ServerError::Wire(WireError::transport(
                    "cursor producer exited before reporting metadata",
                )));
            }
        };

        // Fetch batch 0 synchronously.
        let primed_msg = rx.recv();
        let mut inner = CursorInner {
            state: CursorState::Primed,
            primed: None,
            pending_error: None,
            rx: Some(rx),
            join: Some(join),
        };
        match primed_msg {
            Ok(ProducerMsg::Batch(batch, rows)) => inner.primed = Some((batch, rows)),
            Ok(ProducerMsg::End) => inner.state = CursorState::Exhausted,
            Ok(ProducerMsg::Fail(err)) => inner.pending_error = Some(err),
            Ok(ProducerMsg::Columns(_)) | Err(_) => {
                inner.pending_error = Some(WireError::transport(
                    "cursor producer exited before the first batch",
                ));
            }
        }

        Ok(Self {
            columns,
            inner: Mutex::new(inner),
            cancel,
            delivered: AtomicU64::new(0),
        })
    }

    /// Column descriptors captured at open.
    pub fn metadata(&self) -> &[ColumnDesc] {
        &self.columns
    }

    /// Rows handed out so far; serves the generic `RowCountSoFar` call.
    pub fn rows_delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Return the prepared batch and leave the next prefetch in flight.
    /// `Ok(None)` is the exhausted signal.
    pub fn next_batch(&self) -> std::result::Result<Option<CompressedPacket>, WireError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CursorState::Closed => Err(WireError::protocol("cursor already closed")),
            CursorState::Exhausted => Ok(None),
            CursorState::Primed | CursorState::Streaming => {
                if let Some(err) = inner.pending_error.take() {
                    inner.state = CursorState::Exhausted;
                    return Err(err);
                }
                if let Some((batch, rows)) = inner.primed.take() {
                    inner.state = CursorState::Streaming;
                    self.delivered.fetch_add(rows as u64, Ordering::AcqRel);
                    return Ok(Some(batch));
                }
                let recv = match inner.rx.as_ref() {
                    Some(rx) => rx.recv(),
                    None => {
                        inner.state = CursorState::Exhausted;
                        return Ok(None);
                    }
                };
                match recv {
                    Ok(ProducerMsg::Batch(batch, rows)) => {
                        inner.state = CursorState::Streaming;
                        self.delivered.fetch_add(rows as u64, Ordering::AcqRel);
                        Ok(Some(batch))
                    }
                    Ok(ProducerMsg::End) => {
                        inner.state = CursorState::Exhausted;
                        Ok(None)
                    }
                    Ok(ProducerMsg::Fail(err)) => {
                        inner.state = CursorState::Exhausted;
                        Err(err)
                    }
                    Ok(ProducerMsg::Columns(_)) => {
                        inner.state = CursorState::Exhausted;
                        Err(WireError::transport("unexpected metadata mid-stream"))
                    }
                    // The producer died without an end-of-stream marker;
                    // a truncated result must not look exhausted.
                    Err(_) => {
                        inner.state = CursorState::Exhausted;
                        Err(WireError::transport(
                            "cursor producer terminated without an end-of-stream marker",
                        ))
                    }
                }
            }
        }
    }

    /// Idempotent close. Signals the producer, which exits before
    /// producing anything further.
    pub fn close(&self) {
        self.cancel.store(true, Ordering::Release);
        let (rx, join) = {
            let mut inner = self.inner.lock();
            if inner.state == CursorState::Closed {
                return;
            }
            inner.state = CursorState::Closed;
            inner.primed = None;
            inner.pending_error = None;
            (inner.rx.take(), inner.join.take())
        };
        // Dropping the receiver disconnects a producer blocked on send.
        drop(rx);
        if let Some(join) = join {
            if join.join().is_err() {
                warn!("cursor producer thread panicked during close");
            }
        }
    }
}

impl Drop for CursorStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Background fetch loop. Owns the read-only connection, statement, and
/// row iterator for the cursor's whole lifetime.
fn produce(
    tx: Sender<ProducerMsg>,
    cancel: Arc<AtomicBool>,
    db_path: PathBuf,
    sql: String,
    params: Vec<rusqlite::types::Value>,
    batch_size: usize,
    policy: CompressionPolicy,
) {
    let result = (|| -> Result<()> {
        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(crate::dispatch::BUSY_TIMEOUT)?;
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<ColumnDesc> = stmt
            .columns()
            .iter()
            .map(|c| ColumnDesc::new(c.name(), c.decl_type().map(str::to_owned)))
            .collect();
        let kinds: Vec<ColumnKind> = columns.iter().map(|c| c.kind).collect();
        let column_count = columns.len();
        if tx.send(ProducerMsg::Columns(columns)).is_err() {
            return Ok(());
        }

        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
        loop {
            if cancel.load(Ordering::Acquire) {
                debug!("cursor cancelled, producer exiting");
                return Ok(());
            }
            let mut packet = RowPacket::new(&kinds, batch_size);
            let mut at_end = false;
            while packet.row_count() < batch_size {
                match rows.next()? {
                    Some(row) => packet.push_row(read_row(row, column_count)?)?,
                    None => {
                        at_end = true;
                        break;
                    }
                }
            }
            if !packet.is_empty() {
                let row_count = packet.row_count();
                let compressed = compress::pack(&packet, policy)?;
                if tx.send(ProducerMsg::Batch(compressed, row_count)).is_err() {
                    // Consumer closed the cursor mid-fetch.
                    return Ok(());
                }
            }
            if at_end {
                let _ = tx.send(ProducerMsg::End);
                return Ok(());
            }
        }
    })();

    if let Err(err) = result {
        let _ = tx.send(ProducerMsg::Fail(to_wire(err)));
    }
}

fn read_row(row: &rusqlite::Row<'_>, column_count: usize) -> Result<Vec<WireValue>> {
    let mut values = Vec::with_capacity(column_count);
    for idx in 0..column_count {
        let value = match row.get_ref(idx)? {
            rusqlite::types::ValueRef::Null => WireValue::Null,
            rusqlite::types::ValueRef::Integer(v) => WireValue::I64(v),
            rusqlite::types::ValueRef::Real(v) => WireValue::F64(v),
            rusqlite::types::ValueRef::Text(v) => {
                WireValue::Text(String::from_utf8_lossy(v).into_owned())
            }
            rusqlite::types::ValueRef::Blob(v) => WireValue::Bytes(v.to_vec()),
        };
        values.push(value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaydb_core::compress::unpack;

    fn seeded_db(rows: usize) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT, score REAL)",
        )
        .unwrap();
        for i in 0..rows {
            conn.execute(
                "INSERT INTO items (id, label, score) VALUES (?1, ?2, ?3)",
                rusqlite::params![i as i64, format!("item-{i}"), i as f64 / 7.0],
            )
            .unwrap();
        }
        (dir, path)
    }

    fn drain(stream: &CursorStream) -> Vec<Vec<WireValue>> {
        let mut all = Vec::new();
        while let Some(batch) = stream.next_batch().unwrap() {
            let packet = unpack(&batch).unwrap();
            for row in 0..packet.row_count() {
                all.push(packet.row(row));
            }
        }
        all
    }

    #[test]
    fn test_batch_sizes_100_100_50_then_exhausted() {
        let (_dir, path) = seeded_db(250);
        let stream = CursorStream::open(
            path,
            "SELECT id, label, score FROM items ORDER BY id".into(),
            vec![],
            100,
            CompressionPolicy::default(),
        )
        .unwrap();

        let sizes: Vec<usize> = std::iter::from_fn(|| {
            stream
                .next_batch()
                .unwrap()
                .map(|b| unpack(&b).unwrap().row_count())
        })
        .collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        // Exhausted signal after the last non-empty batch.
        assert!(stream.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_concatenated_batches_equal_full_read() {
        let (_dir, path) = seeded_db(333);
        let sql = "SELECT id, label, score FROM items ORDER BY id";

        let stream = CursorStream::open(
            path.clone(),
            sql.into(),
            vec![],
            64,
            CompressionPolicy::default(),
        )
        .unwrap();
        let streamed = drain(&stream);

        let conn = Connection::open(&path).unwrap();
        let mut stmt = conn.prepare(sql).unwrap();
        let mut rows = stmt.query([]).unwrap();
        let mut full = Vec::new();
        while let Some(row) = rows.next().unwrap() {
            full.push(read_row(row, 3).unwrap());
        }
        assert_eq!(streamed, full);
    }

    #[test]
    fn test_empty_result_exhausts_immediately() {
        let (_dir, path) = seeded_db(0);
        let stream = CursorStream::open(
            path,
            "SELECT id FROM items".into(),
            vec![],
            10,
            CompressionPolicy::default(),
        )
        .unwrap();
        assert!(stream.next_batch().unwrap().is_none());
        assert!(stream.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_open_fails_on_bad_sql() {
        let (_dir, path) = seeded_db(1);
        let err = CursorStream::open(
            path,
            "SELECT nope FROM nowhere".into(),
            vec![],
            10,
            CompressionPolicy::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_close_mid_stream_is_clean() {
        let (_dir, path) = seeded_db(1000);
        let stream = CursorStream::open(
            path,
            "SELECT id, label, score FROM items".into(),
            vec![],
            10,
            CompressionPolicy::default(),
        )
        .unwrap();
        assert!(stream.next_batch().unwrap().is_some());
        stream.close();
        stream.close(); // idempotent
        assert!(stream.next_batch().is_err());
    }

    #[test]
    fn test_vanished_producer_is_an_error_not_exhaustion() {
        // A producer that dies without sending End or Fail leaves a
        // disconnected channel behind; the truncated stream must surface
        // as a transport error, never as a clean end-of-rows.
        let (tx, rx) = bounded::<ProducerMsg>(1);
        drop(tx);
        let stream = CursorStream {
            columns: vec![],
            inner: Mutex::new(CursorInner {
                state: CursorState::Streaming,
                primed: None,
                pending_error: None,
                rx: Some(rx),
                join: None,
            }),
            cancel: Arc::new(AtomicBool::new(false)),
            delivered: AtomicU64::new(0),
        };

        let err = stream.next_batch().unwrap_err();
        assert_eq!(err.kind, relaydb_core::WireErrorKind::Transport);
        assert!(err.message.contains("producer"));
    }

    #[test]
    fn test_rows_delivered_counter() {
        let (_dir, path) = seeded_db(25);
        let stream = CursorStream::open(
            path,
            "SELECT id FROM items".into(),
            vec![],
            10,
            CompressionPolicy::default(),
        )
        .unwrap();
        stream.next_batch().unwrap();
        assert_eq!(stream.rows_delivered(), 10);
        drain(&stream);
        assert_eq!(stream.rows_delivered(), 25);
    }
}
