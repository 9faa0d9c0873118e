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

//! The mirror itself: an in-memory SQLite engine holding one local table
//! per cache entry, plus the routing and refresh machinery around it.
//!
//! Refresh is all-or-nothing per table: delete every mirrored row,
//! re-read the table from the source, insert, commit as one unit. Any
//! failure drops the mirrored table and marks the entry unfilled; the
//! entry retries on the next eligible request or sweep tick.

use std::collections::HashMap;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, warn};

use relaydb_core::{ColumnDesc, ColumnKind, RowPacket, WireError, WireValue};

use crate::config::CacheRule;
use crate::error::{CacheError, Result};

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Full contents of one table as read from the real database.
pub struct TableSnapshot {
    pub columns: Vec<ColumnDesc>,
    pub rows: RowPacket,
}

/// Where mirrored data comes from. The client implements this over its
/// remote connection; tests implement it over a local database.
pub trait TableSource {
    /// Column metadata only, read at cache setup.
    fn table_columns(&self, table: &str) -> std::result::Result<Vec<ColumnDesc>, WireError>;

    /// Full table contents, read at fill/refresh time.
    fn read_table(&self, table: &str) -> std::result::Result<TableSnapshot, WireError>;
}

struct CacheEntry {
    rule: CacheRule,
    columns: Vec<ColumnDesc>,
    create_sql: String,
    insert_sql: String,
    delete_sql: String,
    filled: bool,
    last_refresh_ms: Option<u64>,
    /// Set on every fill attempt, success or not; a previously attempted
    /// unfilled entry is retried by the sweep.
    attempted: bool,
}

impl CacheEntry {
    fn stale(&self, now_ms: u64) -> bool {
        match (self.filled, self.rule.refresh_ms, self.last_refresh_ms) {
            (true, Some(interval), Some(last)) => now_ms.saturating_sub(last) >= interval,
            _ => false,
        }
    }
}

pub struct MirrorCache {
    db: Mutex<Connection>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MirrorCache {
    /// Register one unfilled entry per rule, reading column metadata from
    /// the source to generate the mirror statements up front.
    pub fn new(rules: Vec<CacheRule>, source: &dyn TableSource) -> Result<Self> {
        let db = Connection::open_in_memory()?;
        let mut entries = HashMap::new();
        for rule in rules {
            let columns = source
                .table_columns(&rule.table)
                .map_err(CacheError::Source)?;
            let entry = CacheEntry {
                create_sql: create_statement(&rule.table, &columns),
                insert_sql: insert_statement(&rule.table, &columns),
                delete_sql: format!("DELETE FROM {}", rule.table),
                columns,
                filled: false,
                last_refresh_ms: None,
                attempted: false,
                rule,
            };
            db.execute_batch(&entry.create_sql)?;
            entries.insert(entry.rule.table.clone(), entry);
        }
        Ok(Self {
            db: Mutex::new(db),
            entries: Mutex::new(entries),
        })
    }

    pub fn is_filled(&self, table: &str) -> bool {
        self.entries
            .lock()
            .get(&table.to_ascii_lowercase())
            .is_some_and(|e| e.filled)
    }

    pub fn last_refresh_ms(&self, table: &str) -> Option<u64> {
        self.entries
            .lock()
            .get(&table.to_ascii_lowercase())
            .and_then(|e| e.last_refresh_ms)
    }

    /// Try to answer a query from the mirror. `None` means "not ours":
    /// unextractable SQL, an unregistered table, a failed fill, or a local
    /// execution error — the caller routes to the real database.
    pub fn try_route(
        &self,
        sql: &str,
        source: &dyn TableSource,
    ) -> Option<(Vec<ColumnDesc>, RowPacket)> {
        let tables = crate::extract::extract_table_names(sql);
        if tables.is_empty() {
            return None;
        }
        {
            let entries = self.entries.lock();
            if !tables.iter().all(|t| entries.contains_key(t)) {
                return None;
            }
        }
        for table in &tables {
            if !self.is_filled(table) {
                if let Err(err) = self.refresh(table, source) {
                    warn!(table, error = %err, "cache fill failed, routing to real database");
                    return None;
                }
            }
        }
        match self.execute_local(sql) {
            Ok(result) => {
                debug!(sql, "served from mirror");
                Some(result)
            }
            Err(err) => {
                warn!(sql, error = %err, "mirror execution failed, routing to real database");
                None
            }
        }
    }

    /// Replace the mirrored contents of one table as a single unit. On
    /// failure the mirrored table is dropped and the entry marked
    /// unfilled; the error propagates to the caller that triggered it.
    pub fn refresh(&self, table: &str, source: &dyn TableSource) -> Result<()> {
        let key = table.to_ascii_lowercase();
        let (create_sql, insert_sql, delete_sql, table_name) = {
            let mut entries = self.entries.lock();
            let entry = entries
                .get_mut(&key)
                .ok_or_else(|| CacheError::UnknownTable(key.clone()))?;
            entry.attempted = true;
            (
                entry.create_sql.clone(),
                entry.insert_sql.clone(),
                entry.delete_sql.clone(),
                entry.rule.table.clone(),
            )
        };

        let outcome = self.fill(&table_name, &create_sql, &insert_sql, &delete_sql, source);
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&key)
            .ok_or_else(|| CacheError::UnknownTable(key.clone()))?;
        match outcome {
            Ok(()) => {
                entry.filled = true;
                entry.last_refresh_ms = Some(now_millis());
                debug!(table = %table_name, "mirror refreshed");
                Ok(())
            }
            Err(err) => {
                entry.filled = false;
                let db = self.db.lock();
                let _ = db.execute_batch(&format!("DROP TABLE IF EXISTS {table_name}"));
                Err(err)
            }
        }
    }

    /// Refresh every stale entry and retry previously failed ones,
    /// swallowing (logging) individual failures.
    pub fn sweep(&self, source: &dyn TableSource) {
        let now = now_millis();
        let due: Vec<String> = {
            let entries = self.entries.lock();
            entries
                .values()
                .filter(|e| e.stale(now) || (!e.filled && e.attempted))
                .map(|e| e.rule.table.clone())
                .collect()
        };
        for table in due {
            if let Err(err) = self.refresh(&table, source) {
                warn!(table, error = %err, "sweep refresh failed, will retry");
            }
        }
    }

    fn fill(
        &self,
        table: &str,
        create_sql: &str,
        insert_sql: &str,
        delete_sql: &str,
        source: &dyn TableSource,
    ) -> Result<()> {
        let snapshot = source.read_table(table).map_err(CacheError::Source)?;
        let mut db = self.db.lock();
        let tx = db.transaction()?;
        tx.execute_batch(create_sql)?;
        tx.execute(delete_sql, [])?;
        {
            let mut stmt = tx.prepare(insert_sql)?;
            for row in 0..snapshot.rows.row_count() {
                let params: Vec<rusqlite::types::Value> = snapshot
                    .rows
                    .row(row)
                    .into_iter()
                    .map(to_sqlite)
                    .collect();
                stmt.execute(rusqlite::params_from_iter(params))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn execute_local(&self, sql: &str) -> Result<(Vec<ColumnDesc>, RowPacket)> {
        let db = self.db.lock();
        let mut stmt = db.prepare(sql)?;
        let columns: Vec<ColumnDesc> = stmt
            .columns()
            .iter()
            .map(|c| ColumnDesc::new(c.name(), c.decl_type().map(str::to_string)))
            .collect();
        let kinds: Vec<ColumnKind> = columns.iter().map(|c| c.kind).collect();
        let mut packet = RowPacket::new(&kinds, 64);
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for col in 0..columns.len() {
                values.push(read_value(row, col)?);
            }
            packet.push_row(values)?;
        }
        Ok((columns, packet))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_statement(table: &str, columns: &[ColumnDesc]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| {
            let decl = c.decl_type.as_deref().unwrap_or("");
            format!("{} {decl}", quote_ident(&c.name))
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} ({})",
        cols.join(", ")
    )
}

fn insert_statement(table: &str, columns: &[ColumnDesc]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    let marks: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.join(", "),
        marks.join(", ")
    )
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

fn read_value(row: &rusqlite::Row<'_>, col: usize) -> Result<WireValue> {
    use rusqlite::types::ValueRef;
    Ok(match row.get_ref(col)? {
        ValueRef::Null => WireValue::Null,
        ValueRef::Integer(v) => WireValue::I64(v),
        ValueRef::Real(v) => WireValue::F64(v),
        ValueRef::Text(v) => WireValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => WireValue::Bytes(v.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_cache_config;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// TableSource over a local SQLite file, standing in for the remote
    /// connection, counting reads so tests can assert hit/miss behavior.
    struct LocalSource {
        db: Mutex<Connection>,
        reads: AtomicUsize,
    }

    impl LocalSource {
        fn new() -> Self {
            let db = Connection::open_in_memory().unwrap();
            db.execute_batch(
                "CREATE TABLE address (id INTEGER PRIMARY KEY, street TEXT, zip INTEGER);
                 INSERT INTO address (street, zip) VALUES ('Main St 1', 11111);
                 INSERT INTO address (street, zip) VALUES ('Oak Ave 2', 22222);
                 INSERT INTO address (street, zip) VALUES (NULL, 33333);
                 CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT);
                 INSERT INTO orders (item) VALUES ('widget');",
            )
            .unwrap();
            Self {
                db: Mutex::new(db),
                reads: AtomicUsize::new(0),
            }
        }

        fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl TableSource for LocalSource {
        fn table_columns(&self, table: &str) -> std::result::Result<Vec<ColumnDesc>, WireError> {
            let db = self.db.lock();
            let stmt = db
                .prepare(&format!("SELECT * FROM {table}"))
                .map_err(|e| WireError::database(1, "ERROR", e.to_string()))?;
            Ok(stmt
                .columns()
                .iter()
                .map(|c| ColumnDesc::new(c.name(), c.decl_type().map(str::to_string)))
                .collect())
        }

        fn read_table(&self, table: &str) -> std::result::Result<TableSnapshot, WireError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let columns = self.table_columns(table)?;
            let kinds: Vec<ColumnKind> = columns.iter().map(|c| c.kind).collect();
            let db = self.db.lock();
            let mut stmt = db
                .prepare(&format!("SELECT * FROM {table}"))
                .map_err(|e| WireError::database(1, "ERROR", e.to_string()))?;
            let mut packet = RowPacket::new(&kinds, 16);
            let mut rows = stmt
                .query([])
                .map_err(|e| WireError::database(1, "ERROR", e.to_string()))?;
            while let Some(row) = rows
                .next()
                .map_err(|e| WireError::database(1, "ERROR", e.to_string()))?
            {
                let mut values = Vec::new();
                for col in 0..columns.len() {
                    values.push(read_value(row, col).unwrap());
                }
                packet.push_row(values).unwrap();
            }
            Ok(TableSnapshot {
                columns,
                rows: packet,
            })
        }
    }

    fn cache(source: &LocalSource, config: &str) -> MirrorCache {
        MirrorCache::new(parse_cache_config(config).unwrap(), source).unwrap()
    }

    #[test]
    fn test_first_query_fills_then_serves_from_mirror() {
        let source = LocalSource::new();
        let cache = cache(&source, "Address:5000");
        assert!(!cache.is_filled("address"));

        let (columns, rows) = cache
            .try_route("SELECT * FROM Address", &source)
            .expect("cacheable query must route to the mirror");
        assert_eq!(columns.len(), 3);
        assert_eq!(rows.row_count(), 3);
        assert_eq!(rows.value(2, 1), WireValue::Null);
        assert!(cache.is_filled("address"));
        assert_eq!(source.read_count(), 1);

        // Second identical query inside the interval: no source read.
        let (_, rows) = cache.try_route("SELECT * FROM Address", &source).unwrap();
        assert_eq!(rows.row_count(), 3);
        assert_eq!(source.read_count(), 1);
    }

    #[test]
    fn test_mirror_matches_source_results() {
        let source = LocalSource::new();
        let cache = cache(&source, "address");
        let sql = "SELECT street, zip FROM address WHERE zip > 11111 ORDER BY zip";

        let (_, mirrored) = cache.try_route(sql, &source).unwrap();
        assert_eq!(mirrored.row_count(), 2);
        assert_eq!(mirrored.value(0, 0), WireValue::Text("Oak Ave 2".into()));
        assert_eq!(mirrored.value(1, 0), WireValue::Null);
        assert_eq!(mirrored.value(1, 1), WireValue::I64(33333));
    }

    #[test]
    fn test_uncached_table_never_routed() {
        let source = LocalSource::new();
        let cache = cache(&source, "address");

        assert!(cache.try_route("SELECT * FROM orders", &source).is_none());
        // A join touching one uncached table disqualifies the whole query.
        assert!(cache
            .try_route(
                "SELECT * FROM address a JOIN orders o ON a.id = o.id",
                &source
            )
            .is_none());
        assert_eq!(source.read_count(), 0);
    }

    #[test]
    fn test_unextractable_sql_never_routed() {
        let source = LocalSource::new();
        let cache = cache(&source, "address");
        assert!(cache
            .try_route("SELECT count(*) FROM address", &source)
            .is_none());
        assert_eq!(source.read_count(), 0);
    }

    #[test]
    fn test_sweep_refreshes_stale_entries() {
        let source = LocalSource::new();
        let cache = cache(&source, "address:0");
        cache.try_route("SELECT * FROM address", &source).unwrap();
        assert_eq!(source.read_count(), 1);

        // Interval 0: immediately stale. New source rows appear after the
        // sweep, not before.
        source
            .db
            .lock()
            .execute("INSERT INTO address (street, zip) VALUES ('New Rd 4', 44444)", [])
            .unwrap();
        cache.sweep(&source);
        assert_eq!(source.read_count(), 2);

        let (_, rows) = cache.try_route("SELECT * FROM address", &source).unwrap();
        assert_eq!(rows.row_count(), 4);
    }

    #[test]
    fn test_load_once_entry_never_goes_stale() {
        let source = LocalSource::new();
        let cache = cache(&source, "address");
        cache.try_route("SELECT * FROM address", &source).unwrap();
        cache.sweep(&source);
        cache.sweep(&source);
        assert_eq!(source.read_count(), 1);
    }

    #[test]
    fn test_failed_fill_falls_through_and_retries() {
        struct FailingSource {
            inner: LocalSource,
            fail: std::sync::atomic::AtomicBool,
        }
        impl TableSource for FailingSource {
            fn table_columns(
                &self,
                table: &str,
            ) -> std::result::Result<Vec<ColumnDesc>, WireError> {
                self.inner.table_columns(table)
            }
            fn read_table(&self, table: &str) -> std::result::Result<TableSnapshot, WireError> {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(WireError::transport("source unavailable"));
                }
                self.inner.read_table(table)
            }
        }

        let source = FailingSource {
            inner: LocalSource::new(),
            fail: std::sync::atomic::AtomicBool::new(true),
        };
        let cache = MirrorCache::new(parse_cache_config("address").unwrap(), &source).unwrap();

        // Fill fails: the query falls through, the entry stays unfilled.
        assert!(cache.try_route("SELECT * FROM address", &source).is_none());
        assert!(!cache.is_filled("address"));

        // Source recovers: the next request fills and serves.
        source.fail.store(false, Ordering::SeqCst);
        let (_, rows) = cache.try_route("SELECT * FROM address", &source).unwrap();
        assert_eq!(rows.row_count(), 3);
        assert!(cache.is_filled("address"));
    }

    #[test]
    fn test_explicit_refresh_propagates_failure() {
        let source = LocalSource::new();
        let cache = cache(&source, "address");
        assert!(matches!(
            cache.refresh("nope", &source),
            Err(CacheError::UnknownTable(_))
        ));
        cache.refresh("address", &source).unwrap();
        assert!(cache.is_filled("address"));
    }
}
