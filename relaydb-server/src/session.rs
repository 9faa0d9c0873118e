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

//! Connection sessions
//!
//! One authenticated logical database connection: the live SQLite handle,
//! the registry of every resource opened under it, the resolved statement
//! policy, compression policy, batch-size and charset hints, and the
//! last-activity timestamp the orphan supervisor reads.
//!
//! Teardown is explicit and idempotent: `force_close` closes every owned
//! entry (failures logged, not propagated) whether triggered by a client
//! close, connection teardown, or orphan reclamation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use tracing::{info, warn};

use relaydb_core::{CompressionPolicy, Handle, HandleIdGenerator, WireError};

use crate::registry::HandleRegistry;

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Statement allowlist + textual rewrite, resolved once per session from
/// the database's server-side configuration.
#[derive(Debug, Clone, Default)]
pub struct StatementPolicy {
    /// Uppercase statement prefixes; `None` allows everything.
    pub allow_prefixes: Option<Vec<String>>,
    /// (from, to) prefix rewrites, applied before execution.
    pub rewrites: Vec<(String, String)>,
}

impl StatementPolicy {
    /// Apply the policy: rewrite first, then gate on the allowlist.
    pub fn apply(&self, sql: &str) -> Result<String, WireError> {
        let mut sql = sql.trim().to_string();
        for (from, to) in &self.rewrites {
            if sql.to_ascii_uppercase().starts_with(&from.to_ascii_uppercase()) {
                sql = format!("{}{}", to, &sql[from.len()..]);
            }
        }
        if let Some(prefixes) = &self.allow_prefixes {
            let upper = sql.to_ascii_uppercase();
            if !prefixes
                .iter()
                .any(|p| upper.starts_with(&p.to_ascii_uppercase()))
            {
                return Err(WireError::protocol(format!(
                    "statement rejected by policy: {}",
                    sql.chars().take(40).collect::<String>()
                )));
            }
        }
        Ok(sql)
    }
}

/// One logical database session and everything opened under it.
pub struct ConnectionSession {
    handle: Handle,
    db: Mutex<Connection>,
    db_path: PathBuf,
    registry: HandleRegistry,
    policy: StatementPolicy,
    compression: CompressionPolicy,
    batch_size: usize,
    charset: String,
    read_only: bool,
    last_activity: AtomicU64,
    closed: AtomicBool,
}

impl ConnectionSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        handle: Handle,
        db: Connection,
        db_path: PathBuf,
        ids: Arc<HandleIdGenerator>,
        policy: StatementPolicy,
        compression: CompressionPolicy,
        batch_size: usize,
        charset: String,
        read_only: bool,
    ) -> Self {
        Self {
            handle,
            db: Mutex::new(db),
            db_path,
            registry: HandleRegistry::new(ids),
            policy,
            compression,
            batch_size,
            charset,
            read_only,
            last_activity: AtomicU64::new(now_millis()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &StatementPolicy {
        &self.policy
    }

    pub fn compression(&self) -> CompressionPolicy {
        self.compression
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Lock the live connection. One request is processed start-to-finish
    /// by one worker; this lock serializes the supervisor racing it.
    pub fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock()
    }

    /// Record activity for the orphan supervisor.
    pub fn touch(&self) {
        self.last_activity.store(now_millis(), Ordering::Release);
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Idempotent teardown: close every owned entry, logging failures.
    pub fn force_close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let failures = self.registry.close_all();
        for (id, err) in &failures {
            warn!(id, %err, "failed to close resource during session teardown");
        }
        info!(
            conn = self.handle.id,
            failures = failures.len(),
            "session closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_allows_by_prefix() {
        let policy = StatementPolicy {
            allow_prefixes: Some(vec!["SELECT".into(), "INSERT".into()]),
            rewrites: vec![],
        };
        assert!(policy.apply("select * from t").is_ok());
        assert!(policy.apply("  INSERT INTO t VALUES (1)").is_ok());
        let err = policy.apply("DROP TABLE t").unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_policy_rewrites_prefix() {
        let policy = StatementPolicy {
            allow_prefixes: None,
            rewrites: vec![("SELECT * FROM legacy".into(), "SELECT * FROM current".into())],
        };
        let sql = policy.apply("SELECT * FROM legacy WHERE id = 1").unwrap();
        assert_eq!(sql, "SELECT * FROM current WHERE id = 1");
    }

    #[test]
    fn test_empty_policy_passes_everything() {
        let policy = StatementPolicy::default();
        assert_eq!(policy.apply("  DROP TABLE t  ").unwrap(), "DROP TABLE t");
    }
}
