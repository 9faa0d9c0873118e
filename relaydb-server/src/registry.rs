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

//! Handle registry — maps opaque identifiers to live server resources
//!
//! One registry per connection session; a handle is only resolvable
//! through the session that created it. Identifiers come from the injected
//! process-wide generator and are never reused, so a stale handle after a
//! reconnect can never alias a different resource.
//!
//! `close_all` is best-effort total cleanup: it attempts every entry,
//! collects failures, and never aborts early.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use relaydb_core::{CallingContext, Handle, HandleIdGenerator};

use crate::error::{Result, ServerError};
use crate::streaming::CursorStream;

/// Tag describing what a registry entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Connection,
    Prepared,
    Cursor,
    Savepoint,
    Lob,
}

/// A live server-side resource owned by one session.
pub enum ServerResource {
    /// The connection itself; the session is the live resource.
    Connection,
    Prepared { sql: String },
    Cursor(CursorStream),
    Savepoint { name: String },
    Lob(Vec<u8>),
}

impl ServerResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ServerResource::Connection => ResourceKind::Connection,
            ServerResource::Prepared { .. } => ResourceKind::Prepared,
            ServerResource::Cursor(_) => ResourceKind::Cursor,
            ServerResource::Savepoint { .. } => ResourceKind::Savepoint,
            ServerResource::Lob(_) => ResourceKind::Lob,
        }
    }

    /// Release whatever the resource holds. Idempotent.
    pub fn close(&self) -> Result<()> {
        if let ServerResource::Cursor(stream) = self {
            stream.close();
        }
        Ok(())
    }
}

/// (handle, resource, owning context snapshot, kind tag).
///
/// The context snapshot exists purely so leaked resources can be traced
/// back to their call site.
pub struct RegistryEntry {
    pub handle: Handle,
    pub resource: ServerResource,
    pub kind: ResourceKind,
    pub ctx: CallingContext,
}

/// Connection-scoped handle table.
pub struct HandleRegistry {
    ids: Arc<HandleIdGenerator>,
    entries: Mutex<HashMap<u64, Arc<RegistryEntry>>>,
}

impl HandleRegistry {
    pub fn new(ids: Arc<HandleIdGenerator>) -> Self {
        Self {
            ids,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a resource under the next process-wide identifier.
    pub fn register(
        &self,
        resource: ServerResource,
        ctx: CallingContext,
        aux1: i64,
        aux2: i64,
    ) -> Handle {
        let handle = Handle::with_aux(self.ids.next_id(), aux1, aux2);
        let kind = resource.kind();
        let entry = Arc::new(RegistryEntry {
            handle,
            resource,
            kind,
            ctx,
        });
        self.entries.lock().insert(handle.id, entry);
        debug!(id = handle.id, ?kind, "registered resource");
        handle
    }

    /// Register a resource under an identifier minted elsewhere; used for
    /// the connection handle itself, which is allocated before the session
    /// (and its registry) exists.
    pub fn register_existing(&self, handle: Handle, resource: ServerResource, ctx: CallingContext) {
        let kind = resource.kind();
        let entry = Arc::new(RegistryEntry {
            handle,
            resource,
            kind,
            ctx,
        });
        self.entries.lock().insert(handle.id, entry);
        debug!(id = handle.id, ?kind, "registered resource");
    }

    pub fn lookup(&self, id: u64) -> Option<Arc<RegistryEntry>> {
        self.entries.lock().get(&id).cloned()
    }

    /// Remove without closing; the caller decides what to do with the
    /// returned resource.
    pub fn remove(&self, id: u64) -> Option<Arc<RegistryEntry>> {
        self.entries.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().len() == 0
    }

    /// Attempt to close every entry, collecting failures without aborting
    /// (partial-failure semantics: best-effort total cleanup).
    pub fn close_all(&self) -> Vec<(u64, ServerError)> {
        let drained: Vec<Arc<RegistryEntry>> = {
            let mut entries = self.entries.lock();
            entries.drain().map(|(_, entry)| entry).collect()
        };
        let mut failures = Vec::new();
        for entry in drained {
            if let Err(err) = entry.resource.close() {
                failures.push((entry.handle.id, err));
            }
        }
        failures
    }
}
