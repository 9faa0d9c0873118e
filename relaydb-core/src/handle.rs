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

//! Handles — opaque identifiers for server-side resources
//!
//! A [`Handle`] is a process-wide-unique `u64` (monotonic, assigned by the
//! server) plus two auxiliary integers that smuggle small metadata (a
//! result-set type flag, a fetch-size hint) alongside the identifier
//! without a second round trip. Two handles are equal iff their
//! identifiers are equal; auxiliary values are never compared.
//!
//! Identifiers come from a [`HandleIdGenerator`] owned by the server's
//! composition root and passed by reference to whatever needs it. Ids are
//! never reused, even after removal, so a stale handle presented after a
//! reconnect can never resolve to a different resource.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier for a server-side resource, valid only within its
/// owning connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Handle {
    pub id: u64,
    /// First auxiliary slot (e.g. result-set type flag).
    pub aux1: i64,
    /// Second auxiliary slot (e.g. fetch-size hint).
    pub aux2: i64,
}

impl Handle {
    pub fn new(id: u64) -> Self {
        Self { id, aux1: 0, aux2: 0 }
    }

    pub fn with_aux(id: u64, aux1: i64, aux2: i64) -> Self {
        Self { id, aux1, aux2 }
    }
}

// Equality and hashing consider only the identifier: the auxiliary slots
// are hints, not identity.
impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Monotonic identifier source, explicitly constructed and injected —
/// no ambient global state.
#[derive(Debug)]
pub struct HandleIdGenerator {
    next: AtomicU64,
}

impl HandleIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Hand out the next identifier. Never reused within a process
    /// lifetime, even across register/remove/register cycles.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for HandleIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(h: &Handle) -> u64 {
        let mut hasher = DefaultHasher::new();
        h.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equality_ignores_aux() {
        let a = Handle::with_aux(7, 1, 100);
        let b = Handle::with_aux(7, 2, 500);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_different_ids_not_equal() {
        assert_ne!(Handle::new(1), Handle::new(2));
    }

    #[test]
    fn test_generator_strictly_increasing() {
        let gen = HandleIdGenerator::new();
        let mut prev = gen.next_id();
        for _ in 0..1000 {
            let next = gen.next_id();
            assert!(next > prev);
            prev = next;
        }
    }
}
