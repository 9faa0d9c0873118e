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

//! Table mirror cache
//!
//! Serves a bounded subset of read-only queries without contacting the
//! server, from a continuously refreshed local mirror held in an
//! in-memory SQLite engine.
//!
//! Routing is a textual heuristic, not a SQL parser, with a strict
//! false-negative bias: a query the extractor cannot classify with
//! certainty always goes to the real database. A miss costs a round
//! trip; a wrong hit would return wrong data, so wrong hits are designed
//! out (see [`extract::extract_table_names`]).
//!
//! A cache failure never surfaces as a distinct error to the query path:
//! it silently becomes a non-cached execution. Only an explicit refresh
//! propagates its failure to the caller that triggered it.

pub mod config;
pub mod error;
pub mod extract;
pub mod mirror;
pub mod sweep;

pub use config::{parse_cache_config, CacheRule};
pub use error::{CacheError, Result};
pub use extract::extract_table_names;
pub use mirror::{MirrorCache, TableSnapshot, TableSource};
pub use sweep::CacheSweeper;
