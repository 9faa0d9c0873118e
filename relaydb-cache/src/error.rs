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

//! Cache errors — always recoverable by dropping the affected entry.

use thiserror::Error;

use relaydb_core::{CoreError, WireError};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("mirror engine error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// The real database failed while feeding the mirror.
    #[error("source read failed: {0}")]
    Source(WireError),

    #[error("cache configuration error: {0}")]
    Config(String),

    #[error("table not registered in cache: {0}")]
    UnknownTable(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
