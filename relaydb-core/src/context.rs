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

//! Calling context — caller identity carried for diagnostics only
//!
//! Retained on each registry entry so leaked resources can be traced back
//! to their originating call site. Never consulted for execution.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallingContext {
    /// Client identity (host/user string supplied at connect time).
    pub client: String,
    /// Originating thread name, when available.
    pub thread: String,
    /// Free-form description of the call site.
    pub detail: String,
}

impl CallingContext {
    pub fn new(client: impl Into<String>, detail: impl Into<String>) -> Self {
        let thread = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        Self {
            client: client.into(),
            thread,
            detail: detail.into(),
        }
    }
}
