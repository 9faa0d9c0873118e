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

//! RelayDB client
//!
//! Thin client over the RelayDB wire protocol: every resource lives on
//! the server and is addressed through an opaque handle; results stream
//! back in compressed column-oriented batches.
//!
//! ```no_run
//! use relaydb_client::{ConnectOptions, RelayConnection};
//!
//! # fn main() -> relaydb_client::Result<()> {
//! let conn = RelayConnection::connect_with(
//!     ConnectOptions::parse("relaydb://127.0.0.1:9192/main")?
//!         .property("cache.tables", "address:5000"),
//! )?;
//! conn.execute("INSERT INTO address (street) VALUES ('Main St 1')")?;
//! let mut rows = conn.query("SELECT * FROM address")?;
//! while let Some(row) = rows.next_row()? {
//!     println!("{row:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
mod keepalive;
pub mod options;
pub mod rows;
mod source;
pub mod statement;
pub mod transport;

pub use connection::RelayConnection;
pub use error::{ClientError, Result};
pub use options::ConnectOptions;
pub use rows::QueryRows;
pub use statement::{Lob, PreparedStatement, Savepoint};

pub use relaydb_core::command::ParamValue;
pub use relaydb_core::{Handle, WireValue};
