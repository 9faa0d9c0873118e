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

//! RelayDB Core
//!
//! Wire-level data model shared by the RelayDB client and server. RelayDB
//! makes a relational database behind a network boundary look local: every
//! operation on a connection, statement, cursor, savepoint, or large-object
//! handle is captured as a serializable [`command::Command`], shipped to the
//! server holding the real database resources, executed there, and the
//! result (scalar, new [`handle::Handle`], or [`error::WireError`]) shipped
//! back.
//!
//! # Wire Protocol
//!
//! Every message is a length-prefixed postcard frame:
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  Length (4 bytes BE)  │  postcard body (N bytes) │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Requests are either `Connect` (open a session, get a connection handle)
//! or `Process` (run one command against a handle). Result rows travel as
//! column-oriented [`packet::RowPacket`] batches, each independently
//! compressed per the session's [`compress::CompressionPolicy`].
//!
//! This crate performs no I/O of its own beyond the `std::io` traits used
//! by the frame codec; transports and database drivers live in
//! `relaydb-server` and `relaydb-client`.

pub mod command;
pub mod compress;
pub mod context;
pub mod error;
pub mod handle;
pub mod packet;
pub mod value;
pub mod wire;

pub use command::{Command, GenericOp, InterfaceKind, ParamValue};
pub use compress::{CompressedPacket, CompressionMode, CompressionPolicy};
pub use context::CallingContext;
pub use error::{CoreError, Result, WireError, WireErrorKind};
pub use handle::{Handle, HandleIdGenerator};
pub use packet::{ColumnData, RowPacket};
pub use value::{ColumnDesc, ColumnKind, WireValue};
pub use wire::{CommandResult, Request, Response};
