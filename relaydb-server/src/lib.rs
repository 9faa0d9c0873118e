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

//! RelayDB Server
//!
//! Holds the real database resources and turns a stream of opaque commands
//! into correct, ordered, resource-safe execution against them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Server Process                         │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                   DispatchEngine                       │  │
//! │  │   sessions: conn-id → ConnectionSession                │  │
//! │  └───────┬──────────────────┬──────────────────┬──────────┘  │
//! │          │                  │                  │             │
//! │  ┌───────┴───────┐  ┌───────┴───────┐  ┌───────┴──────────┐  │
//! │  │ HandleRegistry │  │ CursorStream  │  │ OrphanSupervisor │  │
//! │  │ (per session)  │  │ (per cursor)  │  │ (one per server) │  │
//! │  └───────────────┘  └───────────────┘  └──────────────────┘  │
//! │          ▲                                                   │
//! │  ┌───────┴───────────────────────────────────────────────┐   │
//! │  │          Framed TCP transport (thread per client)     │   │
//! │  └───────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! One worker thread per transport connection processes requests
//! start-to-finish in order. The engine is safe under concurrent calls
//! across different connections; within one connection the transport's
//! in-order delivery is the ordering guarantee.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod session;
pub mod streaming;
pub mod supervisor;
pub mod transport;

pub use config::{DatabaseConfig, ServerConfig, SessionDefaults, SupervisorConfig};
pub use dispatch::DispatchEngine;
pub use error::{to_wire, Result, ServerError};
pub use registry::{HandleRegistry, RegistryEntry, ResourceKind, ServerResource};
pub use session::{ConnectionSession, StatementPolicy};
pub use streaming::CursorStream;
pub use supervisor::{sweep_once, OrphanSupervisor};
pub use transport::Server;
