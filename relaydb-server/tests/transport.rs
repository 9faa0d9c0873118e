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

//! Framed TCP round trips against a live server.

use std::collections::BTreeMap;
use std::net::TcpStream;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use relaydb_core::command::Command;
use relaydb_core::wire::{read_frame, write_frame, CommandResult, Request, Response, MAX_FRAME};
use relaydb_core::{CallingContext, HandleIdGenerator};
use relaydb_server::config::{DatabaseConfig, ServerConfig, SessionDefaults, SupervisorConfig};
use relaydb_server::{DispatchEngine, Server};

struct LiveServer {
    _dir: tempfile::TempDir,
    addr: std::net::SocketAddr,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl Drop for LiveServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn start_server() -> LiveServer {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("main.db");
    rusqlite::Connection::open(&db_path)
        .unwrap()
        .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
        .unwrap();

    let mut databases = BTreeMap::new();
    databases.insert(
        "main".to_string(),
        DatabaseConfig {
            path: db_path,
            read_only: false,
            allow_prefixes: None,
            rewrites: vec![],
        },
    );
    let config = Arc::new(ServerConfig {
        bind: "127.0.0.1:0".into(),
        databases,
        defaults: SessionDefaults::default(),
        supervisor: SupervisorConfig::default(),
    });

    let engine = Arc::new(DispatchEngine::new(
        Arc::clone(&config),
        Arc::new(HandleIdGenerator::new()),
    ));
    let server = Server::bind(&config.bind, engine).unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_flag();
    let join = std::thread::spawn(move || {
        server.run().unwrap();
    });

    LiveServer {
        _dir: dir,
        addr,
        shutdown,
        join: Some(join),
    }
}

fn roundtrip(stream: &mut TcpStream, request: &Request) -> Response {
    write_frame(stream, request, MAX_FRAME).unwrap();
    read_frame(stream, MAX_FRAME).unwrap()
}

fn ctx() -> CallingContext {
    CallingContext::new("transport-test", "socket round trip")
}

#[test]
fn test_connect_and_execute_over_socket() {
    let server = start_server();
    let mut stream = TcpStream::connect(server.addr).unwrap();

    let conn = match roundtrip(
        &mut stream,
        &Request::Connect {
            database: "main".into(),
            properties: BTreeMap::new(),
            client_info: BTreeMap::new(),
            ctx: ctx(),
        },
    ) {
        Response::Handle(handle) => handle,
        other => panic!("expected handle, got {other:?}"),
    };

    match roundtrip(
        &mut stream,
        &Request::Process {
            conn_id: conn.id,
            target_id: None,
            command: Command::ExecuteUpdate {
                sql: "INSERT INTO t (v) VALUES ('hello')".into(),
            },
            ctx: ctx(),
        },
    ) {
        Response::Result(CommandResult::UpdateCount(1)) => {}
        other => panic!("expected update count, got {other:?}"),
    }

    match roundtrip(
        &mut stream,
        &Request::Process {
            conn_id: conn.id,
            target_id: None,
            command: Command::CloseConnection,
            ctx: ctx(),
        },
    ) {
        Response::Result(CommandResult::Unit) => {}
        other => panic!("expected unit, got {other:?}"),
    }
}

#[test]
fn test_errors_travel_as_responses() {
    let server = start_server();
    let mut stream = TcpStream::connect(server.addr).unwrap();

    match roundtrip(
        &mut stream,
        &Request::Connect {
            database: "missing".into(),
            properties: BTreeMap::new(),
            client_info: BTreeMap::new(),
            ctx: ctx(),
        },
    ) {
        Response::Error(err) => assert!(err.is_protocol()),
        other => panic!("expected error response, got {other:?}"),
    }

    // The stream stays usable after an error response.
    match roundtrip(
        &mut stream,
        &Request::Process {
            conn_id: 999_999,
            target_id: None,
            command: Command::Ping,
            ctx: ctx(),
        },
    ) {
        Response::Error(err) => {
            assert!(err.is_protocol());
            assert!(err.message.contains("already closed"));
        }
        other => panic!("expected error response, got {other:?}"),
    }
}

#[test]
fn test_socket_drop_leaves_session_alive() {
    let server = start_server();

    let conn = {
        let mut stream = TcpStream::connect(server.addr).unwrap();
        match roundtrip(
            &mut stream,
            &Request::Connect {
                database: "main".into(),
                properties: BTreeMap::new(),
                client_info: BTreeMap::new(),
                ctx: ctx(),
            },
        ) {
            Response::Handle(handle) => handle,
            other => panic!("expected handle, got {other:?}"),
        }
        // Stream drops here without closing the connection.
    };

    // A fresh socket can keep using the same logical connection; only the
    // orphan supervisor, not the transport, reclaims sessions.
    let mut stream = TcpStream::connect(server.addr).unwrap();
    match roundtrip(
        &mut stream,
        &Request::Process {
            conn_id: conn.id,
            target_id: None,
            command: Command::Ping,
            ctx: ctx(),
        },
    ) {
        Response::Result(CommandResult::Unit) => {}
        other => panic!("expected unit, got {other:?}"),
    }
}
