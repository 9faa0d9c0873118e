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

//! TCP transport
//!
//! Framed request/response over TCP, one handler thread per client
//! socket. The transport is deliberately dumb: it moves frames in order
//! per connection and knows nothing about commands. A socket dropping
//! does NOT tear down the sessions opened through it; the orphan
//! supervisor reclaims those by inactivity.
//!
//! If a response fails to serialize, a transport-kind error response is
//! substituted in its place. The underlying operation has already
//! happened at that point, so any resource it registered stays
//! registered and reachable through its handle.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use relaydb_core::wire::{encode_frame, read_frame, Request, Response, MAX_FRAME};
use relaydb_core::{CoreError, WireError};

use crate::dispatch::DispatchEngine;
use crate::error::Result;

const ACCEPT_POLL: Duration = Duration::from_millis(50);

pub struct Server {
    engine: Arc<DispatchEngine>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(bind: &str, engine: Arc<DispatchEngine>) -> Result<Self> {
        let listener = TcpListener::bind(bind)?;
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            engine,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared flag a signal handler flips to stop the accept loop.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Accept until the shutdown flag flips, then close every session.
    pub fn run(&self) -> Result<()> {
        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    let engine = Arc::clone(&self.engine);
                    std::thread::Builder::new()
                        .name("relay-conn".into())
                        .spawn(move || serve_client(engine, stream, peer))?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
        info!("shutting down, closing all sessions");
        self.engine.close_all();
        Ok(())
    }
}

fn serve_client(engine: Arc<DispatchEngine>, mut stream: TcpStream, peer: SocketAddr) {
    debug!(%peer, "client connected");
    loop {
        let request: Request = match read_frame(&mut stream, MAX_FRAME) {
            Ok(request) => request,
            Err(CoreError::Io(e))
                if matches!(
                    e.kind(),
                    ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
                ) =>
            {
                debug!(%peer, "client disconnected");
                return;
            }
            Err(e) => {
                warn!(%peer, error = %e, "unreadable frame, dropping client");
                let _ = send(&mut stream, &Response::Error(WireError::from(e)));
                return;
            }
        };

        let response = match request {
            Request::Connect {
                database,
                properties,
                client_info,
                ctx,
            } => match engine.connect(&database, &properties, &client_info, ctx) {
                Ok(handle) => Response::Handle(handle),
                Err(err) => Response::Error(err),
            },
            Request::Process {
                conn_id,
                target_id,
                command,
                ctx,
            } => match engine.process(conn_id, target_id, command, ctx) {
                Ok(result) => Response::Result(result),
                Err(err) => Response::Error(err),
            },
        };

        if send(&mut stream, &response).is_err() {
            debug!(%peer, "write failed, dropping client");
            return;
        }
    }
}

/// Write one response. A response that cannot be serialized is replaced
/// with a transport error response; the request's side effects stand.
fn send<W: std::io::Write>(stream: &mut W, response: &Response) -> std::io::Result<()> {
    let frame = match encode_frame(response, MAX_FRAME) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "response failed to serialize, substituting error");
            let fallback = Response::Error(WireError::transport(format!(
                "response serialization failed: {e}"
            )));
            encode_frame(&fallback, MAX_FRAME)
                .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e.to_string()))?
        }
    };
    stream.write_all(&frame)?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use relaydb_core::command::Command;
    use relaydb_core::wire::CommandResult;
    use relaydb_core::{CallingContext, HandleIdGenerator, WireErrorKind, WireValue};

    use crate::config::{DatabaseConfig, ServerConfig, SessionDefaults, SupervisorConfig};

    fn oversized_response() -> Response {
        Response::Result(CommandResult::Value(WireValue::Bytes(vec![7u8; MAX_FRAME])))
    }

    #[test]
    fn test_unserializable_response_substituted_with_transport_error() {
        let mut buf = Vec::new();
        send(&mut buf, &oversized_response()).unwrap();

        let back: Response = read_frame(&mut buf.as_slice(), MAX_FRAME).unwrap();
        match back {
            Response::Error(err) => {
                assert_eq!(err.kind, WireErrorKind::Transport);
                assert!(err.message.contains("serialization"));
            }
            other => panic!("expected error response, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_response_delivery_leaves_resource_registered() {
        let dir = tempfile::tempdir().unwrap();
        let mut databases = BTreeMap::new();
        databases.insert(
            "main".to_string(),
            DatabaseConfig {
                path: dir.path().join("main.db"),
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
        let engine = DispatchEngine::new(config, Arc::new(HandleIdGenerator::new()));

        let ctx = CallingContext::new("test-client", "transport test");
        let conn = engine
            .connect("main", &BTreeMap::new(), &BTreeMap::new(), ctx.clone())
            .unwrap();
        let lob = match engine
            .process(
                conn.id,
                None,
                Command::CreateLob { data: vec![9u8; 16] },
                ctx.clone(),
            )
            .unwrap()
        {
            CommandResult::Lob { handle, .. } => handle,
            other => panic!("expected lob, got {other:?}"),
        };

        // The operation succeeded; its response cannot be serialized. The
        // client gets the substituted error while the lob stays reachable.
        let mut buf = Vec::new();
        send(&mut buf, &oversized_response()).unwrap();
        let back: Response = read_frame(&mut buf.as_slice(), MAX_FRAME).unwrap();
        assert!(matches!(back, Response::Error(_)));

        match engine
            .process(conn.id, Some(lob.id), Command::LobLength, ctx)
            .unwrap()
        {
            CommandResult::Value(WireValue::I64(16)) => {}
            other => panic!("expected lob length, got {other:?}"),
        }
    }
}
