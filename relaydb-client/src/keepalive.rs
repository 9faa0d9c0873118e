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

//! Keep-alive pinger.
//!
//! Each tick pings the server unless a real command already refreshed
//! the session's activity during the preceding interval — the dirty flag
//! is set by every real command and cleared here. Idle-but-alive clients
//! are thus never reclaimed by the server's orphan supervisor, and busy
//! clients produce no redundant traffic.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::debug;

use relaydb_core::command::Command;

use crate::connection::ClientCore;

pub(crate) struct KeepAlive {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl KeepAlive {
    pub(crate) fn spawn(core: Arc<ClientCore>, period: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let join = std::thread::Builder::new()
            .name("relay-keepalive".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        if core.is_closed() {
                            break;
                        }
                        if core.take_dirty() {
                            continue;
                        }
                        if let Err(err) = core.call(None, Command::Ping) {
                            debug!(error = %err, "keep-alive ping failed");
                        }
                    }
                    _ => break,
                }
            })
            .expect("failed to spawn keep-alive thread");
        Self {
            stop: Some(stop_tx),
            join: Some(join),
        }
    }

    pub(crate) fn stop(mut self) {
        drop(self.stop.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        drop(self.stop.take());
    }
}
