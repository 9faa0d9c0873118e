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

//! Orphan supervisor
//!
//! Periodically reclaims sessions whose clients have vanished without
//! closing: any session idle longer than the configured timeout is force
//! closed, releasing every resource registered under it. Activity is
//! whatever `ConnectionSession::touch` recorded — every dispatched
//! command counts, including pings, so a client that keeps pinging is
//! never reclaimed no matter how long its queries idle.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{info, warn};

use crate::config::SupervisorConfig;
use crate::dispatch::DispatchEngine;
use crate::session::now_millis;

/// Values below these are almost certainly a misconfigured unit (seconds
/// where milliseconds were meant); refuse them rather than reap every
/// session on the first sweep or spin the sweep loop.
const MIN_TIMEOUT_MS: u64 = 1_000;
const MIN_PERIOD_MS: u64 = 1_000;

/// Replace out-of-range values with the built-in defaults, logging what
/// was refused.
fn sanitized(config: SupervisorConfig) -> SupervisorConfig {
    let defaults = SupervisorConfig::default();
    let timeout_ms = if config.timeout_ms < MIN_TIMEOUT_MS {
        warn!(
            configured = config.timeout_ms,
            fallback = defaults.timeout_ms,
            "orphan timeout below sanity floor, keeping default"
        );
        defaults.timeout_ms
    } else {
        config.timeout_ms
    };
    let period_ms = if config.period_ms < MIN_PERIOD_MS {
        warn!(
            configured = config.period_ms,
            fallback = defaults.period_ms,
            "sweep period below sanity floor, keeping default"
        );
        defaults.period_ms
    } else {
        config.period_ms
    };
    SupervisorConfig {
        period_ms,
        timeout_ms,
    }
}

/// One sweep: force-close every session idle past `timeout_ms` as of
/// `now_ms`. Returns the ids of the sessions reclaimed.
pub fn sweep_once(engine: &DispatchEngine, timeout_ms: u64, now_ms: u64) -> Vec<u64> {
    let mut reclaimed = Vec::new();
    for session in engine.sessions_snapshot() {
        let idle = now_ms.saturating_sub(session.last_activity_ms());
        if idle > timeout_ms {
            let id = session.handle().id;
            info!(conn = id, idle_ms = idle, "reclaiming orphaned session");
            if engine.close(id) {
                reclaimed.push(id);
            }
        }
    }
    reclaimed
}

pub struct OrphanSupervisor {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl OrphanSupervisor {
    /// Spawn the sweep thread. A timeout or period below the sanity floor
    /// keeps the built-in default instead.
    pub fn spawn(engine: Arc<DispatchEngine>, config: SupervisorConfig) -> Self {
        let config = sanitized(config);
        let timeout_ms = config.timeout_ms;
        let period = Duration::from_millis(config.period_ms);

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let join = std::thread::Builder::new()
            .name("relay-supervisor".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        let reclaimed = sweep_once(&engine, timeout_ms, now_millis());
                        if !reclaimed.is_empty() {
                            info!(count = reclaimed.len(), "orphan sweep reclaimed sessions");
                        }
                    }
                    _ => break,
                }
            })
            .expect("failed to spawn supervisor thread");

        Self {
            stop: Some(stop_tx),
            join: Some(join),
        }
    }

    /// Signal the sweep thread and wait for it to exit.
    pub fn stop(mut self) {
        drop(self.stop.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for OrphanSupervisor {
    fn drop(&mut self) {
        drop(self.stop.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sane_config_kept_verbatim() {
        let config = sanitized(SupervisorConfig {
            period_ms: 5_000,
            timeout_ms: 60_000,
        });
        assert_eq!(config.period_ms, 5_000);
        assert_eq!(config.timeout_ms, 60_000);
    }

    #[test]
    fn test_subsecond_values_fall_back_to_defaults() {
        // "10" here almost certainly meant seconds.
        let config = sanitized(SupervisorConfig {
            period_ms: 10,
            timeout_ms: 120,
        });
        let defaults = SupervisorConfig::default();
        assert_eq!(config.period_ms, defaults.period_ms);
        assert_eq!(config.timeout_ms, defaults.timeout_ms);
    }

    #[test]
    fn test_floor_values_accepted() {
        let config = sanitized(SupervisorConfig {
            period_ms: MIN_PERIOD_MS,
            timeout_ms: MIN_TIMEOUT_MS,
        });
        assert_eq!(config.period_ms, MIN_PERIOD_MS);
        assert_eq!(config.timeout_ms, MIN_TIMEOUT_MS);
    }
}
