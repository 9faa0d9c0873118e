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

//! Periodic cache sweep thread.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use crate::mirror::{MirrorCache, TableSource};

pub const SWEEP_PERIOD: Duration = Duration::from_secs(10);

/// Runs [`MirrorCache::sweep`] on a fixed period until stopped or
/// dropped.
pub struct CacheSweeper {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    pub fn spawn(cache: Arc<MirrorCache>, source: Arc<dyn TableSource + Send + Sync>) -> Self {
        Self::spawn_with_period(cache, source, SWEEP_PERIOD)
    }

    pub fn spawn_with_period(
        cache: Arc<MirrorCache>,
        source: Arc<dyn TableSource + Send + Sync>,
        period: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let join = std::thread::Builder::new()
            .name("relay-cache-sweep".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => cache.sweep(source.as_ref()),
                    _ => break,
                }
            })
            .expect("failed to spawn cache sweep thread");
        Self {
            stop: Some(stop_tx),
            join: Some(join),
        }
    }

    pub fn stop(mut self) {
        drop(self.stop.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        drop(self.stop.take());
    }
}
