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

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relaydb_core::HandleIdGenerator;
use relaydb_server::{DispatchEngine, OrphanSupervisor, Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "relaydb-server", about = "RelayDB remote database server", version)]
struct Args {
    /// Path to the JSON server configuration.
    #[arg(short, long)]
    config: PathBuf,

    /// Optional key=value properties file for ${var} substitution.
    #[arg(long)]
    vars: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match ServerConfig::load(&args.config, args.vars.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };
    info!(
        databases = config.databases.len(),
        bind = %config.bind,
        "configuration loaded"
    );

    let ids = Arc::new(HandleIdGenerator::new());
    let engine = Arc::new(DispatchEngine::new(Arc::clone(&config), ids));

    let server = match Server::bind(&config.bind, Arc::clone(&engine)) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    let supervisor = OrphanSupervisor::spawn(Arc::clone(&engine), config.supervisor);

    let shutdown = server.shutdown_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("interrupt received");
        shutdown.store(true, Ordering::Release);
    }) {
        error!(error = %e, "failed to install signal handler");
        std::process::exit(1);
    }

    if let Err(e) = server.run() {
        error!(error = %e, "server terminated abnormally");
        std::process::exit(1);
    }
    supervisor.stop();
    info!("bye");
}
