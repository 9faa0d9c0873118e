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

//! Server configuration
//!
//! JSON config file mapping database names to SQLite files, plus session
//! defaults and supervisor timing. An optional properties file supplies
//! `${var}` substitution into the config text before parsing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use relaydb_core::{CompressionMode, CompressionPolicy};

use crate::error::{Result, ServerError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. "127.0.0.1:9192".
    pub bind: String,
    /// Database name → backing file.
    pub databases: BTreeMap<String, DatabaseConfig>,
    #[serde(default)]
    pub defaults: SessionDefaults,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub read_only: bool,
    /// Statement allowlist: uppercase prefixes; absent means allow all.
    #[serde(default)]
    pub allow_prefixes: Option<Vec<String>>,
    /// Textual prefix rewrites applied before execution.
    #[serde(default)]
    pub rewrites: Vec<RewriteRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRule {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_compression_min_size")]
    pub compression_min_size: usize,
    #[serde(default = "default_charset")]
    pub charset: String,
}

fn default_batch_size() -> usize {
    200
}

fn default_compression() -> String {
    "lz4".to_string()
}

fn default_compression_min_size() -> usize {
    1024
}

fn default_charset() -> String {
    "UTF-8".to_string()
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            compression: default_compression(),
            compression_min_size: default_compression_min_size(),
            charset: default_charset(),
        }
    }
}

impl SessionDefaults {
    pub fn compression_policy(&self) -> CompressionPolicy {
        let mode = match self.compression.to_ascii_lowercase().as_str() {
            "none" => CompressionMode::None,
            "zstd" => CompressionMode::Zstd,
            _ => CompressionMode::Lz4,
        };
        CompressionPolicy {
            mode,
            min_size: self.compression_min_size,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_sweep_period_ms")]
    pub period_ms: u64,
    #[serde(default = "default_orphan_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_sweep_period_ms() -> u64 {
    30_000
}

fn default_orphan_timeout_ms() -> u64 {
    120_000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            period_ms: default_sweep_period_ms(),
            timeout_ms: default_orphan_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file, optionally substituting `${var}` references
    /// from a key=value properties file first.
    pub fn load(path: &Path, vars_path: Option<&Path>) -> Result<Self> {
        let mut text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
        if let Some(vars_path) = vars_path {
            let vars = load_properties(vars_path)?;
            text = substitute(&text, &vars);
        }
        let config: ServerConfig = serde_json::from_str(&text)
            .map_err(|e| ServerError::Config(format!("invalid config: {e}")))?;
        if config.databases.is_empty() {
            return Err(ServerError::Config("no databases configured".into()));
        }
        Ok(config)
    }
}

fn load_properties(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
    let mut vars = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            vars.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(vars)
}

fn substitute(text: &str, vars: &BTreeMap<String, String>) -> String {
    let mut result = text.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("${{{key}}}"), value);
    }
    result
}
