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

//! Connection URL and properties.
//!
//! URLs look like `relaydb://host:port/database`. Behavior knobs travel
//! as connection properties; the ones the client itself consumes are
//! `cache.tables` (mirror cache config string) and `keepalive.ms`, the
//! rest are forwarded to the server at connect time.

use std::collections::BTreeMap;
use std::time::Duration;

use relaydb_cache::{parse_cache_config, CacheRule};

use crate::error::{ClientError, Result};

pub const DEFAULT_KEEPALIVE: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub addr: String,
    pub database: String,
    pub properties: BTreeMap<String, String>,
    pub client_info: BTreeMap<String, String>,
}

impl ConnectOptions {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("relaydb://")
            .ok_or_else(|| ClientError::InvalidUrl(format!("missing relaydb:// scheme: {url}")))?;
        let (addr, database) = rest
            .split_once('/')
            .ok_or_else(|| ClientError::InvalidUrl(format!("missing database name: {url}")))?;
        if addr.is_empty() || database.is_empty() {
            return Err(ClientError::InvalidUrl(url.to_string()));
        }
        Ok(Self {
            addr: addr.to_string(),
            database: database.to_string(),
            properties: BTreeMap::new(),
            client_info: BTreeMap::new(),
        })
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn client_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.client_info.insert(key.into(), value.into());
        self
    }

    pub(crate) fn keepalive_period(&self) -> Duration {
        self.properties
            .get("keepalive.ms")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_KEEPALIVE)
    }

    pub(crate) fn cache_rules(&self) -> Result<Vec<CacheRule>> {
        match self.properties.get("cache.tables") {
            Some(text) => Ok(parse_cache_config(text)?),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        let options = ConnectOptions::parse("relaydb://127.0.0.1:9192/main").unwrap();
        assert_eq!(options.addr, "127.0.0.1:9192");
        assert_eq!(options.database, "main");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ConnectOptions::parse("http://x/y").is_err());
        assert!(ConnectOptions::parse("relaydb://host:1").is_err());
        assert!(ConnectOptions::parse("relaydb:///db").is_err());
    }

    #[test]
    fn test_cache_rules_from_property() {
        let options = ConnectOptions::parse("relaydb://h:1/db")
            .unwrap()
            .property("cache.tables", "Address:5000");
        let rules = options.cache_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].table, "address");
        assert_eq!(rules[0].refresh_ms, Some(5000));
    }

    #[test]
    fn test_keepalive_default_and_override() {
        let options = ConnectOptions::parse("relaydb://h:1/db").unwrap();
        assert_eq!(options.keepalive_period(), DEFAULT_KEEPALIVE);
        let options = options.property("keepalive.ms", "500");
        assert_eq!(options.keepalive_period(), Duration::from_millis(500));
    }
}
