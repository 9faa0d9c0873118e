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

//! Cache configuration string: `table[:refresh-interval-ms],...`
//!
//! No refresh suffix means "load once, never refresh". Table names must
//! be bare identifiers because they are spliced into generated mirror
//! statements.

use crate::error::{CacheError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRule {
    /// Lowercased table name, the cache's lookup key.
    pub table: String,
    /// `None` = fill once, never refresh.
    pub refresh_ms: Option<u64>,
}

pub(crate) fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse `"Address:5000,Users"` into rules. Duplicate tables and
/// non-identifier names are configuration errors.
pub fn parse_cache_config(text: &str) -> Result<Vec<CacheRule>> {
    let mut rules: Vec<CacheRule> = Vec::new();
    for part in text.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, refresh_ms) = match part.split_once(':') {
            Some((name, interval)) => {
                let ms = interval.trim().parse::<u64>().map_err(|_| {
                    CacheError::Config(format!("bad refresh interval in {part:?}"))
                })?;
                (name.trim(), Some(ms))
            }
            None => (part, None),
        };
        if !is_identifier(name) {
            return Err(CacheError::Config(format!(
                "table name must be a bare identifier: {name:?}"
            )));
        }
        let table = name.to_ascii_lowercase();
        if rules.iter().any(|r| r.table == table) {
            return Err(CacheError::Config(format!("duplicate table: {name}")));
        }
        rules.push(CacheRule { table, refresh_ms });
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_rules() {
        let rules = parse_cache_config("Address:5000, Users").unwrap();
        assert_eq!(
            rules,
            vec![
                CacheRule {
                    table: "address".into(),
                    refresh_ms: Some(5000),
                },
                CacheRule {
                    table: "users".into(),
                    refresh_ms: None,
                },
            ]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_cache_config("Address:soon").is_err());
        assert!(parse_cache_config("bad name:5").is_err());
        assert!(parse_cache_config("t;drop").is_err());
        assert!(parse_cache_config("Users,users").is_err());
    }

    #[test]
    fn test_parse_empty_is_empty() {
        assert!(parse_cache_config("").unwrap().is_empty());
        assert!(parse_cache_config(" , ").unwrap().is_empty());
    }
}
