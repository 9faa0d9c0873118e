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

//! Heuristic table-name extraction
//!
//! A textual scan, deliberately not a SQL parser. The contract is
//! asymmetric: returning an empty set for a cacheable query only costs a
//! round trip, but returning a table set for a query the mirror cannot
//! answer would produce wrong results. So anything this scanner cannot
//! classify with certainty — subqueries, CTEs, quoted identifiers,
//! string literals, multiple statements — yields the empty set and the
//! query goes to the real database.

use crate::config::is_identifier;

/// Tokens that terminate a FROM table list.
const STOP_WORDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "INTERSECT", "EXCEPT",
    "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "OUTER", "CROSS", "NATURAL", "ON", "USING",
    "SELECT", "FROM",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS
        .iter()
        .any(|w| token.eq_ignore_ascii_case(w))
}

/// Extract the set of referenced table names (lowercased, deduplicated)
/// from a SELECT statement, or the empty set when the statement cannot be
/// classified with certainty.
pub fn extract_table_names(sql: &str) -> Vec<String> {
    // Anything that can hide a table reference from a token scan
    // disqualifies the whole statement.
    if sql
        .chars()
        .any(|c| matches!(c, '(' | ')' | '\'' | '"' | '`' | ';'))
    {
        return Vec::new();
    }

    let tokens: Vec<&str> = sql.split_whitespace().collect();
    match tokens.first() {
        Some(first) if first.eq_ignore_ascii_case("select") => {}
        _ => return Vec::new(),
    }

    let mut tables: Vec<String> = Vec::new();
    let mut i = 1;
    while i < tokens.len() {
        let token = tokens[i];
        if token.eq_ignore_ascii_case("from") {
            match scan_from_list(&tokens, i + 1, &mut tables) {
                Some(next) => i = next,
                None => return Vec::new(),
            }
        } else if token.eq_ignore_ascii_case("join") {
            // Token immediately following JOIN is the table.
            let Some(name) = tokens.get(i + 1) else {
                return Vec::new();
            };
            let name = name.trim_end_matches(',');
            if !is_identifier(name) {
                return Vec::new();
            }
            push_unique(&mut tables, name);
            i += 2;
        } else {
            i += 1;
        }
    }
    tables
}

/// Scan a comma-separated table list with optional aliases starting at
/// `start`; returns the index of the terminating token, or `None` when
/// the list is malformed.
fn scan_from_list(tokens: &[&str], start: usize, tables: &mut Vec<String>) -> Option<usize> {
    let mut i = start;
    let mut expect_table = true;
    while i < tokens.len() {
        let token = tokens[i];
        if expect_table {
            if is_stop_word(token) || token == "," {
                // Dangling comma or `FROM WHERE ...`; not classifiable.
                return None;
            }
            // A token may carry several comma-joined names: "t1,t2".
            let trailing_comma = token.ends_with(',');
            for name in token.split(',').filter(|p| !p.is_empty()) {
                if !is_identifier(name) {
                    return None;
                }
                push_unique(tables, name);
            }
            expect_table = trailing_comma;
            i += 1;
        } else if token == "," {
            expect_table = true;
            i += 1;
        } else if token.eq_ignore_ascii_case("as") {
            // Alias keyword; the alias itself follows.
            i += 1;
        } else if is_stop_word(token) {
            return Some(i);
        } else {
            // Bare alias. A trailing comma continues the table list.
            let name = token.trim_end_matches(',');
            if !is_identifier(name) {
                return None;
            }
            expect_table = token.ends_with(',');
            i += 1;
        }
    }
    if expect_table {
        // List ended mid-expression.
        return None;
    }
    Some(i)
}

fn push_unique(tables: &mut Vec<String>, name: &str) {
    let lower = name.to_ascii_lowercase();
    if !tables.contains(&lower) {
        tables.push(lower);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(sql: &str) -> Vec<String> {
        extract_table_names(sql)
    }

    #[test]
    fn test_simple_select() {
        assert_eq!(extract("SELECT * FROM Address"), vec!["address"]);
        assert_eq!(
            extract("select id, name from users where id = 1"),
            vec!["users"]
        );
    }

    #[test]
    fn test_comma_list_and_aliases() {
        assert_eq!(
            extract("SELECT * FROM orders o, customers c WHERE o.cid = c.id"),
            vec!["orders", "customers"]
        );
        assert_eq!(
            extract("SELECT * FROM orders AS o, customers"),
            vec!["orders", "customers"]
        );
        assert_eq!(extract("SELECT * FROM t1,t2,t3"), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_join_clauses() {
        assert_eq!(
            extract("SELECT * FROM orders o INNER JOIN customers c ON o.cid = c.id"),
            vec!["orders", "customers"]
        );
        assert_eq!(
            extract("SELECT * FROM a LEFT JOIN b ON a.x = b.x JOIN c ON b.y = c.y"),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_union_scans_every_from() {
        assert_eq!(
            extract("SELECT id FROM t1 UNION SELECT id FROM t2"),
            vec!["t1", "t2"]
        );
    }

    #[test]
    fn test_unclassifiable_yields_empty() {
        // Subquery.
        assert!(extract("SELECT * FROM (SELECT 1)").is_empty());
        // Function call in the select list.
        assert!(extract("SELECT count(*) FROM t").is_empty());
        // String literal could hide anything.
        assert!(extract("SELECT * FROM t WHERE name = 'from x'").is_empty());
        // Quoted identifier.
        assert!(extract("SELECT * FROM \"weird table\"").is_empty());
        // CTE.
        assert!(extract("WITH x AS y SELECT * FROM x").is_empty());
        // Multiple statements.
        assert!(extract("SELECT 1; DROP TABLE t").is_empty());
        // Not a SELECT.
        assert!(extract("DELETE FROM t").is_empty());
        // Dangling comma.
        assert!(extract("SELECT * FROM t1, WHERE x = 1").is_empty());
    }

    #[test]
    fn test_no_from_yields_empty() {
        assert!(extract("SELECT 1").is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        assert_eq!(
            extract("SELECT * FROM t a JOIN t b ON a.x = b.x"),
            vec!["t"]
        );
    }
}
