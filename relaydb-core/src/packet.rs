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

//! Row packets — column-oriented result batches
//!
//! A [`RowPacket`] is a fixed-capacity snapshot of N result rows, stored
//! column-wise: each column is either a primitive vector with a parallel
//! null bitmap, or an object array (null encoded as `WireValue::Null`).
//!
//! ## Invariants
//!
//! - All columns within one packet hold the same logical row count.
//! - Capacity grows geometrically (×1.5) when exceeded, never shrinks.
//! - A column whose declared storage class turns out not to fit the data
//!   (SQLite is dynamically typed) is promoted to an object array; values
//!   already stored are carried over losslessly.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::value::{ColumnKind, WireValue};

/// Parallel null bitmap for primitive column stores. A set bit marks a
/// null row; the primitive vector holds a placeholder at that index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NullMap {
    words: Vec<u64>,
}

impl NullMap {
    pub fn set(&mut self, row: usize) {
        let word = row / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (row % 64);
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.words
            .get(row / 64)
            .is_some_and(|w| w & (1 << (row % 64)) != 0)
    }
}

/// One growable column store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    I64 { values: Vec<i64>, nulls: NullMap },
    F64 { values: Vec<f64>, nulls: NullMap },
    Bool { values: Vec<bool>, nulls: NullMap },
    Text(Vec<Option<String>>),
    Bytes(Vec<Option<Vec<u8>>>),
    Mixed(Vec<WireValue>),
}

impl ColumnData {
    fn for_kind(kind: ColumnKind, capacity: usize) -> Self {
        match kind {
            ColumnKind::I64 => ColumnData::I64 {
                values: Vec::with_capacity(capacity),
                nulls: NullMap::default(),
            },
            ColumnKind::F64 => ColumnData::F64 {
                values: Vec::with_capacity(capacity),
                nulls: NullMap::default(),
            },
            ColumnKind::Bool => ColumnData::Bool {
                values: Vec::with_capacity(capacity),
                nulls: NullMap::default(),
            },
            ColumnKind::Text => ColumnData::Text(Vec::with_capacity(capacity)),
            ColumnKind::Bytes => ColumnData::Bytes(Vec::with_capacity(capacity)),
            ColumnKind::Any => ColumnData::Mixed(Vec::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::I64 { values, .. } => values.len(),
            ColumnData::F64 { values, .. } => values.len(),
            ColumnData::Bool { values, .. } => values.len(),
            ColumnData::Text(values) => values.len(),
            ColumnData::Bytes(values) => values.len(),
            ColumnData::Mixed(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, value: WireValue) -> Result<()> {
        fn mismatch(expected: &'static str, got: &WireValue) -> CoreError {
            CoreError::ColumnType {
                expected,
                got: got.kind_name(),
            }
        }
        match self {
            ColumnData::I64 { values, nulls } => match value {
                WireValue::I64(v) => values.push(v),
                WireValue::Null => {
                    nulls.set(values.len());
                    values.push(0);
                }
                other => return Err(mismatch("i64", &other)),
            },
            ColumnData::F64 { values, nulls } => match value {
                WireValue::F64(v) => values.push(v),
                // Integer widening keeps declared-REAL columns primitive.
                WireValue::I64(v) => values.push(v as f64),
                WireValue::Null => {
                    nulls.set(values.len());
                    values.push(0.0);
                }
                other => return Err(mismatch("f64", &other)),
            },
            ColumnData::Bool { values, nulls } => match value {
                WireValue::Bool(v) => values.push(v),
                WireValue::I64(v) => values.push(v != 0),
                WireValue::Null => {
                    nulls.set(values.len());
                    values.push(false);
                }
                other => return Err(mismatch("bool", &other)),
            },
            ColumnData::Text(values) => match value {
                WireValue::Text(v) => values.push(Some(v)),
                WireValue::Null => values.push(None),
                other => return Err(mismatch("text", &other)),
            },
            ColumnData::Bytes(values) => match value {
                WireValue::Bytes(v) => values.push(Some(v)),
                WireValue::Null => values.push(None),
                other => return Err(mismatch("bytes", &other)),
            },
            ColumnData::Mixed(values) => values.push(value),
        }
        Ok(())
    }

    /// Read back row `row` as a transportable value.
    pub fn get(&self, row: usize) -> WireValue {
        match self {
            ColumnData::I64 { values, nulls } => {
                if nulls.is_null(row) {
                    WireValue::Null
                } else {
                    WireValue::I64(values[row])
                }
            }
            ColumnData::F64 { values, nulls } => {
                if nulls.is_null(row) {
                    WireValue::Null
                } else {
                    WireValue::F64(values[row])
                }
            }
            ColumnData::Bool { values, nulls } => {
                if nulls.is_null(row) {
                    WireValue::Null
                } else {
                    WireValue::Bool(values[row])
                }
            }
            ColumnData::Text(values) => values[row]
                .clone()
                .map_or(WireValue::Null, WireValue::Text),
            ColumnData::Bytes(values) => values[row]
                .clone()
                .map_or(WireValue::Null, WireValue::Bytes),
            ColumnData::Mixed(values) => values[row].clone(),
        }
    }

    /// Promote a typed column to an object array, carrying stored values
    /// over. Used when a dynamically-typed value does not fit the declared
    /// storage class.
    fn to_mixed(&self) -> ColumnData {
        let rows = self.len();
        let mut values = Vec::with_capacity(rows + 1);
        for row in 0..rows {
            values.push(self.get(row));
        }
        ColumnData::Mixed(values)
    }

    fn reserve(&mut self, additional: usize) {
        match self {
            ColumnData::I64 { values, .. } => values.reserve(additional),
            ColumnData::F64 { values, .. } => values.reserve(additional),
            ColumnData::Bool { values, .. } => values.reserve(additional),
            ColumnData::Text(values) => values.reserve(additional),
            ColumnData::Bytes(values) => values.reserve(additional),
            ColumnData::Mixed(values) => values.reserve(additional),
        }
    }
}

/// Fixed-capacity, column-oriented snapshot of N result rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowPacket {
    columns: Vec<ColumnData>,
    rows: usize,
    #[serde(skip, default)]
    capacity: usize,
}

// Capacity is a local growth hint, not part of the packet's identity.
impl PartialEq for RowPacket {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.columns == other.columns
    }
}

impl RowPacket {
    pub fn new(kinds: &[ColumnKind], capacity: usize) -> Self {
        Self {
            columns: kinds
                .iter()
                .map(|&k| ColumnData::for_kind(k, capacity))
                .collect(),
            rows: 0,
            capacity,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    /// Append one row. Grows capacity geometrically (×1.5) when exceeded.
    pub fn push_row(&mut self, row: Vec<WireValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(CoreError::RowArity {
                columns: self.columns.len(),
                values: row.len(),
            });
        }
        if self.rows >= self.capacity {
            let grown = std::cmp::max(self.capacity + self.capacity / 2, self.capacity + 1);
            let additional = grown - self.rows;
            for col in &mut self.columns {
                col.reserve(additional);
            }
            self.capacity = grown;
        }
        for (idx, value) in row.into_iter().enumerate() {
            let col = &mut self.columns[idx];
            if let Err(CoreError::ColumnType { .. }) = col.push(value.clone()) {
                let mut promoted = col.to_mixed();
                promoted
                    .push(value)
                    .unwrap_or_else(|_| unreachable!("mixed column accepts any value"));
                *col = promoted;
            }
        }
        self.rows += 1;
        debug_assert!(self.columns.iter().all(|c| c.len() == self.rows));
        Ok(())
    }

    pub fn value(&self, row: usize, col: usize) -> WireValue {
        self.columns[col].get(row)
    }

    /// Materialize row `row` as transportable values.
    pub fn row(&self, row: usize) -> Vec<WireValue> {
        self.columns.iter().map(|c| c.get(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_kinds() -> Vec<ColumnKind> {
        vec![
            ColumnKind::I64,
            ColumnKind::F64,
            ColumnKind::Bool,
            ColumnKind::Text,
            ColumnKind::Bytes,
            ColumnKind::Any,
        ]
    }

    fn sample_row(i: i64) -> Vec<WireValue> {
        vec![
            WireValue::I64(i),
            WireValue::F64(i as f64 * 0.5),
            WireValue::Bool(i % 2 == 0),
            WireValue::Text(format!("row-{i}")),
            WireValue::Bytes(vec![i as u8; 3]),
            WireValue::Text(format!("any-{i}")),
        ]
    }

    #[test]
    fn test_push_and_read_back() {
        let mut packet = RowPacket::new(&all_kinds(), 4);
        for i in 0..4 {
            packet.push_row(sample_row(i)).unwrap();
        }
        assert_eq!(packet.row_count(), 4);
        for i in 0..4 {
            assert_eq!(packet.row(i), sample_row(i as i64));
        }
    }

    #[test]
    fn test_nulls_round_trip_every_column_type() {
        let mut packet = RowPacket::new(&all_kinds(), 2);
        let nulls: Vec<WireValue> = (0..6).map(|_| WireValue::Null).collect();
        packet.push_row(sample_row(1)).unwrap();
        packet.push_row(nulls.clone()).unwrap();
        assert_eq!(packet.row(1), nulls);
        assert_eq!(packet.row(0), sample_row(1));
    }

    #[test]
    fn test_geometric_growth() {
        let mut packet = RowPacket::new(&[ColumnKind::I64], 4);
        for i in 0..5 {
            packet.push_row(vec![WireValue::I64(i)]).unwrap();
        }
        // 4 -> 6 after the first overflow.
        assert_eq!(packet.capacity(), 6);
        for i in 0..5 {
            packet.push_row(vec![WireValue::I64(i)]).unwrap();
        }
        assert!(packet.capacity() >= packet.row_count());
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let mut packet = RowPacket::new(&[ColumnKind::I64, ColumnKind::Text], 2);
        let err = packet.push_row(vec![WireValue::I64(1)]).unwrap_err();
        assert!(matches!(err, CoreError::RowArity { .. }));
    }

    #[test]
    fn test_mismatched_value_promotes_to_mixed() {
        // Declared-INTEGER column receives a text value: SQLite allows
        // this, so the column is promoted rather than the row rejected.
        let mut packet = RowPacket::new(&[ColumnKind::I64], 4);
        packet.push_row(vec![WireValue::I64(1)]).unwrap();
        packet.push_row(vec![WireValue::Null]).unwrap();
        packet
            .push_row(vec![WireValue::Text("oops".into())])
            .unwrap();
        assert_eq!(packet.value(0, 0), WireValue::I64(1));
        assert_eq!(packet.value(1, 0), WireValue::Null);
        assert_eq!(packet.value(2, 0), WireValue::Text("oops".into()));
        assert!(matches!(packet.columns()[0], ColumnData::Mixed(_)));
    }

    #[test]
    fn test_integer_widens_into_real_column() {
        let mut packet = RowPacket::new(&[ColumnKind::F64], 2);
        packet.push_row(vec![WireValue::I64(3)]).unwrap();
        assert_eq!(packet.value(0, 0), WireValue::F64(3.0));
        assert!(matches!(packet.columns()[0], ColumnData::F64 { .. }));
    }

    #[test]
    fn test_serde_round_trip_identical() {
        let mut packet = RowPacket::new(&all_kinds(), 8);
        for i in 0..7 {
            if i % 3 == 0 {
                packet
                    .push_row((0..6).map(|_| WireValue::Null).collect())
                    .unwrap();
            } else {
                packet.push_row(sample_row(i)).unwrap();
            }
        }
        let bytes = postcard::to_allocvec(&packet).unwrap();
        let back: RowPacket = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back.row_count(), packet.row_count());
        for row in 0..packet.row_count() {
            assert_eq!(back.row(row), packet.row(row));
        }
    }
}
