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

//! Transportable scalar values and column descriptors
//!
//! [`WireValue`] is the self-contained value model of the protocol: any
//! argument or result scalar is one of these. Large binary/character
//! payloads are flattened to contiguous arrays before transport; resource
//! arguments are never serialized as live handles.

use serde::{Deserialize, Serialize};

/// One transportable scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl WireValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            WireValue::Null => "null",
            WireValue::Bool(_) => "bool",
            WireValue::I64(_) => "i64",
            WireValue::F64(_) => "f64",
            WireValue::Text(_) => "text",
            WireValue::Bytes(_) => "bytes",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }
}

/// Storage class of one result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    I64,
    F64,
    Bool,
    Text,
    Bytes,
    /// No usable declared type; values stored as a plain object array.
    Any,
}

impl ColumnKind {
    /// Map a declared SQL type to a storage class, following SQLite's
    /// affinity rules (substring match on the declared type).
    pub fn from_decl(decl: Option<&str>) -> Self {
        let Some(decl) = decl else {
            return ColumnKind::Any;
        };
        let upper = decl.to_ascii_uppercase();
        if upper.contains("BOOL") {
            ColumnKind::Bool
        } else if upper.contains("INT") {
            ColumnKind::I64
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            ColumnKind::Text
        } else if upper.contains("BLOB") {
            ColumnKind::Bytes
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnKind::F64
        } else {
            ColumnKind::Any
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::I64 => "i64",
            ColumnKind::F64 => "f64",
            ColumnKind::Bool => "bool",
            ColumnKind::Text => "text",
            ColumnKind::Bytes => "bytes",
            ColumnKind::Any => "any",
        }
    }
}

/// Descriptor for one result-set column, captured once at cursor open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDesc {
    pub name: String,
    pub decl_type: Option<String>,
    pub kind: ColumnKind,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, decl_type: Option<String>) -> Self {
        let kind = ColumnKind::from_decl(decl_type.as_deref());
        Self {
            name: name.into(),
            decl_type,
            kind,
        }
    }
}
