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

//! Batch compression
//!
//! Each result batch is serialized and independently compressed per the
//! session's [`CompressionPolicy`]: payloads below the configured threshold
//! skip compression entirely, and the mode tag is carried alongside the
//! payload so the receiver knows whether to decompress.
//!
//! Modes:
//! - Lz4 — fast, the default for interactive traffic
//! - Zstd (level 3) — better ratio for bulk transfers
//! - None — loopback / already-compressed data

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::packet::RowPacket;

/// Compression mode tag carried with every compressed payload.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionMode {
    None = 0,
    Lz4 = 1,
    Zstd = 2,
}

impl CompressionMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => CompressionMode::Lz4,
            2 => CompressionMode::Zstd,
            _ => CompressionMode::None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Per-session compression policy: mode plus the size threshold below
/// which compression is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionPolicy {
    pub mode: CompressionMode,
    pub min_size: usize,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            mode: CompressionMode::Lz4,
            min_size: 1024,
        }
    }
}

/// One serialized, optionally compressed row batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedPacket {
    pub mode: CompressionMode,
    /// Serialized size before compression; sized decompression buffer.
    pub raw_len: u32,
    pub data: Vec<u8>,
}

impl CompressedPacket {
    /// Number of wire bytes this batch occupies.
    pub fn wire_len(&self) -> usize {
        self.data.len()
    }
}

/// Compress raw bytes per policy. Below the threshold the bytes pass
/// through untouched with a `None` tag.
pub fn compress_bytes(raw: &[u8], policy: CompressionPolicy) -> Result<(CompressionMode, Vec<u8>)> {
    if raw.len() < policy.min_size || policy.mode == CompressionMode::None {
        return Ok((CompressionMode::None, raw.to_vec()));
    }
    match policy.mode {
        CompressionMode::Lz4 => Ok((
            CompressionMode::Lz4,
            lz4_flex::compress_prepend_size(raw),
        )),
        CompressionMode::Zstd => {
            let data = zstd::bulk::compress(raw, 3)
                .map_err(|e| CoreError::Compression(e.to_string()))?;
            Ok((CompressionMode::Zstd, data))
        }
        CompressionMode::None => unreachable!("handled above"),
    }
}

/// Undo [`compress_bytes`] using the carried mode tag.
pub fn decompress_bytes(mode: CompressionMode, data: &[u8], raw_len: usize) -> Result<Vec<u8>> {
    match mode {
        CompressionMode::None => Ok(data.to_vec()),
        CompressionMode::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CoreError::Compression(e.to_string())),
        CompressionMode::Zstd => zstd::bulk::decompress(data, raw_len)
            .map_err(|e| CoreError::Compression(e.to_string())),
    }
}

/// Serialize and compress one row packet.
pub fn pack(packet: &RowPacket, policy: CompressionPolicy) -> Result<CompressedPacket> {
    let raw = postcard::to_allocvec(packet).map_err(|e| CoreError::Encode(e.to_string()))?;
    let raw_len = raw.len() as u32;
    let (mode, data) = compress_bytes(&raw, policy)?;
    Ok(CompressedPacket {
        mode,
        raw_len,
        data,
    })
}

/// Decompress and deserialize one row packet.
pub fn unpack(packet: &CompressedPacket) -> Result<RowPacket> {
    let raw = decompress_bytes(packet.mode, &packet.data, packet.raw_len as usize)?;
    postcard::from_bytes(&raw).map_err(|e| CoreError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ColumnKind, WireValue};

    fn sample_packet(rows: usize) -> RowPacket {
        let mut packet = RowPacket::new(&[ColumnKind::I64, ColumnKind::Text], rows);
        for i in 0..rows {
            packet
                .push_row(vec![
                    WireValue::I64(i as i64),
                    WireValue::Text(format!("value-{i}")),
                ])
                .unwrap();
        }
        packet
    }

    #[test]
    fn test_small_packet_skips_compression() {
        let packet = sample_packet(1);
        let policy = CompressionPolicy {
            mode: CompressionMode::Lz4,
            min_size: 1024,
        };
        let compressed = pack(&packet, policy).unwrap();
        assert_eq!(compressed.mode, CompressionMode::None);
        assert_eq!(unpack(&compressed).unwrap(), packet);
    }

    #[test]
    fn test_lz4_round_trip() {
        let packet = sample_packet(500);
        let policy = CompressionPolicy {
            mode: CompressionMode::Lz4,
            min_size: 16,
        };
        let compressed = pack(&packet, policy).unwrap();
        assert_eq!(compressed.mode, CompressionMode::Lz4);
        assert_eq!(unpack(&compressed).unwrap(), packet);
    }

    #[test]
    fn test_zstd_round_trip() {
        let packet = sample_packet(500);
        let policy = CompressionPolicy {
            mode: CompressionMode::Zstd,
            min_size: 16,
        };
        let compressed = pack(&packet, policy).unwrap();
        assert_eq!(compressed.mode, CompressionMode::Zstd);
        assert_eq!(unpack(&compressed).unwrap(), packet);
    }

    #[test]
    fn test_mode_tag_byte() {
        assert_eq!(CompressionMode::from_u8(1), CompressionMode::Lz4);
        assert_eq!(CompressionMode::from_u8(9), CompressionMode::None);
        assert_eq!(CompressionMode::Zstd.as_u8(), 2);
    }
}
