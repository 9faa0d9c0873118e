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

//! Wire units and frame codec
//!
//! Requests and responses travel as length-prefixed postcard frames:
//! `[u32 big-endian length][postcard body]`, with a max-size guard on both
//! ends so a corrupt length can never allocate unbounded memory.
//!
//! The carrier underneath only has to move request/response byte pairs in
//! order per connection; everything protocol-level lives in these types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::command::Command;
use crate::compress::CompressedPacket;
use crate::context::CallingContext;
use crate::error::{CoreError, Result, WireError};
use crate::handle::Handle;
use crate::value::{ColumnDesc, WireValue};

/// Hard ceiling on one frame. Large result batches are already split by
/// the streaming engine, so anything bigger than this is a protocol bug.
pub const MAX_FRAME: usize = 64 * 1024 * 1024;

/// One client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Connect {
        database: String,
        properties: BTreeMap<String, String>,
        client_info: BTreeMap<String, String>,
        ctx: CallingContext,
    },
    Process {
        conn_id: u64,
        /// `None` targets the connection resource itself.
        target_id: Option<u64>,
        command: Command,
        ctx: CallingContext,
    },
}

impl Request {
    /// Decode-time validation (closed generic-dispatch table).
    pub fn validate(&self) -> Result<()> {
        match self {
            Request::Connect { .. } => Ok(()),
            Request::Process { command, .. } => command.validate(),
        }
    }
}

/// Operation-specific result of one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandResult {
    Unit,
    UpdateCount(u64),
    Value(WireValue),
    Handle(Handle),
    /// A query opened a streaming cursor; batch 0 is primed server-side
    /// and handed out by the first `NextBatch`.
    Cursor {
        handle: Handle,
        columns: Vec<ColumnDesc>,
    },
    /// `None` is the exhausted signal.
    Batch(Option<CompressedPacket>),
    Metadata(Vec<ColumnDesc>),
    Lob { handle: Handle, length: u64 },
}

/// One server response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Handle(Handle),
    Result(CommandResult),
    Error(WireError),
}

/// Encode a message into a complete frame (length prefix included).
pub fn encode_frame<T: Serialize>(msg: &T, max: usize) -> Result<Vec<u8>> {
    let body = postcard::to_allocvec(msg).map_err(|e| CoreError::Encode(e.to_string()))?;
    if body.len() > max {
        return Err(CoreError::FrameTooLarge {
            size: body.len(),
            max,
        });
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write one framed message.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, msg: &T, max: usize) -> Result<()> {
    let frame = encode_frame(msg, max)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read one framed message.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R, max: usize) -> Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max {
        return Err(CoreError::FrameTooLarge { size: len, max });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    postcard::from_bytes(&body).map_err(|e| CoreError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{GenericOp, InterfaceKind};

    fn ping_request() -> Request {
        Request::Process {
            conn_id: 1,
            target_id: None,
            command: Command::Ping,
            ctx: CallingContext::new("test", "ping"),
        }
    }

    #[test]
    fn test_frame_round_trip() {
        let req = ping_request();
        let mut buf = Vec::new();
        write_frame(&mut buf, &req, MAX_FRAME).unwrap();
        let back: Request = read_frame(&mut buf.as_slice(), MAX_FRAME).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_oversized_frame_rejected_on_write() {
        let req = Request::Process {
            conn_id: 1,
            target_id: None,
            command: Command::CreateLob {
                data: vec![0u8; 4096],
            },
            ctx: CallingContext::default(),
        };
        let err = encode_frame(&req, 128).unwrap_err();
        assert!(matches!(err, CoreError::FrameTooLarge { .. }));
    }

    #[test]
    fn test_oversized_frame_rejected_on_read() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &ping_request(), MAX_FRAME).unwrap();
        let err = read_frame::<_, Request>(&mut buf.as_slice(), 4).unwrap_err();
        assert!(matches!(err, CoreError::FrameTooLarge { .. }));
    }

    #[test]
    fn test_decode_time_call_validation() {
        let bad = Request::Process {
            conn_id: 1,
            target_id: Some(2),
            command: Command::Call {
                iface: InterfaceKind::Cursor,
                op: GenericOp::LastInsertRowId,
                args: vec![],
            },
            ctx: CallingContext::default(),
        };
        assert!(bad.validate().is_err());
        assert!(ping_request().validate().is_ok());
    }

    #[test]
    fn test_response_round_trip() {
        let resp = Response::Result(CommandResult::Cursor {
            handle: Handle::with_aux(9, 1, 200),
            columns: vec![ColumnDesc::new("id", Some("INTEGER".into()))],
        });
        let mut buf = Vec::new();
        write_frame(&mut buf, &resp, MAX_FRAME).unwrap();
        let back: Response = read_frame(&mut buf.as_slice(), MAX_FRAME).unwrap();
        assert_eq!(back, resp);
    }
}
