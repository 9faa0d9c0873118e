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

//! Framed TCP client transport.
//!
//! One socket, strictly serialized request/response pairs: the stream
//! mutex is held across write+read, so concurrent callers (a query and
//! the keep-alive pinger) interleave whole round trips, never frames.

use std::net::TcpStream;

use parking_lot::Mutex;

use relaydb_core::wire::{read_frame, write_frame, Request, Response, MAX_FRAME};

use crate::error::Result;

pub struct TcpTransport {
    stream: Mutex<TcpStream>,
}

impl TcpTransport {
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }

    pub fn roundtrip(&self, request: &Request) -> Result<Response> {
        let mut stream = self.stream.lock();
        write_frame(&mut *stream, request, MAX_FRAME)?;
        Ok(read_frame(&mut *stream, MAX_FRAME)?)
    }
}
