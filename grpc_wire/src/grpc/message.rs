// Copyright (c) 2023 Huawei Device Co., Ltd.
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

//! The gRPC per-message envelope: a 1-octet compression flag, a 4-octet
//! big-endian length, then the encoded message. The envelope, not the
//! DATA frame, is gRPC's application-message boundary; this decoder
//! expects each DATA frame it is handed to carry exactly one whole
//! envelope, which is what the servers this client talks to produce.

use core::fmt;

/// The length of the envelope prefix.
pub const MESSAGE_HEADER_LENGTH: usize = 5;

/// A decoded gRPC message envelope.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct GrpcMessage {
    /// Whether the compression flag octet was nonzero. A compressed
    /// message is coded per the `grpc-encoding` header of its response.
    pub compressed: bool,
    /// The (possibly still compressed) encoded message bytes.
    pub payload: Vec<u8>,
}

/// Envelope decode failures.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum MessageError {
    /// Fewer than 5 bytes were supplied.
    Truncated,
    /// The prefix length disagrees with the number of bytes present.
    LengthMismatch {
        /// The length the prefix announced.
        announced: usize,
        /// The number of message bytes actually present.
        actual: usize,
    },
}

/// Wraps an encoded message in the envelope, with the compression flag
/// fixed at 0: outbound messages are never compressed by this client.
pub fn encode_message(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MESSAGE_HEADER_LENGTH + payload.len());
    buf.push(0);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Unwraps one envelope from a buffer expected to contain exactly one.
pub fn decode_message(buf: &[u8]) -> Result<GrpcMessage, MessageError> {
    if buf.len() < MESSAGE_HEADER_LENGTH {
        return Err(MessageError::Truncated);
    }
    let announced = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    let actual = buf.len() - MESSAGE_HEADER_LENGTH;
    if announced != actual {
        return Err(MessageError::LengthMismatch { announced, actual });
    }
    Ok(GrpcMessage {
        compressed: buf[0] != 0,
        payload: buf[MESSAGE_HEADER_LENGTH..].to_vec(),
    })
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::Truncated => write!(f, "message envelope shorter than 5 bytes"),
            MessageError::LengthMismatch { announced, actual } => write!(
                f,
                "message envelope announces {announced} bytes but carries {actual}"
            ),
        }
    }
}

impl std::error::Error for MessageError {}
